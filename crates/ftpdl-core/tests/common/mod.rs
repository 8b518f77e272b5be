pub mod fake_ftp_server;
