//! Thin adapter over [`suppaftp`]'s blocking client.
//!
//! One [`FtpConnection`] is opened per worker thread and per metadata probe;
//! nothing is pooled or reused across calls, matching how the supervisor and
//! workers each open their own connection independently.

mod connection;

pub use connection::{FtpConnection, RetrStream};

/// Connection parameters shared by every [`FtpConnection::connect`] call.
#[derive(Debug, Clone)]
pub struct FtpConnectOptions {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub enable_tls: bool,
    pub connect_timeout: std::time::Duration,
}

/// Errors raised while talking to the FTP server.
#[derive(Debug, thiserror::Error)]
pub enum FtpTransportError {
    #[error("failed to connect to {server}:{port}: {source}")]
    Connect {
        server: String,
        port: u16,
        #[source]
        source: suppaftp::FtpError,
    },

    #[error("login failed: {0}")]
    Login(#[source] suppaftp::FtpError),

    #[error("server does not support TLS, try again without --enable-tls: {0}")]
    TlsNotSupported(#[source] suppaftp::FtpError),

    #[error("failed to upgrade to TLS: {0}")]
    TlsUpgrade(#[source] suppaftp::FtpError),

    #[error("SIZE command failed for \"{path}\": {source}")]
    Size {
        path: String,
        #[source]
        source: suppaftp::FtpError,
    },

    #[error("LIST command failed for \"{path}\": {source}")]
    List {
        path: String,
        #[source]
        source: suppaftp::FtpError,
    },

    #[error("CWD command failed for \"{path}\": {source}")]
    Cwd {
        path: String,
        #[source]
        source: suppaftp::FtpError,
    },

    #[error("RETR command failed for \"{path}\" at offset {offset}: {source}")]
    Retr {
        path: String,
        offset: u64,
        #[source]
        source: suppaftp::FtpError,
    },

    #[error("i/o error on ftp data connection: {0}")]
    Io(#[from] std::io::Error),
}
