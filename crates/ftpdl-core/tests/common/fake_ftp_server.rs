//! Minimal in-process FTP server for integration tests.
//!
//! Understands just enough of RFC 959 to drive the real client stack end to
//! end: `USER`/`PASS`, `TYPE`, `PASV`, `SIZE`, `CWD`, `LIST`, `REST`+`RETR`,
//! `QUIT`. Serves a single in-memory file at `/file.bin`; any other `CWD`
//! target fails with `550`, which is what the walker relies on to recognize
//! a plain file instead of a directory.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

pub struct FakeFtpServer {
    pub port: u16,
}

/// Starts the server in a background thread serving `body` at `/file.bin`.
/// Runs until the process exits; each connection is handled on its own
/// thread, same as the control connection pattern `suppaftp::FtpStream`
/// expects (one TCP connection per worker).
pub fn start(body: Vec<u8>) -> FakeFtpServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind control listener");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            thread::spawn(move || handle_control(stream, &body));
        }
    });
    FakeFtpServer { port }
}

fn handle_control(stream: TcpStream, body: &[u8]) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(5)));
    let mut writer = stream.try_clone().expect("clone control stream");
    let mut reader = BufReader::new(stream);

    let _ = writer.write_all(b"220 fake ftp ready\r\n");

    let mut rest_offset: u64 = 0;
    let mut data_listener: Option<TcpListener> = None;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let cmd = line.trim_end();
        let mut parts = cmd.splitn(2, ' ');
        let verb = parts.next().unwrap_or("").to_ascii_uppercase();
        let arg = parts.next().unwrap_or("").trim();

        match verb.as_str() {
            "USER" => {
                let _ = writer.write_all(b"331 user ok, send password\r\n");
            }
            "PASS" => {
                let _ = writer.write_all(b"230 logged in\r\n");
            }
            "TYPE" => {
                let _ = writer.write_all(b"200 type set\r\n");
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").expect("bind data listener");
                let port = listener.local_addr().unwrap().port();
                let (p1, p2) = (port >> 8, port & 0xff);
                data_listener = Some(listener);
                let _ = writer.write_all(
                    format!("227 Entering Passive Mode (127,0,0,1,{p1},{p2})\r\n").as_bytes(),
                );
            }
            "SIZE" => {
                if arg.ends_with("file.bin") {
                    let _ = writer.write_all(format!("213 {}\r\n", body.len()).as_bytes());
                } else {
                    let _ = writer.write_all(b"550 no such file\r\n");
                }
            }
            "REST" => {
                rest_offset = arg.parse().unwrap_or(0);
                let _ = writer.write_all(format!("350 restarting at {rest_offset}\r\n").as_bytes());
            }
            "CWD" => {
                if arg == "/" || arg.is_empty() {
                    let _ = writer.write_all(b"250 directory changed\r\n");
                } else {
                    let _ = writer.write_all(b"550 not a directory\r\n");
                }
            }
            "LIST" => {
                let Some(listener) = data_listener.take() else {
                    let _ = writer.write_all(b"425 no data connection\r\n");
                    continue;
                };
                let _ = writer.write_all(b"150 listing follows\r\n");
                if let Ok((mut data, _)) = listener.accept() {
                    let _ = data.write_all(b"-rw-r--r-- 1 ftp ftp 0 Jan  1 00:00 file.bin\r\n");
                }
                let _ = writer.write_all(b"226 list complete\r\n");
            }
            "RETR" => {
                let Some(listener) = data_listener.take() else {
                    let _ = writer.write_all(b"425 no data connection\r\n");
                    continue;
                };
                let _ = writer.write_all(b"150 opening data connection\r\n");
                if let Ok((mut data, _)) = listener.accept() {
                    let start = (rest_offset as usize).min(body.len());
                    let _ = data.write_all(&body[start..]);
                }
                rest_offset = 0;
                let _ = writer.write_all(b"226 transfer complete\r\n");
            }
            "QUIT" => {
                let _ = writer.write_all(b"221 bye\r\n");
                return;
            }
            _ => {
                let _ = writer.write_all(b"502 not implemented\r\n");
            }
        }
    }
}
