use std::io::Read;
use std::net::ToSocketAddrs;
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, Status};

use super::{FtpConnectOptions, FtpTransportError};

/// 30 second receive timeout on the data connection, matching the original
/// downloader's `conn.settimeout(30)`.
const RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// One FTP control connection plus, while a transfer is in progress, its data
/// connection. Not `Send` across a transfer boundary by convention: open one
/// per worker thread.
pub struct FtpConnection {
    stream: FtpStream,
}

impl FtpConnection {
    /// Connects, logs in, optionally upgrades to explicit FTPS, and switches
    /// to binary (image) transfer type and passive data connections.
    pub fn connect(opts: &FtpConnectOptions) -> Result<Self, FtpTransportError> {
        let addr = (opts.server.as_str(), opts.port)
            .to_socket_addrs()
            .map_err(FtpTransportError::Io)?
            .next()
            .ok_or_else(|| {
                FtpTransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("could not resolve {}:{}", opts.server, opts.port),
                ))
            })?;

        let mut stream = FtpStream::connect_timeout(addr, opts.connect_timeout).map_err(|source| {
            FtpTransportError::Connect { server: opts.server.clone(), port: opts.port, source }
        })?;

        if opts.enable_tls {
            stream = Self::upgrade_tls(stream, &opts.server)?;
        }

        stream.login(&opts.username, &opts.password).map_err(FtpTransportError::Login)?;

        if opts.enable_tls {
            // PROT P: protect the data channel too, not just the control channel.
            stream.set_mode(Mode::Passive);
        } else {
            stream.set_mode(Mode::Passive);
        }

        stream.transfer_type(FileType::Binary).map_err(FtpTransportError::Login)?;

        Ok(FtpConnection { stream })
    }

    /// `AUTH TLS`. A server that replies `500 ... TLS ...` to this command
    /// does not support it; surface a distinct, actionable error for that
    /// case instead of a generic failure.
    fn upgrade_tls(stream: FtpStream, domain: &str) -> Result<FtpStream, FtpTransportError> {
        let connector = suppaftp::native_tls::TlsConnector::new().map_err(|e| {
            FtpTransportError::TlsUpgrade(FtpError::ConnectionError(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            )))
        })?;

        stream.into_secure(connector.into(), domain).map_err(|source| {
            if is_tls_unsupported(&source) {
                FtpTransportError::TlsNotSupported(source)
            } else {
                FtpTransportError::TlsUpgrade(source)
            }
        })
    }

    /// File size in bytes, queried in binary mode per RFC 3659 `SIZE`.
    pub fn size(&mut self, remote_path: &str) -> Result<u64, FtpTransportError> {
        self.stream
            .size(remote_path)
            .map(|n| n as u64)
            .map_err(|source| FtpTransportError::Size { path: remote_path.to_string(), source })
    }

    /// Directory listing of `path`, one entry per line, in `LIST` format.
    pub fn list(&mut self, path: &str) -> Result<Vec<String>, FtpTransportError> {
        self.stream
            .list(Some(path))
            .map_err(|source| FtpTransportError::List { path: path.to_string(), source })
    }

    /// Changes the working directory. Used only to probe whether
    /// `remote_path` names a directory; the probe connection is discarded
    /// afterwards rather than reused, since a failed `CWD` can leave
    /// directory-walking state undefined on some servers.
    pub fn cwd(&mut self, path: &str) -> Result<(), FtpTransportError> {
        self.stream
            .cwd(path)
            .map_err(|source| FtpTransportError::Cwd { path: path.to_string(), source })
    }

    /// Opens a `RETR` data connection starting at `offset` bytes into
    /// `remote_path`, via `REST` + `RETR`. The returned stream has a 30
    /// second read timeout, matching the original downloader.
    pub fn open_retr(&mut self, remote_path: &str, offset: u64) -> Result<RetrStream<'_>, FtpTransportError> {
        self.stream.resume_transfer(offset as usize).map_err(|source| FtpTransportError::Retr {
            path: remote_path.to_string(),
            offset,
            source,
        })?;

        let data_stream = self.stream.retr_as_stream(remote_path).map_err(|source| FtpTransportError::Retr {
            path: remote_path.to_string(),
            offset,
            source,
        })?;

        if let Some(tcp) = data_stream.get_ref() {
            let _ = tcp.set_read_timeout(Some(RECV_TIMEOUT));
        }

        Ok(RetrStream { connection: self, data_stream: Some(data_stream) })
    }

}

impl Drop for FtpConnection {
    /// Sends `QUIT` on every exit path, including the early returns `?`
    /// takes on a worker's or the walker's connection errors. Best-effort:
    /// failures here do not change the outcome of a download that already
    /// succeeded or already failed.
    fn drop(&mut self) {
        let _ = self.stream.quit();
    }
}

/// Returns true if `err` looks like the permanent-reply-with-"TLS" pattern
/// the original downloader special-cases: a server that does not implement
/// `AUTH TLS` at all.
fn is_tls_unsupported(err: &FtpError) -> bool {
    match err {
        FtpError::UnexpectedResponse(response) => {
            response.status == Status::CommandNotImplemented
                && String::from_utf8_lossy(&response.body).contains("TLS")
        }
        _ => false,
    }
}

/// An open `RETR` data connection. Reading past the expected number of bytes
/// is the caller's responsibility to avoid; dropping this early (e.g. on
/// abort) leaves the control connection in a state where only `QUIT` is
/// safe to issue next, which `FtpConnection`'s `Drop` impl sends.
pub struct RetrStream<'a> {
    connection: &'a mut FtpConnection,
    data_stream: Option<suppaftp::DataStream>,
}

impl Read for RetrStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data_stream
            .as_mut()
            .expect("data_stream taken before final read")
            .read(buf)
    }
}

impl Drop for RetrStream<'_> {
    fn drop(&mut self) {
        if let Some(stream) = self.data_stream.take() {
            let _ = self.connection.stream.finalize_retr_stream(stream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_unsupported_detection_matches_command_not_implemented_with_tls_body() {
        let response = suppaftp::Response::new(Status::CommandNotImplemented, b"Unknown command: \"AUTH TLS\"".to_vec());
        let err = FtpError::UnexpectedResponse(response);
        assert!(is_tls_unsupported(&err));
    }

    #[test]
    fn tls_unsupported_detection_rejects_unrelated_errors() {
        let response = suppaftp::Response::new(Status::CommandNotImplemented, b"Unknown command: \"FOO\"".to_vec());
        let err = FtpError::UnexpectedResponse(response);
        assert!(!is_tls_unsupported(&err));
    }
}
