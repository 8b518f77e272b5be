//! Recursively resolves an FTP path to a flat list of files to download.
//!
//! A plain file downloads as-is; a directory is walked recursively, mirroring
//! its structure under the local path. Whether `remote_path` is a directory
//! is discovered by attempting a `CWD` into it: servers don't expose a
//! `STAT`-like "is this a directory" query portably, but every FTP server
//! answers `CWD` correctly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ftp::{FtpConnectOptions, FtpConnection, FtpTransportError};

/// One file to download: its path on the server and where it should land
/// locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub remote_path: String,
    pub local_path: PathBuf,
}

/// Expands `remote_path` into the list of files to download, recursing into
/// directories. Checks `abort` between every directory listing so a
/// Ctrl-C during a large, slow-to-enumerate tree doesn't keep walking.
pub fn plan(
    connect_opts: &FtpConnectOptions,
    remote_path: &str,
    local_path: &Path,
    abort: &AtomicBool,
) -> Result<Vec<PlannedFile>, FtpTransportError> {
    let mut out = Vec::new();
    walk(connect_opts, remote_path, local_path, abort, &mut out)?;
    Ok(out)
}

fn walk(
    connect_opts: &FtpConnectOptions,
    remote_path: &str,
    local_path: &Path,
    abort: &AtomicBool,
    out: &mut Vec<PlannedFile>,
) -> Result<(), FtpTransportError> {
    if abort.load(Ordering::SeqCst) {
        return Ok(());
    }

    let entries = {
        let mut connection = FtpConnection::connect(connect_opts)?;
        // `[` is a glob metacharacter in the LIST argument on most servers;
        // escape it so filenames containing it don't break the listing.
        let escaped = remote_path.replace('[', r"\[");
        match connection.cwd(remote_path) {
            Ok(()) => Some(connection.list(&escaped)?),
            Err(_) => None,
        }
    };

    let Some(entries) = entries else {
        out.push(PlannedFile { remote_path: remote_path.to_string(), local_path: local_path.to_path_buf() });
        return Ok(());
    };

    for entry in entries {
        if abort.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(name) = entry_name(&entry) else { continue };
        let child_remote = join_remote(remote_path, &name);
        let child_local = local_path.join(&name);
        walk(connect_opts, &child_remote, &child_local, abort, out)?;
    }
    Ok(())
}

fn join_remote(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Pulls the filename out of a `LIST`-format line (Unix `ls -l` style). Lines
/// that don't parse (blank, malformed) are skipped rather than failing the
/// whole listing.
fn entry_name(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let name = trimmed.split_whitespace().last()?;
    if name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}
