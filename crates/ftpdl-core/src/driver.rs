//! Top-level orchestration: turns one CLI invocation into a sequence of
//! per-file downloads, wiring the walker, the supervisor, and the display
//! together. Mirrors the original downloader's `download()`/`download_file()`
//! split, generalized so a single file and a directory tree go through the
//! same path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::blockmap::Blockmap;
use crate::control::AbortController;
use crate::display::DisplaySink;
use crate::ftp::FtpConnectOptions;
use crate::supervisor::{Outcome, Supervisor, SupervisorConfig, SupervisorError};
use crate::walker::{self, PlannedFile};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Ftp(#[from] crate::ftp::FtpTransportError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One download request, corresponding 1:1 to the CLI's flags.
pub struct DownloadRequest {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub enable_tls: bool,
    pub connections: usize,
    pub min_blocks_per_segment: usize,
    pub max_blocks_per_segment: usize,
    pub blocksize: u64,
    pub kill_speed: f64,
    pub clean: bool,
}

/// Downloads `request.remote_path` (a file or a directory tree) to
/// `request.local_path`, one file at a time. Stops early, without error, if
/// `abort` is set mid-walk or mid-file.
pub fn run(
    request: &DownloadRequest,
    abort: &AbortController,
    mut display: impl DisplaySink,
) -> Result<Outcome, DriverError> {
    let connect_opts = FtpConnectOptions {
        server: request.server.clone(),
        port: request.port,
        username: request.username.clone(),
        password: request.password.clone(),
        enable_tls: request.enable_tls,
        connect_timeout: Duration::from_secs(30),
    };

    if abort.is_requested() {
        return Ok(Outcome::Aborted);
    }

    let files = walker::plan(&connect_opts, &request.remote_path, &request.local_path, abort.flag())?;

    for file in files {
        if abort.is_requested() {
            return Ok(Outcome::Aborted);
        }
        let outcome = download_one(request, &connect_opts, &file, abort, &mut display)?;
        if outcome == Outcome::Aborted {
            return Ok(Outcome::Aborted);
        }
    }

    Ok(Outcome::Completed)
}

fn download_one(
    request: &DownloadRequest,
    connect_opts: &FtpConnectOptions,
    file: &PlannedFile,
    abort: &AbortController,
    display: &mut impl DisplaySink,
) -> Result<Outcome, DriverError> {
    if let Some(parent) = file.local_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if request.clean {
        clean_local_file(&file.local_path, request)?;
    }

    let blockmap_already_exists =
        Blockmap::new(&file.local_path, request.min_blocks_per_segment, request.max_blocks_per_segment, request.blocksize)
            .map(|bm| bm.exists())
            .unwrap_or(false);

    if !blockmap_already_exists && file.local_path.exists() {
        if std::fs::metadata(&file.local_path)?.len() > 0 {
            info!(path = %file.local_path.display(), "already downloaded, skipping");
            return Ok(Outcome::Completed);
        }
    }

    let mut supervisor = Supervisor::new(SupervisorConfig {
        remote_path: file.remote_path.clone(),
        local_path: file.local_path.clone(),
        connect_opts: connect_opts.clone(),
        concurrent_connections: request.connections,
        min_blocks_per_segment: request.min_blocks_per_segment,
        max_blocks_per_segment: request.max_blocks_per_segment,
        initial_blocksize: request.blocksize,
        kill_speed: request.kill_speed,
    })?;

    let outcome = supervisor.run(abort.flag(), |ctx| display.refresh(ctx));
    display.finish();

    match outcome {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            warn!(path = %file.local_path.display(), error = %e, "download failed, blockmap preserved for resume");
            Err(e.into())
        }
    }
}

/// Deletes a previously downloaded file and its blockmap sidecar, if present.
fn clean_local_file(local_path: &Path, request: &DownloadRequest) -> Result<(), DriverError> {
    if local_path.exists() {
        std::fs::remove_file(local_path)?;
    }
    if let Ok(blockmap) =
        Blockmap::new(local_path, request.min_blocks_per_segment, request.max_blocks_per_segment, request.blocksize)
    {
        if blockmap.exists() {
            blockmap.delete().map_err(|e| DriverError::Supervisor(SupervisorError::from(e)))?;
        }
    }
    Ok(())
}
