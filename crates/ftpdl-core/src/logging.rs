//! Logging init: file under the XDG state dir, or graceful fallback to
//! stderr if that directory isn't writable.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

enum FileOrStderr {
    File(std::fs::File),
    Stderr,
}

impl io::Write for FileOrStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileOrStderr::File(f) => f.write(buf),
            FileOrStderr::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileOrStderr::File(f) => f.flush(),
            FileOrStderr::Stderr => io::stderr().lock().flush(),
        }
    }
}

/// Initializes structured logging to `~/.local/state/ftpdl/ftpdl.log`.
/// `debug` raises the default filter from `info` to `debug` for this crate
/// (the CLI's `--debug` flag), unless `RUST_LOG` is already set. On failure
/// (e.g. the state dir isn't writable) returns `Err` so the caller can fall
/// back to [`init_logging_stderr`].
pub fn init_logging(debug: bool) -> Result<()> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ftpdl")?;
    let log_dir = xdg_dirs.get_state_home().join("ftpdl");

    fs::create_dir_all(&log_dir)?;
    let log_file_path: PathBuf = log_dir.join("ftpdl.log");

    let file = fs::OpenOptions::new().create(true).append(true).open(&log_file_path)?;

    struct FileMakeWriter(std::fs::File);

    impl<'a> MakeWriter<'a> for FileMakeWriter {
        type Writer = FileOrStderr;

        fn make_writer(&'a self) -> Self::Writer {
            self.0.try_clone().map(FileOrStderr::File).unwrap_or(FileOrStderr::Stderr)
        }
    }

    let writer: BoxMakeWriter = BoxMakeWriter::new(FileMakeWriter(file));
    let env_filter = default_filter(debug);

    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(writer).with_ansi(false).init();

    tracing::info!("ftpdl logging initialized at {}", log_file_path.display());

    Ok(())
}

/// Initializes logging to stderr only. Use when [`init_logging`] fails so
/// the CLI doesn't crash for want of a log file.
pub fn init_logging_stderr(debug: bool) {
    let env_filter = default_filter(debug);
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).with_ansi(false).init();
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug { "debug,ftpdl=trace" } else { "info,ftpdl=debug" })
    })
}
