//! Flat, argparse-shaped CLI: one binary, one download per invocation
//! (possibly expanding into many files if `--remote_path` is a directory).
//! Defaults for flags the user omits come from the on-disk config
//! ([`ftpdl_core::config`]); flags given on the command line win.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ftpdl")]
#[command(about = "Multi-segment FTP downloader", long_about = None)]
pub struct Cli {
    /// FTP server hostname or address.
    #[arg(long, short = 's')]
    pub server: String,

    /// FTP username.
    #[arg(long, short = 'u', default_value = "anonymous")]
    pub username: String,

    /// FTP password.
    #[arg(long, short = 'p', default_value = "password")]
    pub password: String,

    /// Remote file or directory to download.
    #[arg(long = "remote_path", short = 'r')]
    pub remote_path: String,

    /// Local destination file or directory.
    #[arg(long = "local_path", short = 'l', default_value = ".")]
    pub local_path: PathBuf,

    /// FTP control port.
    #[arg(long, default_value_t = 21)]
    pub port: u16,

    /// Number of concurrent segment workers (clamped to 16).
    #[arg(long)]
    pub connections: Option<usize>,

    /// Minimum blocks per allocated segment.
    #[arg(long = "min_blocks_per_segment")]
    pub min_blocks_per_segment: Option<usize>,

    /// Maximum blocks per allocated segment.
    #[arg(long = "max_blocks_per_segment")]
    pub max_blocks_per_segment: Option<usize>,

    /// Block size in bytes. Only used when starting a fresh download; a
    /// resumed download keeps the blocksize recorded in its blockmap.
    #[arg(long)]
    pub blocksize: Option<u64>,

    /// Kill a worker once the FIFO-smoothed total speed drops below this
    /// many MB/s, after a warmup window. `0` disables the kill policy.
    #[arg(long = "kill_speed")]
    pub kill_speed: Option<f64>,

    /// How much to print while downloading.
    #[arg(long = "display_mode", value_enum, default_value_t = DisplayMode::Full)]
    pub display_mode: DisplayMode,

    /// Delete any existing output file and blockmap before starting.
    #[arg(long)]
    pub clean: bool,

    /// Upgrade the control and data connections with TLS.
    #[arg(long = "enable_tls")]
    pub enable_tls: bool,

    /// Raise the log filter and print full error chains on failure.
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DisplayMode {
    Quiet,
    Compact,
    Full,
}
