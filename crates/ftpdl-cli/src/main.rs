mod cli;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, DisplayMode};
use ftpdl_core::control::AbortController;
use ftpdl_core::display::{Compact, DisplaySink, Full, Quiet};
use ftpdl_core::driver::{self, DownloadRequest};
use ftpdl_core::supervisor::Outcome;
use ftpdl_core::{config, logging};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if logging::init_logging(cli.debug).is_err() {
        logging::init_logging_stderr(cli.debug);
    }

    let defaults = config::load_or_init().unwrap_or_default();

    let request = DownloadRequest {
        server: cli.server.clone(),
        port: cli.port,
        username: cli.username.clone(),
        password: cli.password.clone(),
        remote_path: cli.remote_path.clone(),
        local_path: cli.local_path.clone(),
        enable_tls: cli.enable_tls,
        connections: cli.connections.unwrap_or(defaults.connections).min(16),
        min_blocks_per_segment: cli.min_blocks_per_segment.unwrap_or(defaults.min_blocks_per_segment),
        max_blocks_per_segment: cli.max_blocks_per_segment.unwrap_or(defaults.max_blocks_per_segment),
        blocksize: cli.blocksize.unwrap_or(defaults.blocksize),
        kill_speed: cli.kill_speed.unwrap_or(defaults.kill_speed),
        clean: cli.clean,
    };

    let abort = AbortController::new();
    {
        let abort = abort.clone();
        // Best-effort: if a handler is already installed (shouldn't happen,
        // this binary installs exactly one), just keep going without it.
        let _ = ctrlc::set_handler(move || abort.request());
    }

    let result = match cli.display_mode {
        DisplayMode::Quiet => driver::run(&request, &abort, Quiet),
        DisplayMode::Compact => driver::run(&request, &abort, Compact::default()),
        DisplayMode::Full => driver::run(&request, &abort, Full::default()),
    };

    match result {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Ok(Outcome::Aborted) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nftpdl error: {e}");
            if cli.debug {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
