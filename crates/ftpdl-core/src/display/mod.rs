//! Rendering the download's progress to a terminal.
//!
//! Three modes, matching the CLI's `--display_mode`: `quiet` (nothing),
//! `compact` (one line, no ANSI, safe for a log file), and `full` (an ANSI
//! full-screen dashboard sized to the terminal).

mod ansi;
mod full;

use crate::blockmap::BlockStatus;
use crate::supervisor::RefreshContext;

/// Called once per supervisor tick with the current progress.
pub trait DisplaySink {
    fn refresh(&mut self, ctx: &RefreshContext);
    /// Called once after the run loop exits, success or not.
    fn finish(&mut self) {}
}

/// No output at all.
pub struct Quiet;

impl DisplaySink for Quiet {
    fn refresh(&mut self, _ctx: &RefreshContext) {}
}

/// A single overwritten status line, safe for redirection to a file.
#[derive(Default)]
pub struct Compact;

impl DisplaySink for Compact {
    fn refresh(&mut self, ctx: &RefreshContext) {
        print!("\r{:<79}", summary_line(ctx));
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    fn finish(&mut self) {
        println!();
    }
}

/// An ANSI full-screen dashboard: summary line, per-worker speed history,
/// and a color-coded blockmap, sized to the current terminal.
pub struct Full {
    forced_size: Option<(u16, u16)>,
}

impl Full {
    pub fn new() -> Self {
        Full { forced_size: None }
    }

    #[cfg(test)]
    fn with_forced_size(rows: u16, cols: u16) -> Self {
        Full { forced_size: Some((rows, cols)) }
    }
}

impl Default for Full {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for Full {
    fn refresh(&mut self, ctx: &RefreshContext) {
        let (rows, cols) = self.forced_size.unwrap_or_else(terminal_dimensions);
        print!("{}", full::render(ctx, rows, cols));
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    fn finish(&mut self) {
        print!("{}\n", ansi::WHITE);
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }
}

/// Terminal size, falling back to 24x80 per the original downloader when it
/// can't be determined (e.g. output is redirected to a file).
fn terminal_dimensions() -> (u16, u16) {
    terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), terminal_size::Height(h))| (h, w))
        .unwrap_or((24, 80))
}

/// The one-line `ETA:... NN.N%  N.NNNMB/sec  <path>` summary shared by the
/// compact and full displays.
fn summary_line(ctx: &RefreshContext) -> String {
    let stats = &ctx.statistics;
    let percent_complete =
        (1.0 - (stats.non_downloaded_blocks as f64 / stats.total_blocks.max(1) as f64)) * 100.0;
    let mb_per_sec = ctx.total_speed / 1024.0 / 1024.0;
    let prefix = format!("ETA:{:<13} {:5.1}%  {:.3}MB/sec  ", stats.eta, percent_complete, mb_per_sec);
    let budget = 79usize.saturating_sub(prefix.len());
    let path = ctx.remote_path;
    let tail = if path.len() > budget { &path[path.len() - budget..] } else { path };
    format!("{prefix}{tail}")
}

fn status_color(c: char) -> &'static str {
    if c == BlockStatus::DOWNLOADED {
        ansi::GREEN
    } else if c == BlockStatus::AVAILABLE {
        ansi::WHITE
    } else {
        // SAVING or a pending worker id
        ansi::YELLOW
    }
}
