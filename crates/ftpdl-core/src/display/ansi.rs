//! The handful of ANSI escapes the full display needs. No dependency on a
//! terminal-control crate: the original downloader doesn't use one either,
//! and the set of codes needed is tiny and fixed.

pub const WHITE: &str = "\x1b[37m";
pub const RED: &str = "\x1b[91m";
pub const GREEN: &str = "\x1b[92m";
pub const YELLOW: &str = "\x1b[93m";

pub const CLEAR_REST_OF_LINE: &str = "\x1b[K";
pub const CLEAR_REST_OF_SCREEN: &str = "\x1b[J";

pub fn move_to(row: u16, col: u16) -> String {
    format!("\x1b[{row};{col}H")
}
