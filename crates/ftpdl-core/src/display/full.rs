use super::{ansi, status_color, summary_line};
use crate::supervisor::RefreshContext;
use crate::worker::SPEED_FIFO_SIZE;

/// Renders the full ANSI dashboard: summary line at row 1, the speed FIFO
/// grid starting at row 3, and the blockmap filling the rest of the screen.
pub fn render(ctx: &RefreshContext, rows: u16, cols: u16) -> String {
    let mut s = String::new();

    let y = 1;
    s.push_str(&ansi::move_to(y, 0));
    s.push_str(ansi::WHITE);
    s.push_str(&summary_line(ctx));
    s.push_str(ansi::CLEAR_REST_OF_LINE);
    s.push_str(&ansi::move_to(y + 1, 0));
    s.push_str(ansi::CLEAR_REST_OF_LINE);

    let y = 3;
    s.push_str(&ansi::move_to(y, 0));
    s.push_str(&speed_fifo_grid(ctx));
    s.push_str(&ansi::move_to(y + SPEED_FIFO_SIZE as u16, 0));
    s.push_str(ansi::CLEAR_REST_OF_LINE);

    let y = y + SPEED_FIFO_SIZE as u16 + 1;
    s.push_str(&ansi::move_to(y, 0));
    s.push_str(&blockmap_grid(&ctx.blockmap, rows.saturating_sub(y + 1), cols));

    s.push_str(ansi::CLEAR_REST_OF_SCREEN);
    s
}

/// The depth-`SPEED_FIFO_SIZE` grid of per-worker speed history, oldest
/// sample on top, colored white at zero, red under `kill_speed`, green
/// otherwise.
fn speed_fifo_grid(ctx: &RefreshContext) -> String {
    let mut s = String::new();
    let mut last_color: Option<&str> = None;

    for depth in (0..SPEED_FIFO_SIZE).rev() {
        for worker in &ctx.workers {
            let speed_mb = worker.speed_fifo.get(depth).copied().unwrap_or(0.0) / 1024.0 / 1024.0;
            let color = if speed_mb == 0.0 {
                ansi::WHITE
            } else if speed_mb < ctx.kill_speed {
                ansi::RED
            } else {
                ansi::GREEN
            };
            if last_color != Some(color) {
                s.push_str(color);
                last_color = Some(color);
            }
            s.push_str(&format!("{speed_mb:6.2} "));
        }
        s.push_str(ansi::CLEAR_REST_OF_LINE);
        s.push_str("\r\n");
    }
    s
}

/// Fits `blockmap` into a `rows` by `cols` window, scaling down (never up)
/// and color-coding each rendered character by status.
fn blockmap_grid(blockmap: &str, rows: u16, cols: u16) -> String {
    let chars: Vec<char> = blockmap.chars().collect();
    if chars.is_empty() || rows == 0 || cols == 0 {
        return String::new();
    }

    let scale = (rows as f64 * cols as f64 / chars.len() as f64).min(1.0);
    let mut s = String::new();
    let mut last_color: Option<&str> = None;

    for y in 0..rows {
        for x in 0..cols {
            let position = y as usize * cols as usize + x as usize;
            if position >= chars.len() {
                break;
            }
            let index = ((position as f64) / scale) as usize;
            let c = chars.get(index).copied().unwrap_or(chars[chars.len() - 1]);
            let color = status_color(c);
            if last_color != Some(color) {
                s.push_str(color);
                last_color = Some(color);
            }
            s.push(c);
        }
        s.push_str(ansi::CLEAR_REST_OF_LINE);
        s.push_str("\r\n");
    }
    s
}
