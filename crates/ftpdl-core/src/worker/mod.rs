//! The worker thread loop: downloads one allocated segment over its own FTP
//! connection and reports progress to the supervisor through a shared
//! priority queue.
//!
//! A worker never touches the blockmap or the output file directly — it only
//! emits messages. This keeps every block-status and byte write funneled
//! through the supervisor, which is the sole reader/writer of both.

mod queue;

pub use queue::{KillSwitch, OutboundMessage, OutboundQueue};

use std::time::{Duration, Instant};

use crate::ftp::{FtpConnectOptions, FtpConnection, FtpTransportError};

/// Depth of the download-speed FIFO each worker reports into.
pub const SPEED_FIFO_SIZE: usize = 4;

/// Data is read off the socket in chunks this many times the blocksize, same
/// ratio as the original downloader's `conn.recv(blocksize * 8)`.
const RECV_MULTIPLE: u64 = 8;

/// Downloads `blocks` blocks of `blocksize` bytes starting at `byte_offset`
/// into `remote_path`, reporting progress as [`OutboundMessage`]s on `out`.
/// `blocks`/`blocksize` describe the segment's nominal size; if the data
/// connection reaches a clean EOF with fewer bytes (the segment covers the
/// file's true, possibly-short last block), the residual is flushed as a
/// final partial block and the segment still finishes successfully.
///
/// Returns `Ok(())` after a clean finish or an explicit kill (both of which
/// push their own terminal message). Returns `Err` on a connection or
/// protocol failure that leaves the segment genuinely incomplete, *without*
/// pushing a terminal message — the supervisor notices the worker thread
/// exited without `Finished`/`Aborted` and reclaims the segment itself (see
/// `supervisor::reap_dead_workers`).
pub fn run_segment(
    connect_opts: &FtpConnectOptions,
    remote_path: &str,
    mut byte_offset: u64,
    blocks: usize,
    blocksize: u64,
    worker_id: char,
    kill_switch: &KillSwitch,
    out: &OutboundQueue,
) -> Result<(), FtpTransportError> {
    let mut connection = FtpConnection::connect(connect_opts)?;
    let mut retr = connection.open_retr(remote_path, byte_offset)?;

    let total_bytes = blocks as u64 * blocksize;
    let mut bytes_received: u64 = 0;
    let mut bytes_since_last_tick: u64 = 0;
    let mut data: Vec<u8> = Vec::with_capacity(blocksize as usize * 2);
    let mut recv_buf = vec![0u8; (blocksize * RECV_MULTIPLE) as usize];
    let mut window_start = Instant::now();

    while bytes_received < total_bytes {
        if kill_switch.take_if_addressed_to(worker_id) {
            out.push(OutboundMessage::Aborted { worker_id });
            return Ok(());
        }

        let n = read_chunk(&mut retr, &mut recv_buf)?;
        if n == 0 {
            // Clean EOF on the data connection. `total_bytes` is the segment's
            // nominal size (full blocks), but a file's true last block can be
            // shorter than `blocksize` — a segment that reaches the end of the
            // file legitimately stops here with a partial final block, not an
            // error.
            break;
        }
        data.extend_from_slice(&recv_buf[..n]);
        bytes_since_last_tick += n as u64;

        let elapsed = window_start.elapsed();
        if elapsed > Duration::from_secs(1) {
            let speed = bytes_since_last_tick as f64 / elapsed.as_secs_f64();
            out.push(OutboundMessage::SpeedUpdate { worker_id, bytes_per_sec: speed });
            window_start = Instant::now();
            bytes_since_last_tick = 0;
        }

        while data.len() as u64 >= blocksize {
            let block: Vec<u8> = data.drain(..blocksize as usize).collect();
            out.push(OutboundMessage::DataHigh { worker_id, byte_offset });
            out.push(OutboundMessage::DataLow { worker_id, byte_offset, data: block });
            byte_offset += blocksize;
            bytes_received += blocksize;
        }
    }

    if !data.is_empty() {
        // Residual short tail block (the file's genuinely last block).
        let block = std::mem::take(&mut data);
        out.push(OutboundMessage::DataHigh { worker_id, byte_offset });
        out.push(OutboundMessage::DataLow { worker_id, byte_offset, data: block });
    } else if bytes_received < total_bytes {
        return Err(FtpTransportError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "ftp data connection closed after {bytes_received} of {total_bytes} bytes for worker {worker_id}"
            ),
        )));
    }

    out.push(OutboundMessage::Finished { worker_id });
    Ok(())
}

fn read_chunk(retr: &mut crate::ftp::RetrStream<'_>, buf: &mut [u8]) -> Result<usize, FtpTransportError> {
    use std::io::Read;
    Ok(retr.read(buf)?)
}
