//! Owns the blockmap and the output file for one download and drives the
//! worker pool: allocates idle workers, applies the kill-speed policy,
//! drains worker messages, and coalesces writes.

mod workers;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::blockmap::{Blockmap, BlockmapError, BlockStatus, Statistics};
use crate::ftp::{FtpConnectOptions, FtpConnection, FtpTransportError};
use crate::storage;
use crate::worker::{self, KillSwitch, OutboundMessage, OutboundQueue};
use workers::{WorkerState, WorkerTable};

/// Above this many queued-but-unprocessed worker messages, stop allocating
/// new segments until the backlog drains. Matches the original downloader's
/// `NUM_QUEUE_MSGS_THROTTLE`.
const NUM_QUEUE_MSGS_THROTTLE: usize = 100;

/// A worker must be this old before the kill-speed policy considers it
/// stalled, giving slow-starting connections to distant servers time to ramp
/// up.
const KILL_POLICY_WARMUP: Duration = Duration::from_secs(20);

/// Coalesce low-priority writes up to this many bytes before flushing, same
/// cap as the original downloader.
const MAX_COALESCE_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Blockmap(#[from] BlockmapError),
    #[error(transparent)]
    Ftp(#[from] FtpTransportError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How a download run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
}

/// Per-worker information surfaced to a [`crate::display::DisplaySink`].
pub struct WorkerSnapshot {
    pub worker_id: char,
    pub active: bool,
    pub current_speed: f64,
    /// Most recent sample first, depth [`worker::SPEED_FIFO_SIZE`]. All zero
    /// for an idle worker.
    pub speed_fifo: Vec<f64>,
}

/// Everything a display needs to render one refresh tick.
pub struct RefreshContext<'a> {
    pub remote_path: &'a str,
    pub statistics: Statistics,
    pub blockmap: String,
    pub workers: Vec<WorkerSnapshot>,
    pub total_speed: f64,
    pub kill_speed: f64,
}

pub struct SupervisorConfig {
    pub remote_path: String,
    pub local_path: PathBuf,
    pub connect_opts: FtpConnectOptions,
    pub concurrent_connections: usize,
    pub min_blocks_per_segment: usize,
    pub max_blocks_per_segment: usize,
    pub initial_blocksize: u64,
    /// MB/sec floor; a worker averaging under this after warmup is killed and
    /// its blocks reallocated. Zero disables the policy.
    pub kill_speed: f64,
}

pub struct Supervisor {
    config: SupervisorConfig,
    blockmap: Blockmap,
    workers: WorkerTable,
    kill_switch: Arc<KillSwitch>,
    outbound: Arc<OutboundQueue>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let concurrent_connections = config.concurrent_connections.clamp(1, crate::blockmap::PENDING_IDS.len());
        let blockmap = Blockmap::new(
            &config.local_path,
            config.min_blocks_per_segment,
            config.max_blocks_per_segment,
            config.initial_blocksize,
        )?;
        Ok(Supervisor {
            workers: WorkerTable::new(concurrent_connections),
            blockmap,
            config,
            kill_switch: Arc::new(KillSwitch::new()),
            outbound: Arc::new(OutboundQueue::new()),
        })
    }

    pub fn blockmap_path(&self) -> &Path {
        self.blockmap.path()
    }

    /// Runs the download to completion or abort. `on_refresh` is called once
    /// per tick (roughly every millisecond); `abort` is polled once per tick
    /// and, when set, stops allocating new work and kills every active
    /// worker, returning [`Outcome::Aborted`] once they've all wound down.
    pub fn run(
        &mut self,
        abort: &AtomicBool,
        mut on_refresh: impl FnMut(&RefreshContext),
    ) -> Result<Outcome, SupervisorError> {
        let file_size = {
            let mut probe = FtpConnection::connect(&self.config.connect_opts)?;
            probe.size(&self.config.remote_path)?
        };

        storage::ensure_local_file(&self.config.local_path)?;
        self.blockmap.init(file_size)?;

        loop {
            if abort.load(AtomicOrdering::SeqCst) {
                self.kill_all_active();
                self.drain_until_all_idle();
                return Ok(Outcome::Aborted);
            }

            if self.blockmap.is_complete()? {
                break;
            }

            self.apply_kill_policy();

            let throttle = self.outbound.len() > NUM_QUEUE_MSGS_THROTTLE;
            if !throttle {
                self.allocate_idle_workers()?;
            }

            self.drain_high_priority_messages()?;
            self.drain_low_priority_messages()?;
            self.drain_high_priority_messages()?;
            self.drain_low_priority_messages()?;
            self.reap_dead_workers();

            let ctx = self.refresh_context()?;
            on_refresh(&ctx);

            thread::sleep(Duration::from_millis(1));
        }

        self.blockmap.delete()?;
        Ok(Outcome::Completed)
    }

    fn refresh_context(&self) -> Result<RefreshContext<'_>, SupervisorError> {
        let total_speed: f64 = self
            .workers
            .iter()
            .filter_map(|(_, s)| match s {
                WorkerState::Active { speed_fifo, .. } | WorkerState::Aborting { speed_fifo, .. } => {
                    Some(speed_fifo.front().copied().unwrap_or(0.0))
                }
                WorkerState::Idle => None,
            })
            .sum();

        let workers = self
            .workers
            .iter()
            .map(|(id, state)| {
                let (active, current_speed, speed_fifo) = match state {
                    WorkerState::Active { speed_fifo, .. } | WorkerState::Aborting { speed_fifo, .. } => {
                        (true, speed_fifo.front().copied().unwrap_or(0.0), speed_fifo.iter().copied().collect())
                    }
                    WorkerState::Idle => (false, 0.0, vec![0.0; worker::SPEED_FIFO_SIZE]),
                };
                WorkerSnapshot { worker_id: *id, active, current_speed, speed_fifo }
            })
            .collect();

        Ok(RefreshContext {
            remote_path: &self.config.remote_path,
            statistics: self.blockmap.get_statistics(total_speed)?,
            blockmap: self.blockmap.render()?,
            workers,
            total_speed,
            kill_speed: self.config.kill_speed,
        })
    }

    fn apply_kill_policy(&mut self) {
        if self.config.kill_speed <= 0.0 {
            return;
        }
        let mut to_kill = Vec::new();
        for (worker_id, state) in self.workers.iter() {
            if let WorkerState::Active { started_at, speed_fifo, .. } = state {
                if started_at.elapsed() <= KILL_POLICY_WARMUP {
                    continue;
                }
                if speed_fifo.iter().any(|&s| s == 0.0) {
                    continue; // still ramping up
                }
                let max_speed = speed_fifo.iter().cloned().fold(f64::MIN, f64::max);
                let mb_per_sec = max_speed / (1024.0 * 1024.0);
                if mb_per_sec < self.config.kill_speed {
                    to_kill.push(*worker_id);
                }
            }
        }
        for worker_id in to_kill {
            warn!(worker_id, "killing stalled worker below kill_speed floor");
            self.kill_switch.request_kill(worker_id);
            self.workers.mark_aborting(worker_id);
        }
    }

    fn kill_all_active(&mut self) {
        let ids: Vec<char> = self
            .workers
            .iter()
            .filter(|(_, s)| matches!(s, WorkerState::Active { .. }))
            .map(|(id, _)| *id)
            .collect();
        for worker_id in ids {
            self.kill_switch.request_kill(worker_id);
            self.workers.mark_aborting(worker_id);
        }
    }

    fn drain_until_all_idle(&mut self) {
        while !self.workers.all_idle() {
            let _ = self.drain_high_priority_messages();
            self.reap_dead_workers();
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn allocate_idle_workers(&mut self) -> Result<(), SupervisorError> {
        let idle = self.workers.idle_ids();
        if idle.is_empty() {
            return Ok(());
        }
        let stats = self.blockmap.get_statistics(0.0)?;
        if stats.available_blocks == 0 {
            return Ok(());
        }
        let allocations = self.blockmap.allocate(&idle)?;
        for (worker_id, allocation) in allocations {
            let connect_opts = self.config.connect_opts.clone();
            let remote_path = self.config.remote_path.clone();
            let blocksize = stats.blocksize;
            let kill_switch = Arc::clone(&self.kill_switch);
            let outbound = Arc::clone(&self.outbound);

            let handle = thread::Builder::new()
                .name(format!("ftpdl-worker-{worker_id}"))
                .spawn(move || {
                    if let Err(e) = worker::run_segment(
                        &connect_opts,
                        &remote_path,
                        allocation.byte_offset,
                        allocation.blocks,
                        blocksize,
                        worker_id,
                        &kill_switch,
                        &outbound,
                    ) {
                        warn!(worker_id, error = %e, "worker exited without reporting a terminal status");
                    }
                })
                .expect("failed to spawn worker thread");

            self.workers.set_active(worker_id, handle);
        }
        Ok(())
    }

    fn drain_high_priority_messages(&mut self) -> Result<(), SupervisorError> {
        loop {
            if !self.outbound.peek_is_high_priority() {
                return Ok(());
            }
            let Some(message) = self.outbound.pop() else { return Ok(()) };
            match message {
                OutboundMessage::DataHigh { byte_offset, .. } => {
                    self.blockmap.change_block_range_status(byte_offset, 1, BlockStatus::SAVING)?;
                }
                OutboundMessage::Aborted { worker_id } | OutboundMessage::Finished { worker_id } => {
                    self.reclaim_worker(worker_id)?;
                }
                OutboundMessage::SpeedUpdate { worker_id, bytes_per_sec } => {
                    self.workers.push_speed_sample(worker_id, bytes_per_sec);
                }
                OutboundMessage::DataLow { .. } => unreachable!("DataLow is never high priority"),
            }
        }
    }

    fn reclaim_worker(&mut self, worker_id: char) -> Result<(), SupervisorError> {
        self.blockmap.change_status(worker_id, BlockStatus::AVAILABLE)?;
        if let Some(Err(panic)) = self.workers.set_idle(worker_id) {
            warn!(worker_id, ?panic, "worker thread panicked");
        }
        Ok(())
    }

    fn drain_low_priority_messages(&mut self) -> Result<(), SupervisorError> {
        let mut data = Vec::new();
        let mut starting_offset: Option<u64> = None;
        let mut next_offset: Option<u64> = None;
        let mut blocks = 0usize;

        loop {
            if self.outbound.peek_is_high_priority() {
                break;
            }
            let Some(message) = self.outbound.pop() else { break };
            let OutboundMessage::DataLow { worker_id, byte_offset, data: block } = message else {
                unreachable!("only DataLow messages are low priority")
            };

            if let Some(expected) = next_offset {
                if byte_offset != expected {
                    // Not contiguous with what we've gathered so far; this
                    // message belongs to the next coalesced batch.
                    self.outbound.push(OutboundMessage::DataLow { worker_id, byte_offset, data: block });
                    break;
                }
            }

            starting_offset.get_or_insert(byte_offset);
            next_offset = Some(byte_offset + block.len() as u64);
            blocks += 1;
            data.extend_from_slice(&block);

            if data.len() >= MAX_COALESCE_BYTES {
                break;
            }
        }

        if let Some(offset) = starting_offset {
            storage::write_at(&self.config.local_path, offset, &data)?;
            self.blockmap.change_block_range_status(offset, blocks, BlockStatus::DOWNLOADED)?;
        }
        Ok(())
    }

    /// Reclaims segments belonging to worker threads that exited without
    /// reporting `Finished` or `Aborted` themselves (a panic, or a transport
    /// error the worker returned rather than swallowed).
    fn reap_dead_workers(&mut self) {
        for worker_id in self.workers.dead_worker_ids() {
            warn!(worker_id, "worker thread exited without a terminal message, reclaiming its segment");
            if let Err(e) = self.blockmap.change_status(worker_id, BlockStatus::AVAILABLE) {
                warn!(worker_id, error = %e, "failed to reclaim blocks for dead worker");
            }
            if let Some(Err(panic)) = self.workers.set_idle(worker_id) {
                warn!(worker_id, ?panic, "worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> FtpConnectOptions {
        FtpConnectOptions {
            server: "127.0.0.1".into(),
            port: 21,
            username: "anonymous".into(),
            password: "anon".into(),
            enable_tls: false,
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn new_rejects_directory_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            remote_path: "/file".into(),
            local_path: dir.path().to_path_buf(),
            connect_opts: opts(),
            concurrent_connections: 4,
            min_blocks_per_segment: 8,
            max_blocks_per_segment: 128,
            initial_blocksize: 1_048_576,
            kill_speed: 0.0,
        };
        assert!(Supervisor::new(config).is_err());
    }

    #[test]
    fn concurrent_connections_clamped_to_pending_alphabet_length() {
        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            remote_path: "/file".into(),
            local_path: dir.path().join("out.bin"),
            connect_opts: opts(),
            concurrent_connections: 99,
            min_blocks_per_segment: 8,
            max_blocks_per_segment: 128,
            initial_blocksize: 1_048_576,
            kill_speed: 0.0,
        };
        let supervisor = Supervisor::new(config).unwrap();
        assert_eq!(supervisor.workers.ids().len(), crate::blockmap::PENDING_IDS.len());
    }
}
