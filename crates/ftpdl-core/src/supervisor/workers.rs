//! The worker table: one slot per concurrent connection, tracking its thread
//! handle, age, and recent speed samples.

use std::collections::VecDeque;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::worker::SPEED_FIFO_SIZE;

/// A worker slot's lifecycle. `Active` and `Aborting` both have a live
/// thread; the only difference is whether the supervisor has already asked
/// it to stop.
pub enum WorkerState {
    Idle,
    Active { handle: JoinHandle<()>, started_at: Instant, speed_fifo: VecDeque<f64> },
    Aborting { handle: JoinHandle<()>, started_at: Instant, speed_fifo: VecDeque<f64> },
}

impl WorkerState {
    fn fresh_fifo() -> VecDeque<f64> {
        VecDeque::from(vec![0.0; SPEED_FIFO_SIZE])
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, WorkerState::Idle)
    }
}

/// Ordered table of worker ids to their current state. Ids are assigned from
/// the `0-9A-F` alphabet in ascending order, one per concurrent connection.
pub struct WorkerTable {
    slots: Vec<(char, WorkerState)>,
}

impl WorkerTable {
    pub fn new(concurrent_connections: usize) -> Self {
        let ids: Vec<char> = crate::blockmap::PENDING_IDS.chars().take(concurrent_connections).collect();
        let slots = ids.into_iter().map(|id| (id, WorkerState::Idle)).collect();
        WorkerTable { slots }
    }

    pub fn ids(&self) -> Vec<char> {
        self.slots.iter().map(|(id, _)| *id).collect()
    }

    pub fn idle_ids(&self) -> Vec<char> {
        self.slots.iter().filter(|(_, s)| s.is_idle()).map(|(id, _)| *id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(char, WorkerState)> {
        self.slots.iter()
    }

    pub fn state(&self, worker_id: char) -> Option<&WorkerState> {
        self.slots.iter().find(|(id, _)| *id == worker_id).map(|(_, s)| s)
    }

    pub fn set_active(&mut self, worker_id: char, handle: JoinHandle<()>) {
        if let Some((_, state)) = self.slots.iter_mut().find(|(id, _)| *id == worker_id) {
            *state = WorkerState::Active {
                handle,
                started_at: Instant::now(),
                speed_fifo: WorkerState::fresh_fifo(),
            };
        }
    }

    /// Moves an `Active` slot to `Aborting` in place, keeping its handle and
    /// start time. No-op if the slot isn't `Active`.
    pub fn mark_aborting(&mut self, worker_id: char) {
        if let Some((_, state)) = self.slots.iter_mut().find(|(id, _)| *id == worker_id) {
            if let WorkerState::Active { handle, started_at, speed_fifo } =
                std::mem::replace(state, WorkerState::Idle)
            {
                *state = WorkerState::Aborting { handle, started_at, speed_fifo };
            }
        }
    }

    /// Resets a slot to `Idle`, joining its thread. Returns the handle's join
    /// result so the caller can log a panic if there was one.
    pub fn set_idle(&mut self, worker_id: char) -> Option<std::thread::Result<()>> {
        let (_, state) = self.slots.iter_mut().find(|(id, _)| *id == worker_id)?;
        let old = std::mem::replace(state, WorkerState::Idle);
        match old {
            WorkerState::Active { handle, .. } | WorkerState::Aborting { handle, .. } => {
                Some(handle.join())
            }
            WorkerState::Idle => None,
        }
    }

    pub fn push_speed_sample(&mut self, worker_id: char, sample: f64) {
        if let Some((_, state)) = self.slots.iter_mut().find(|(id, _)| *id == worker_id) {
            let fifo = match state {
                WorkerState::Active { speed_fifo, .. } | WorkerState::Aborting { speed_fifo, .. } => {
                    Some(speed_fifo)
                }
                WorkerState::Idle => None,
            };
            if let Some(fifo) = fifo {
                fifo.push_front(sample);
                fifo.pop_back();
            }
        }
    }

    /// Worker ids whose thread has exited while still marked `Active` or
    /// `Aborting` — meaning it never reported `Finished`/`Aborted` itself
    /// (panic, or an I/O error the worker returned instead of reporting).
    pub fn dead_worker_ids(&self) -> Vec<char> {
        self.slots
            .iter()
            .filter_map(|(id, state)| match state {
                WorkerState::Active { handle, .. } | WorkerState::Aborting { handle, .. } => {
                    handle.is_finished().then_some(*id)
                }
                WorkerState::Idle => None,
            })
            .collect()
    }

    pub fn all_idle(&self) -> bool {
        self.slots.iter().all(|(_, s)| s.is_idle())
    }
}
