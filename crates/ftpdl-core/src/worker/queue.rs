use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

/// Priority key shared by every high-priority message (`DataHigh`, `Finished`,
/// `Aborted`, `SpeedUpdate`). Lower sorts first; `i64::MIN` guarantees these
/// always precede any `DataLow` message, whose key is its byte offset.
const HIGH_PRIORITY: i64 = i64::MIN;

/// A message a worker reports to the supervisor.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// A block finished downloading and is queued to be written; mark it
    /// `SAVING` so the display and allocator see it as no longer pending.
    DataHigh { worker_id: char, byte_offset: u64 },
    /// The bytes of a finished block, ready to be coalesced and written.
    DataLow { worker_id: char, byte_offset: u64, data: Vec<u8> },
    /// A new instantaneous speed sample for this worker's FIFO.
    SpeedUpdate { worker_id: char, bytes_per_sec: f64 },
    /// The worker was killed and is exiting; its in-flight blocks must be
    /// reclaimed as `AVAILABLE`.
    Aborted { worker_id: char },
    /// The worker finished its whole allocation normally.
    Finished { worker_id: char },
}

impl OutboundMessage {
    fn priority(&self) -> i64 {
        match self {
            OutboundMessage::DataLow { byte_offset, .. } => *byte_offset as i64,
            _ => HIGH_PRIORITY,
        }
    }

    pub fn worker_id(&self) -> char {
        match self {
            OutboundMessage::DataHigh { worker_id, .. }
            | OutboundMessage::DataLow { worker_id, .. }
            | OutboundMessage::SpeedUpdate { worker_id, .. }
            | OutboundMessage::Aborted { worker_id }
            | OutboundMessage::Finished { worker_id } => *worker_id,
        }
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority() == HIGH_PRIORITY
    }
}

struct QueueItem {
    priority: i64,
    seq: u64,
    message: OutboundMessage,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the lowest (priority, seq) pops first.
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

/// The shared outbound priority queue every worker pushes into and only the
/// supervisor drains. Messages are ordered by priority first (high-priority
/// control messages before any data), then by byte offset for `DataLow`
/// messages so contiguous blocks from any worker can be coalesced in order,
/// then by arrival order as a final tiebreak.
pub struct OutboundQueue {
    items: Mutex<BinaryHeap<QueueItem>>,
    seq: AtomicU64,
}

impl OutboundQueue {
    pub fn new() -> Self {
        OutboundQueue { items: Mutex::new(BinaryHeap::new()), seq: AtomicU64::new(0) }
    }

    pub fn push(&self, message: OutboundMessage) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let priority = message.priority();
        self.items.lock().unwrap().push(QueueItem { priority, seq, message });
    }

    pub fn pop(&self) -> Option<OutboundMessage> {
        self.items.lock().unwrap().pop().map(|item| item.message)
    }

    /// True if the next message to pop is high priority. Used to stop the
    /// low-priority coalescing pass without consuming the high-priority item.
    pub fn peek_is_high_priority(&self) -> bool {
        self.items.lock().unwrap().peek().is_some_and(|item| item.priority == HIGH_PRIORITY)
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The inbound kill channel, shared by the supervisor (producer) and every
/// worker (consumers racing to see if a kill is addressed to them).
///
/// The original downloader re-enqueues messages not addressed to the reading
/// worker onto the same shared queue it just read from, which can spin a
/// worker forever if another worker's kill is sitting at the head and no one
/// else drains it first. Here each call drains the queue in one bounded pass
/// instead: every pending message is inspected exactly once per call.
#[derive(Default)]
pub struct KillSwitch {
    pending: Mutex<VecDeque<char>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        KillSwitch { pending: Mutex::new(VecDeque::new()) }
    }

    pub fn request_kill(&self, worker_id: char) {
        self.pending.lock().unwrap().push_back(worker_id);
    }

    /// Drains every currently-pending kill request once. Returns true if one
    /// of them was addressed to `worker_id`; any others are left in the
    /// queue for their intended worker's next call.
    pub fn take_if_addressed_to(&self, worker_id: char) -> bool {
        let mut pending = self.pending.lock().unwrap();
        let mut found = false;
        let mut remaining = VecDeque::with_capacity(pending.len());
        while let Some(id) = pending.pop_front() {
            if id == worker_id {
                found = true;
            } else {
                remaining.push_back(id);
            }
        }
        *pending = remaining;
        found
    }
}
