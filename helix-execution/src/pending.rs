//! Time-indexed queue for latency-delayed taker actions.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use helix_core::{Action, ActionSource, OrderId};

/// A scheduled action waiting for its post-latency fill time.
#[derive(Clone, Debug)]
pub struct PendingAction {
    pub order_id: OrderId,
    pub action: Action,
    pub fill_ts: i64,
    pub latency_ms: f64,
    pub seq: i64,
    pub action_idx: u64,
    pub src: ActionSource,
}

struct Entry {
    pending: PendingAction,
    insertion: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert so the earliest fill_ts pops
        // first, with insertion order as the tie break.
        other
            .pending
            .fill_ts
            .cmp(&self.pending.fill_ts)
            .then_with(|| other.insertion.cmp(&self.insertion))
    }
}

/// Min-heap of pending actions ordered by `(fill_ts, insertion)`.
#[derive(Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Entry>,
    insertions: u64,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, pending: PendingAction) {
        let insertion = self.insertions;
        self.insertions += 1;
        self.heap.push(Entry { pending, insertion });
    }

    /// Pop every action due at or before `now_ts`, in dispatch order.
    pub fn pop_due(&mut self, now_ts: i64) -> Vec<PendingAction> {
        let mut due = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|entry| entry.pending.fill_ts <= now_ts)
        {
            if let Some(entry) = self.heap.pop() {
                due.push(entry.pending);
            }
        }
        due
    }
}
