// ============================================================================
// Expiry Queue
// Scheduled order expirations, earliest first
// ============================================================================

use crate::domain::{Isin, OrderId, Side};
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// An order to look at once its expiry time has passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryEntry {
    pub expiry: DateTime<Utc>,
    pub isin: Isin,
    pub side: Side,
    pub order_id: OrderId,
}

#[derive(Debug)]
struct Scheduled {
    sequence: u64,
    entry: ExpiryEntry,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .expiry
            .cmp(&other.entry.expiry)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Min-heap of expiry entries.
///
/// Entries are never removed when an order leaves the book or changes its
/// expiry; whoever pops an entry re-checks the live order.
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_sequence: u64,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, expiry: DateTime<Utc>, isin: Isin, side: Side, order_id: OrderId) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(Scheduled {
            sequence,
            entry: ExpiryEntry {
                expiry,
                isin,
                side,
                order_id,
            },
        }));
    }

    /// Remove and return every entry due at `now`, earliest first
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<ExpiryEntry> {
        let mut due = Vec::new();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(scheduled)| scheduled.entry.expiry <= now)
        {
            if let Some(Reverse(scheduled)) = self.heap.pop() {
                due.push(scheduled.entry);
            }
        }
        due
    }

    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.heap
            .peek()
            .map(|Reverse(scheduled)| scheduled.entry.expiry)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
