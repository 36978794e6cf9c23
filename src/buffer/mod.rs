use std::collections::VecDeque;

use crate::event::Event;

/// Ordered event queue drained by the batch scheduler.
///
/// Insertion order is arrival order, except that reinserted (retried) batches
/// sit at the front so they are exported again before newer events. The
/// capacity cap is soft: insertion never fails, overflow is resolved at drain
/// time by dropping the oldest excess entries.
#[derive(Default)]
pub struct EventBuffer {
    queue: VecDeque<Event>,
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    /// Drop the oldest entries beyond `max`. Returns the number dropped.
    pub fn enforce_capacity(&mut self, max: usize) -> usize {
        let excess = self.queue.len().saturating_sub(max);
        for _ in 0..excess {
            self.queue.pop_front();
        }
        excess
    }

    /// Remove up to `limit` events from the front, preserving their order.
    /// Returns an empty batch when the buffer is empty.
    pub fn take_batch(&mut self, limit: usize) -> Vec<Event> {
        let count = self.queue.len().min(limit);
        self.queue.drain(..count).collect()
    }

    /// Prepend a previously drained, failed batch back onto the front,
    /// preserving its relative order.
    pub fn reinsert(&mut self, batch: Vec<Event>) {
        // append drains self.queue into older, leaving it empty; older then
        // replaces self.queue wholesale.
        let mut older: VecDeque<Event> = batch.into();
        older.append(&mut self.queue);
        self.queue = older;
    }
}
