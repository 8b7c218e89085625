//! Logical clock and delayed-message timers.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::atom::{Message, Symbol};
use crate::config::BLOCK_SIZE;

struct Timer {
    due: u64,
    seq: u64,
    name: Symbol,
    message: Message,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Equal deadlines fire in the order they were scheduled.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Tick clock plus a bounded min-heap of pending timers.
pub(crate) struct Scheduler {
    ticks: u64,
    seq: u64,
    capacity: usize,
    timers: BinaryHeap<Reverse<Timer>>,
}

impl Scheduler {
    pub fn new(capacity: usize) -> Self {
        Self {
            ticks: 0,
            seq: 0,
            capacity,
            timers: BinaryHeap::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Elapsed time in samples.
    #[inline]
    pub fn systime(&self) -> u64 {
        self.ticks * BLOCK_SIZE as u64
    }

    /// Schedules `message` for `name` after `delay` ticks. A delay of zero fires on
    /// the next tick. Returns `false` when the timer heap is full.
    pub fn schedule(&mut self, delay: u64, name: Symbol, message: Message) -> bool {
        if self.timers.len() >= self.capacity {
            return false;
        }
        let due = self.ticks.saturating_add(delay.max(1));
        self.seq += 1;
        self.timers.push(Reverse(Timer {
            due,
            seq: self.seq,
            name,
            message,
        }));
        true
    }

    /// Starts a new tick.
    pub fn advance(&mut self) {
        self.ticks += 1;
    }

    /// Pops the next timer due at or before the current tick.
    pub fn pop_due(&mut self) -> Option<(Symbol, Message)> {
        if self.timers.peek()?.0.due > self.ticks {
            return None;
        }
        self.timers.pop().map(|Reverse(t)| (t.name, t.message))
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let mut sched = Scheduler::new(8);
        let a = Symbol::new("a");
        sched.schedule(2, a, Message::Float(2.0));
        sched.schedule(1, a, Message::Float(1.0));
        sched.schedule(1, a, Message::Float(1.5));

        assert!(sched.pop_due().is_none());
        sched.advance();
        assert_eq!(sched.pop_due().map(|(_, m)| m), Some(Message::Float(1.0)));
        assert_eq!(sched.pop_due().map(|(_, m)| m), Some(Message::Float(1.5)));
        assert!(sched.pop_due().is_none());
        sched.advance();
        assert_eq!(sched.pop_due().map(|(_, m)| m), Some(Message::Float(2.0)));
        assert_eq!(sched.systime(), 2 * BLOCK_SIZE as u64);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut sched = Scheduler::new(1);
        assert!(sched.schedule(1, Symbol::new("x"), Message::Bang));
        assert!(!sched.schedule(1, Symbol::new("x"), Message::Bang));
        sched.clear();
        assert_eq!(sched.pending(), 0);
    }
}
