//! Keyed one-shot timers.
//!
//! Deadlines are plain [`Duration`]s since an arbitrary epoch chosen by the owner, so the queue
//! never reads a clock itself. Scheduling a key that is already pending replaces its deadline:
//! the last writer wins and the earlier deadline never fires.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

#[derive(Debug)]
pub struct DelayQueue<K> {
    entries: HashMap<K, Entry>,
    next_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Duration,
    /// Scheduling order, breaks ties between equal deadlines.
    seq: u64,
}

impl<K: Eq + Hash + Clone> DelayQueue<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Schedules `key` to fire at `deadline`.
    ///
    /// Returns the deadline that was replaced, if the key was already pending.
    pub fn schedule(&mut self, key: K, deadline: Duration) -> Option<Duration> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries
            .insert(key, Entry { deadline, seq })
            .map(|old| old.deadline)
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn deadline(&self, key: &K) -> Option<Duration> {
        self.entries.get(key).map(|entry| entry.deadline)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.values().map(|entry| entry.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every key whose deadline is at or before `now`, earliest first.
    pub fn poll_expired(&mut self, now: Duration) -> Vec<K> {
        let mut expired: Vec<(K, Entry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(key, entry)| (key.clone(), *entry))
            .collect();
        expired.sort_by_key(|(_, entry)| (entry.deadline, entry.seq));

        for (key, _) in &expired {
            self.entries.remove(key);
        }

        expired.into_iter().map(|(key, _)| key).collect()
    }
}

impl<K: Eq + Hash + Clone> Default for DelayQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut queue = DelayQueue::new();
        queue.schedule("b", ms(20));
        queue.schedule("a", ms(10));
        queue.schedule("c", ms(30));

        assert_eq!(queue.next_deadline(), Some(ms(10)));
        assert_eq!(queue.poll_expired(ms(5)), Vec::<&str>::new());
        assert_eq!(queue.poll_expired(ms(25)), ["a", "b"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.poll_expired(ms(30)), ["c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn rescheduling_replaces_deadline() {
        let mut queue = DelayQueue::new();
        assert_eq!(queue.schedule("freeze", ms(10)), None);
        assert_eq!(queue.schedule("freeze", ms(50)), Some(ms(10)));

        assert!(queue.poll_expired(ms(10)).is_empty());
        assert_eq!(queue.deadline(&"freeze"), Some(ms(50)));
        assert_eq!(queue.poll_expired(ms(50)), ["freeze"]);
    }

    #[test]
    fn equal_deadlines_keep_schedule_order() {
        let mut queue = DelayQueue::new();
        queue.schedule(2, ms(10));
        queue.schedule(1, ms(10));
        queue.schedule(3, ms(10));
        assert_eq!(queue.poll_expired(ms(10)), [2, 1, 3]);
    }

    #[test]
    fn cancel_removes_pending() {
        let mut queue = DelayQueue::new();
        queue.schedule(1, ms(10));
        assert!(queue.cancel(&1));
        assert!(!queue.cancel(&1));
        assert!(!queue.is_scheduled(&1));
        assert!(queue.poll_expired(ms(100)).is_empty());
    }
}
