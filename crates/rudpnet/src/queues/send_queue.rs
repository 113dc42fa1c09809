use bytes::Bytes;
use std::collections::VecDeque;

/// One outstanding packet awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct SendQueueEntry {
    /// Exact on-wire bytes, replayed verbatim on retransmit.
    pub packet: Bytes,
    /// Packet id, for ACK matching.
    pub id: u32,
    /// Absolute time (µs) at which the entry becomes eligible for
    /// retransmission.
    pub expected_time: u64,
    /// Retransmissions performed so far.
    pub retrieves: u32,
    /// Time of the first retransmission, zero until one happens.
    pub retrieves_start: u64,
}

/// Outstanding packets in non-decreasing `expected_time` order.
///
/// Entries enter at the tail with an expected time at least the current
/// tail's, so the head is always the next entry to expire.
#[derive(Debug, Default)]
pub struct SendQueue {
    entries: VecDeque<SendQueueEntry>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an outstanding packet. The caller guarantees `expected_time`
    /// is at least the current tail's.
    pub fn add(&mut self, packet: Bytes, id: u32, expected_time: u64) {
        debug_assert!(
            self.last_expected_time().is_none_or(|t| t <= expected_time),
            "send queue expected times must be non-decreasing"
        );
        self.entries.push_back(SendQueueEntry {
            packet,
            id,
            expected_time,
            retrieves: 0,
            retrieves_start: 0,
        });
    }

    pub fn find_by_id(&self, id: u32) -> Option<&SendQueueEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn remove_by_id(&mut self, id: u32) -> Option<SendQueueEntry> {
        let position = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(position)
    }

    /// The entry with the smallest expected time.
    pub fn first(&self) -> Option<&SendQueueEntry> {
        self.entries.front()
    }

    pub fn last_expected_time(&self) -> Option<u64> {
        self.entries.back().map(|entry| entry.expected_time)
    }

    /// Moves the head to the tail with a new expected time, counting the
    /// retransmission. Returns the moved entry.
    pub fn reschedule_first(&mut self, expected_time: u64, now: u64) -> Option<&SendQueueEntry> {
        let mut entry = self.entries.pop_front()?;
        entry.expected_time = expected_time;
        if entry.retrieves == 0 {
            entry.retrieves_start = now;
        }
        entry.retrieves += 1;
        self.entries.push_back(entry);
        self.entries.back()
    }

    /// Microseconds until the head expires; zero if already expired, `None`
    /// if the queue is empty.
    pub fn timeout(&self, now: u64) -> Option<u64> {
        self.entries
            .front()
            .map(|entry| entry.expected_time.saturating_sub(now))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(tag: u8) -> Bytes {
        Bytes::copy_from_slice(&[tag; 4])
    }

    #[test]
    fn head_is_earliest_expected_time() {
        let mut queue = SendQueue::new();
        queue.add(packet(0), 0, 1_000);
        queue.add(packet(1), 1, 2_000);
        queue.add(packet(2), 2, 2_000);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.first().unwrap().id, 0);
        assert_eq!(queue.last_expected_time(), Some(2_000));
    }

    #[test]
    fn find_and_remove_by_id() {
        let mut queue = SendQueue::new();
        queue.add(packet(0), 10, 1_000);
        queue.add(packet(1), 11, 2_000);

        assert_eq!(queue.find_by_id(11).unwrap().expected_time, 2_000);
        assert!(queue.find_by_id(12).is_none());

        let removed = queue.remove_by_id(10).unwrap();
        assert_eq!(removed.id, 10);
        assert_eq!(queue.len(), 1);
        assert!(queue.remove_by_id(10).is_none());
    }

    #[test]
    fn reschedule_moves_head_to_tail_and_counts() {
        let mut queue = SendQueue::new();
        queue.add(packet(0), 0, 1_000);
        queue.add(packet(1), 1, 2_000);

        let entry = queue.reschedule_first(3_000, 1_500).unwrap();
        assert_eq!(entry.id, 0);
        assert_eq!(entry.retrieves, 1);
        assert_eq!(entry.retrieves_start, 1_500);

        // Order stays non-decreasing, id 1 is now the head.
        assert_eq!(queue.first().unwrap().id, 1);
        assert_eq!(queue.last_expected_time(), Some(3_000));

        // A second pass keeps the original retrieves_start.
        queue.remove_by_id(1).unwrap();
        let entry = queue.reschedule_first(4_000, 3_100).unwrap();
        assert_eq!(entry.retrieves, 2);
        assert_eq!(entry.retrieves_start, 1_500);
    }

    #[test]
    fn timeout_counts_down_to_zero() {
        let mut queue = SendQueue::new();
        assert_eq!(queue.timeout(0), None);

        queue.add(packet(0), 0, 5_000);
        assert_eq!(queue.timeout(1_000), Some(4_000));
        assert_eq!(queue.timeout(5_000), Some(0));
        assert_eq!(queue.timeout(9_000), Some(0));
    }
}
