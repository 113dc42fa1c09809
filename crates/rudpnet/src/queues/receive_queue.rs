use bytes::Bytes;
use std::collections::HashMap;

/// Early-arrived DATA packets keyed by id, buffered until the expected id
/// catches up. Only keyed access is needed, so no ordering is kept.
#[derive(Debug, Default)]
pub struct ReceiveQueue {
    packets: HashMap<u32, Bytes>,
}

impl ReceiveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Stores the on-wire bytes of an early packet. A duplicate id is a
    /// no-op that keeps the first arrival; returns whether the packet was
    /// stored.
    pub fn add(&mut self, id: u32, packet: Bytes) -> bool {
        if self.packets.contains_key(&id) {
            return false;
        }
        self.packets.insert(id, packet);
        true
    }

    pub fn contains(&self, id: u32) -> bool {
        self.packets.contains_key(&id)
    }

    /// Removes and returns the packet with the given id.
    pub fn take(&mut self, id: u32) -> Option<Bytes> {
        self.packets.remove(&id)
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }
}
