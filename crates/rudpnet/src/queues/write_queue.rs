use bytes::Bytes;
use std::collections::VecDeque;

/// FIFO egress buffer used when the engine defers transmission. Every entry
/// owns its bytes; packets that also sit in the send queue share the same
/// underlying buffer through `Bytes`, so nothing here can dangle.
#[derive(Debug, Default)]
pub struct WriteQueue {
    packets: VecDeque<Bytes>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn add(&mut self, packet: Bytes) {
        self.packets.push_back(packet);
    }

    pub fn first(&self) -> Option<&Bytes> {
        self.packets.front()
    }

    pub fn pop_first(&mut self) -> Option<Bytes> {
        self.packets.pop_front()
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }
}
