/// Per-channel traffic counters, updated as the channel processes packets.
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    /// DATA and RESET packets handed to the wire (first transmissions).
    pub packets_send: u64,
    /// Retransmission attempts.
    pub packets_attempt: u64,
    /// DATA packets accepted (delivered or buffered out of order).
    pub packets_receive: u64,
    /// DATA packets dropped as duplicates.
    pub packets_receive_dropped: u64,
    /// ACK packets that matched an outstanding entry.
    pub ack_receive: u64,
    /// Last measured trip time, microseconds.
    pub triptime_last_us: u32,
    /// Smoothed trip time at the last measurement, microseconds.
    pub triptime_middle_us: u32,
    /// Channel creation time, microseconds since the epoch.
    pub started_us: u64,
}

/// Engine-wide queue peaks, for host reporting.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Engine creation time, microseconds since the epoch.
    pub started_us: u64,
    /// Largest total send-queue population observed.
    pub send_queue_max: usize,
    /// Largest total receive-queue population observed.
    pub receive_queue_max: usize,
    /// Largest total write-queue population observed.
    pub write_queue_max: usize,
}
