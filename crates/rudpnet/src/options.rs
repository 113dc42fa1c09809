use crate::consts::{
    DISCONNECT_TIMEOUT_US, KEEPALIVE_FIRST_PING_US, KEEPALIVE_NEXT_PING_US, MAP_DEFAULT_CAPACITY,
    MAX_OUTRUNNING, MAX_TRIPTIME_MIDDLE_US, RESET_AFTER_ID,
};

/// Engine tunables. `Default` gives the reference values; hosts override
/// individual fields with struct update syntax.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Delay from last-received to the first keep-alive ping, microseconds.
    pub keepalive_first_ping_us: u64,
    /// Interval between subsequent keep-alive pings, microseconds.
    pub keepalive_next_ping_us: u64,
    /// Last-received age at which a channel is torn down, microseconds.
    pub disconnect_timeout_us: u64,
    /// Initial capacity of the channel map.
    pub map_initial_capacity: usize,
    /// Out-of-order arrivals buffered before the channel asks for a reset.
    pub max_outrunning: u32,
    /// Multiplier applied to fresh trip-time samples when smoothing.
    pub triptime_factor: f64,
    /// Upper bound on the smoothed trip time, microseconds.
    pub max_triptime_middle_us: u32,
    /// Send-id threshold for the voluntary reset handshake.
    pub reset_after_id: u32,
    /// Route egress through per-channel write queues instead of emitting
    /// send events directly.
    pub use_write_queue: bool,
    /// Tear a channel down once a single packet has been retransmitting for
    /// longer than `max_triptime_middle_us`.
    pub long_retransmit_disconnect: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            keepalive_first_ping_us: KEEPALIVE_FIRST_PING_US,
            keepalive_next_ping_us: KEEPALIVE_NEXT_PING_US,
            disconnect_timeout_us: DISCONNECT_TIMEOUT_US,
            map_initial_capacity: MAP_DEFAULT_CAPACITY,
            max_outrunning: MAX_OUTRUNNING,
            triptime_factor: 1.5,
            max_triptime_middle_us: MAX_TRIPTIME_MIDDLE_US,
            reset_after_id: RESET_AFTER_ID,
            use_write_queue: false,
            long_retransmit_disconnect: true,
        }
    }
}
