use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the unix epoch.
pub fn timestamp_full() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Low 32 bits of the microsecond clock, as carried in packet headers.
/// Wraps roughly every 71 minutes.
pub fn timestamp() -> u32 {
    timestamp_full() as u32
}

/// Trip time between a received low-32 timestamp echo and `now`.
///
/// The unsigned wrapping difference tolerates clock wraparound; a result in
/// the upper half of the range means the echo is ahead of the local clock
/// (skew) and is clamped to zero rather than reported as an absurd sample.
pub fn rtt_sample(now: u32, echoed: u32) -> u32 {
    let diff = now.wrapping_sub(echoed);
    if diff > u32::MAX / 2 { 0 } else { diff }
}
