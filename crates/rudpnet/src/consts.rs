/// Wire protocol version carried in every header.
pub const PROTOCOL_VERSION: u8 = 2;

/// Fixed header size in octets.
pub const PACKET_HEADER_LENGTH: usize = 12;

/// Largest payload expressible in the 12-bit length field.
pub const MAX_PAYLOAD_LENGTH: usize = 0x0fff;

/// Largest datagram the protocol produces or accepts.
pub const MAX_PACKET_LENGTH: usize = PACKET_HEADER_LENGTH + MAX_PAYLOAD_LENGTH;

/// Logical channels per peer (4-bit field).
pub const MAX_CHANNELS: u8 = 16;

/// Flat term added twice to the smoothed trip time when scheduling a
/// retransmit.
pub const MAX_RTT_US: u32 = 50_000;

/// Smoothed trip time a fresh channel starts with, before any measurement.
pub const START_TRIPTIME_MIDDLE_US: u32 = 100_000;

/// Default cap on the smoothed trip time.
pub const MAX_TRIPTIME_MIDDLE_US: u32 = 5_757_575 / 2;

/// Default send-id threshold for the voluntary reset handshake.
pub const RESET_AFTER_ID: u32 = u32::MAX - 1024;

/// Default receive-queue outrun count that triggers a reset.
pub const MAX_OUTRUNNING: u32 = 500;

/// Default initial capacity of the channel map.
pub const MAP_DEFAULT_CAPACITY: usize = 100;

/// Default delay from last-received to the first keep-alive ping.
pub const KEEPALIVE_FIRST_PING_US: u64 = 10_000_000;

/// Default interval between subsequent keep-alive pings.
pub const KEEPALIVE_NEXT_PING_US: u64 = 1_000_000;

/// Default last-received age after which a channel is torn down.
pub const DISCONNECT_TIMEOUT_US: u64 = 14_393_937;

/// Keep-alive ping payload.
pub const KEEPALIVE_PAYLOAD: &[u8] = b"PING";

/// Broadcast skips channels with more outstanding packets than this.
pub const SEND_QUEUE_DROP_LIMIT: usize = 100;

/// Consecutive local ports tried when binding with port-increment retry.
pub const BIND_PORT_RETRIES: u16 = 1000;
