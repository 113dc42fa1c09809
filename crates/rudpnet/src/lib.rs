//! Reliable, ordered, connection-oriented transport over UDP datagrams.
//!
//! Per logical channel between two endpoints, every payload is delivered
//! exactly once in send order or the channel is reported disconnected.
//! Round-trip time is measured continuously and paces retransmission;
//! up to sixteen channels to the same peer share one socket.
//!
//! [`Engine`] is the I/O-free core: feed it ingress datagrams and clock
//! ticks, consume [`Event`]s. [`Peer`] wraps an engine and a tokio socket
//! for hosts that do not bring their own event loop.

pub mod channel;
pub mod consts;
pub mod engine;
pub mod error;
pub mod event;
pub mod options;
pub mod packet;
pub mod peer;
pub mod queues;
pub mod stats;
pub mod utils;

pub use channel::{Channel, ChannelKey, ChannelState};
pub use engine::Engine;
pub use error::RudpError;
pub use event::{Event, EventSink};
pub use options::EngineOptions;
pub use packet::{Header, PacketError, PacketKind, PacketView};
pub use peer::Peer;
pub use stats::{ChannelStats, EngineStats};
