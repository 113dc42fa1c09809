use crate::channel::ChannelKey;
use bytes::Bytes;
use std::net::SocketAddr;

/// Everything the engine can tell its host, as one tagged variant per
/// observable occurrence. Payload-carrying variants hand over owned bytes;
/// the host narrows by variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The engine came up.
    Initialize,
    /// The engine is being torn down.
    Destroy,
    /// A channel was created for a previously unknown remote endpoint.
    Connected { channel: ChannelKey },
    /// A channel was torn down; `age_us` is the last-received age when known.
    Disconnected {
        channel: ChannelKey,
        age_us: Option<u32>,
    },
    /// The peer asked for a reset; local state has been cleared.
    GotReset { channel: ChannelKey },
    /// A reset request left this side with the given packet id.
    SendReset { channel: ChannelKey, id: Option<u32> },
    /// The peer confirmed our reset; local state has been cleared.
    GotAckReset { channel: ChannelKey },
    /// The peer answered a keep-alive ping, echoing its payload.
    GotAckPing { channel: ChannelKey, payload: Bytes },
    /// The peer sent a keep-alive ping with this payload.
    GotPing { channel: ChannelKey, payload: Bytes },
    /// A DATA packet was acknowledged; carries the full ACK packet bytes.
    GotAck { channel: ChannelKey, packet: Bytes },
    /// In-order application payload, exactly once per id.
    GotData { channel: ChannelKey, payload: Bytes },
    /// A packet is ready to leave on the wire.
    ProcessSend { channel: ChannelKey, packet: Bytes },
    /// A validated ingress packet was routed to a channel.
    ProcessReceive { channel: ChannelKey, packet: Bytes },
    /// An ingress datagram failed validation; handed to the host as
    /// out-of-protocol traffic.
    ProcessReceiveNoRudp { from: SocketAddr, data: Bytes },
}

impl Event {
    /// The channel this event concerns, if it is channel-scoped.
    pub fn channel(&self) -> Option<&ChannelKey> {
        match self {
            Event::Connected { channel }
            | Event::Disconnected { channel, .. }
            | Event::GotReset { channel }
            | Event::SendReset { channel, .. }
            | Event::GotAckReset { channel }
            | Event::GotAckPing { channel, .. }
            | Event::GotPing { channel, .. }
            | Event::GotAck { channel, .. }
            | Event::GotData { channel, .. }
            | Event::ProcessSend { channel, .. }
            | Event::ProcessReceive { channel, .. } => Some(channel),
            Event::Initialize | Event::Destroy | Event::ProcessReceiveNoRudp { .. } => None,
        }
    }
}

/// Sink every engine event is pushed into, installed at engine construction.
pub type EventSink = Box<dyn FnMut(Event) + Send>;
