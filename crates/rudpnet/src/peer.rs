//! Async host for the engine: a UDP socket, the cooperative tick loop and
//! event delivery, for applications that do not bring their own event loop.

use crate::channel::ChannelKey;
use crate::consts::{BIND_PORT_RETRIES, MAX_PACKET_LENGTH};
use crate::engine::Engine;
use crate::error::RudpError;
use crate::event::Event;
use crate::options::EngineOptions;
use crate::utils;
use log::{debug, error, info};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Upper bound on one wait, so keep-alive runs even when nothing is
/// outstanding.
const TICK_CAP_US: u64 = 100_000;

/// One endpoint: engine plus socket, driven by [`Peer::next_event`].
pub struct Peer {
    socket: UdpSocket,
    engine: Engine,
    events: UnboundedReceiver<Event>,
    local_addr: SocketAddr,
}

impl Peer {
    /// Binds a peer, trying consecutive ports when the requested one is
    /// taken. Port zero asks the system for an ephemeral port and is tried
    /// exactly once.
    pub async fn bind(addr: SocketAddr, options: EngineOptions) -> Result<Self, RudpError> {
        let attempts = if addr.port() == 0 { 1 } else { BIND_PORT_RETRIES };

        for offset in 0..attempts {
            let Some(port) = addr.port().checked_add(offset) else {
                break;
            };
            let candidate = SocketAddr::new(addr.ip(), port);
            match UdpSocket::bind(candidate).await {
                Ok(socket) => {
                    let local_addr = socket.local_addr()?;
                    info!("bound to {local_addr}");

                    let (sender, events) = mpsc::unbounded_channel();
                    let engine = Engine::new(
                        options,
                        Box::new(move |event| {
                            let _ = sender.send(event);
                        }),
                    );
                    return Ok(Self {
                        socket,
                        engine,
                        events,
                        local_addr,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                    debug!("port {port} in use, trying the next one");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(RudpError::BindExhausted(
            addr.port(),
            addr.port().saturating_add(attempts - 1),
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Opens an outbound channel to a remote endpoint.
    pub fn connect(&mut self, remote: SocketAddr, channel: u8) -> ChannelKey {
        self.engine.connect(remote, channel)
    }

    /// Queues one payload for reliable delivery. The packet leaves the
    /// socket on the next [`Peer::next_event`] call.
    pub fn send(&mut self, key: &ChannelKey, payload: &[u8]) -> Result<usize, RudpError> {
        self.engine.send_data(key, payload)
    }

    /// Starts the reset handshake on every channel.
    pub fn send_reset_all(&mut self) {
        self.engine.send_reset_all();
    }

    /// Drives the transport until something reportable happens: transmits
    /// pending egress, receives and dispatches ingress, and runs the
    /// retransmit / keep-alive passes on schedule.
    pub async fn next_event(&mut self) -> Result<Event, RudpError> {
        let mut buf = [0u8; MAX_PACKET_LENGTH];
        loop {
            if let Some(event) = self.pump().await? {
                return Ok(event);
            }

            let now = utils::timestamp_full();
            let wait = self
                .engine
                .send_queue_timeout(now)
                .unwrap_or(TICK_CAP_US)
                .clamp(1_000, TICK_CAP_US);

            match tokio::time::timeout(
                Duration::from_micros(wait),
                self.socket.recv_from(&mut buf),
            )
            .await
            {
                Ok(Ok((length, from))) => {
                    self.engine.process_received(&buf[..length], from);
                }
                Ok(Err(err)) => {
                    error!("socket receive failed: {err}");
                    return Err(err.into());
                }
                Err(_) => {
                    let now = utils::timestamp_full();
                    self.engine.process_send_queues(now);
                    self.engine.process_keep_connection(now);
                }
            }

            if self.engine.options().use_write_queue {
                while self.engine.process_write_queues() > 0 {}
            }
        }
    }

    /// Drains queued engine events, transmitting egress packets and handing
    /// the first application-relevant event back.
    async fn pump(&mut self) -> Result<Option<Event>, RudpError> {
        while let Ok(event) = self.events.try_recv() {
            match event {
                Event::ProcessSend { channel, packet } => {
                    self.socket.send_to(&packet, channel.addr()).await?;
                }
                event => return Ok(Some(event)),
            }
        }
        Ok(None)
    }
}
