//! Per-peer-per-channel control block: id bookkeeping, trip-time
//! estimation, the three packet queues and the algorithms that drive them.

use crate::consts::{
    MAX_PAYLOAD_LENGTH, MAX_RTT_US, PACKET_HEADER_LENGTH, START_TRIPTIME_MIDDLE_US,
};
use crate::error::RudpError;
use crate::event::Event;
use crate::options::EngineOptions;
use crate::packet::{self, PacketKind, PacketView};
use crate::queues::{ReceiveQueue, SendQueue, WriteQueue};
use crate::stats::ChannelStats;
use crate::utils;
use bytes::Bytes;
use log::{debug, trace, warn};
use std::fmt;
use std::net::SocketAddr;

/// Identifies one logical channel: remote endpoint plus channel number.
/// Stable across the channel's lifetime; the engine map is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    addr: SocketAddr,
    channel: u8,
}

impl ChannelKey {
    pub fn new(addr: SocketAddr, channel: u8) -> Self {
        Self { addr, channel }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.channel)
    }
}

/// Channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created, no valid datagram from the remote side yet.
    Fresh,
    /// At least one valid datagram arrived.
    Connected,
    /// Chosen for teardown; removed from the map right after.
    Disconnecting,
}

/// Result of one retransmission pass over a channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SendQueueTick {
    pub retransmits: u32,
    pub disconnect: bool,
}

/// Result of one keep-alive pass over a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeepAliveTick {
    Idle,
    Pinged,
    Disconnect,
}

/// State of one reliable channel to a remote endpoint.
pub struct Channel {
    key: ChannelKey,
    state: ChannelState,
    /// Next id handed to an outgoing DATA, PING or RESET packet.
    send_id: u32,
    /// Id the next in-order DATA delivery must carry.
    receive_expected_id: u32,
    /// Last measured trip time, microseconds.
    triptime: u32,
    triptime_factor: f64,
    /// Smoothed trip time, microseconds.
    triptime_middle: u32,
    /// Consecutive out-of-order arrivals since the last in-order delivery.
    outrunning: u32,
    /// Wall clock (µs) of the latest valid datagram on this channel.
    last_received: u64,
    /// Wall clock (µs) of the latest keep-alive ping sent.
    last_ping: u64,
    send_queue: SendQueue,
    receive_queue: ReceiveQueue,
    write_queue: WriteQueue,
    stats: ChannelStats,
}

impl Channel {
    pub(crate) fn new(key: ChannelKey, options: &EngineOptions, now: u64) -> Self {
        Self {
            key,
            state: ChannelState::Fresh,
            send_id: 0,
            receive_expected_id: 0,
            triptime: 0,
            triptime_factor: options.triptime_factor,
            triptime_middle: START_TRIPTIME_MIDDLE_US,
            outrunning: 0,
            last_received: now,
            last_ping: 0,
            send_queue: SendQueue::new(),
            receive_queue: ReceiveQueue::new(),
            write_queue: WriteQueue::new(),
            stats: ChannelStats {
                started_us: now,
                ..ChannelStats::default()
            },
        }
    }

    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    pub fn next_send_id(&self) -> u32 {
        self.send_id
    }

    pub fn receive_expected_id(&self) -> u32 {
        self.receive_expected_id
    }

    pub fn outrunning(&self) -> u32 {
        self.outrunning
    }

    pub fn triptime_us(&self) -> u32 {
        self.triptime
    }

    pub fn triptime_middle_us(&self) -> u32 {
        self.triptime_middle
    }

    pub fn last_received_us(&self) -> u64 {
        self.last_received
    }

    pub fn send_queue_len(&self) -> usize {
        self.send_queue.len()
    }

    pub fn receive_queue_len(&self) -> usize {
        self.receive_queue.len()
    }

    pub fn write_queue_len(&self) -> usize {
        self.write_queue.len()
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Absolute time (µs) the head of the send queue expires.
    pub fn next_retransmit_at(&self) -> Option<u64> {
        self.send_queue.first().map(|entry| entry.expected_time)
    }

    /// Microseconds until the head of the send queue expires.
    pub fn send_queue_timeout(&self, now: u64) -> Option<u64> {
        self.send_queue.timeout(now)
    }

    fn next_id(&mut self) -> u32 {
        let id = self.send_id;
        self.send_id = self.send_id.wrapping_add(1);
        id
    }

    /// Registers a valid datagram arrival.
    pub(crate) fn touch(&mut self, now: u64) {
        self.last_received = now;
        self.last_ping = 0;
        if self.state == ChannelState::Fresh {
            self.state = ChannelState::Connected;
        }
    }

    pub(crate) fn mark_disconnecting(&mut self) {
        self.state = ChannelState::Disconnecting;
    }

    /// Retransmission slot for a packet queued now: smoothed trip time plus
    /// a flat grace term, never earlier than the current tail.
    fn calculate_expected_time(&self, now: u64) -> u64 {
        let expected = now + self.triptime_middle as u64 + 2 * MAX_RTT_US as u64;
        match self.send_queue.last_expected_time() {
            Some(tail) if tail > expected => tail,
            _ => expected,
        }
    }

    /// Hands a packet to the wire: directly via the send event, or parked in
    /// the write queue when the engine defers transmission.
    fn send_packet(&mut self, packet: Bytes, options: &EngineOptions, emit: &mut dyn FnMut(Event)) {
        if options.use_write_queue {
            self.write_queue.add(packet);
        } else {
            emit(Event::ProcessSend {
                channel: self.key,
                packet,
            });
        }
    }

    pub(crate) fn pop_write_queue(&mut self) -> Option<Bytes> {
        self.write_queue.pop_first()
    }

    /// Sends one payload reliably; returns the on-wire packet length.
    pub(crate) fn send_data(
        &mut self,
        payload: &[u8],
        options: &EngineOptions,
        emit: &mut dyn FnMut(Event),
    ) -> Result<usize, RudpError> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(RudpError::PayloadTooLarge(payload.len()));
        }

        let id = self.next_id();
        let packet = packet::build_data(id, self.key.channel(), payload, utils::timestamp())?;
        let length = packet.len();
        let expected_time = self.calculate_expected_time(utils::timestamp_full());
        self.send_queue.add(packet.clone(), id, expected_time);
        self.stats.packets_send += 1;
        trace!(
            "channel {} send DATA id={id}, {} payload bytes",
            self.key,
            payload.len()
        );
        self.send_packet(packet, options, emit);
        Ok(length)
    }

    /// Sends a keep-alive ping. Like DATA, the ping stays in the send queue
    /// until its reply arrives.
    pub(crate) fn send_ping(
        &mut self,
        payload: &[u8],
        options: &EngineOptions,
        emit: &mut dyn FnMut(Event),
    ) -> Result<usize, RudpError> {
        let id = self.next_id();
        let packet = packet::build_ping(id, self.key.channel(), payload, utils::timestamp())?;
        let length = packet.len();
        let expected_time = self.calculate_expected_time(utils::timestamp_full());
        self.send_queue.add(packet.clone(), id, expected_time);
        debug!("channel {} send PING id={id}", self.key);
        self.send_packet(packet, options, emit);
        Ok(length)
    }

    /// Starts the reset handshake so both sides rebase their id spaces.
    pub(crate) fn send_reset(
        &mut self,
        options: &EngineOptions,
        emit: &mut dyn FnMut(Event),
    ) -> Result<(), RudpError> {
        let id = self.next_id();
        let packet = packet::build_reset(id, self.key.channel(), utils::timestamp())?;
        let expected_time = self.calculate_expected_time(utils::timestamp_full());
        self.send_queue.add(packet.clone(), id, expected_time);
        self.stats.packets_send += 1;
        debug!("channel {} send RESET id={id}", self.key);
        self.send_packet(packet, options, emit);
        emit(Event::SendReset {
            channel: self.key,
            id: Some(id),
        });
        Ok(())
    }

    /// Clears the channel back to its just-created state: queues freed, id
    /// spaces zeroed, trip time estimate back to the starting value.
    pub(crate) fn reset(&mut self, now: u64) {
        self.send_queue.clear();
        self.receive_queue.clear();
        self.write_queue.clear();
        self.send_id = 0;
        self.receive_expected_id = 0;
        self.outrunning = 0;
        self.triptime = 0;
        self.triptime_middle = START_TRIPTIME_MIDDLE_US;
        self.last_received = now;
        self.last_ping = 0;
    }

    /// Dispatches one validated packet addressed to this channel.
    pub(crate) fn process_packet(
        &mut self,
        view: &PacketView,
        options: &EngineOptions,
        emit: &mut dyn FnMut(Event),
    ) -> Result<(), RudpError> {
        match view.kind() {
            PacketKind::Data => self.process_data(view, options, emit)?,
            PacketKind::Ack => {
                if self.send_queue.remove_by_id(view.id()).is_some() {
                    let sample = utils::rtt_sample(utils::timestamp(), view.timestamp());
                    self.apply_rtt_sample(sample, options);
                    self.stats.ack_receive += 1;
                    emit(Event::GotAck {
                        channel: self.key,
                        packet: view.as_bytes().clone(),
                    });
                    // Rebase the id space before the 32-bit counter wraps.
                    if self.send_id >= options.reset_after_id
                        && self.send_queue.is_empty()
                        && self.receive_queue.is_empty()
                    {
                        warn!(
                            "channel {} send id {} near wrap, requesting reset",
                            self.key, self.send_id
                        );
                        self.send_reset(options, emit)?;
                    }
                } else {
                    trace!("channel {} stale ACK id={} dropped", self.key, view.id());
                }
            }
            PacketKind::Reset => {
                debug!("channel {} got RESET", self.key);
                let ack = packet::build_ack_reset(view)?;
                self.send_packet(ack, options, emit);
                self.reset(utils::timestamp_full());
                emit(Event::GotReset { channel: self.key });
            }
            PacketKind::AckReset => {
                debug!("channel {} got ACK_RESET", self.key);
                self.reset(utils::timestamp_full());
                emit(Event::GotAckReset { channel: self.key });
            }
            PacketKind::Ping => {
                let ack = packet::build_ack_ping(view)?;
                self.send_packet(ack, options, emit);
                emit(Event::GotPing {
                    channel: self.key,
                    payload: view.payload(),
                });
            }
            PacketKind::AckPing => {
                if self.send_queue.remove_by_id(view.id()).is_some() {
                    let sample = utils::rtt_sample(utils::timestamp(), view.timestamp());
                    self.apply_rtt_sample(sample, options);
                    self.stats.ack_receive += 1;
                    emit(Event::GotAckPing {
                        channel: self.key,
                        payload: view.payload(),
                    });
                } else {
                    trace!(
                        "channel {} stale ACK_PING id={} dropped",
                        self.key,
                        view.id()
                    );
                }
            }
        }
        Ok(())
    }

    fn process_data(
        &mut self,
        view: &PacketView,
        options: &EngineOptions,
        emit: &mut dyn FnMut(Event),
    ) -> Result<(), RudpError> {
        // Acknowledge before anything else; the peer only needs to know the
        // bytes arrived.
        let ack = packet::build_ack(view)?;
        self.send_packet(ack, options, emit);

        let id = view.id();
        if id == self.receive_expected_id {
            emit(Event::GotData {
                channel: self.key,
                payload: view.payload(),
            });
            self.receive_expected_id = self.receive_expected_id.wrapping_add(1);

            // Drain buffered successors now in order.
            while let Some(buffered) = self.receive_queue.take(self.receive_expected_id) {
                emit(Event::GotData {
                    channel: self.key,
                    payload: buffered.slice(PACKET_HEADER_LENGTH..),
                });
                self.receive_expected_id = self.receive_expected_id.wrapping_add(1);
            }
            self.outrunning = 0;
            self.stats.packets_receive += 1;
        } else if id > self.receive_expected_id {
            if self.receive_queue.add(id, view.as_bytes().clone()) {
                self.outrunning += 1;
                self.stats.packets_receive += 1;
                trace!(
                    "channel {} buffered early DATA id={id}, expecting {}, outrunning {}",
                    self.key, self.receive_expected_id, self.outrunning
                );
                if self.outrunning > options.max_outrunning {
                    warn!(
                        "channel {} outrunning {} exceeds {}, requesting reset",
                        self.key, self.outrunning, options.max_outrunning
                    );
                    self.send_reset(options, emit)?;
                }
            }
        } else if id == 0 {
            // The peer rebased its id space at zero; follow it.
            debug!("channel {} peer restarted its id space", self.key);
            self.reset(utils::timestamp_full());
        } else {
            self.stats.packets_receive_dropped += 1;
            trace!("channel {} duplicate DATA id={id} dropped", self.key);
        }
        Ok(())
    }

    /// Applies one trip-time measurement. Inflates quickly when the network
    /// worsens, deflates slowly otherwise, and stays within fixed bounds of
    /// the raw sample.
    pub(crate) fn apply_rtt_sample(&mut self, sample: u32, options: &EngineOptions) {
        self.triptime = sample;

        let factored = (sample as f64 * self.triptime_factor) as u32;
        let mut middle =
            if self.triptime_middle == START_TRIPTIME_MIDDLE_US || sample > self.triptime_middle {
                factored
            } else {
                ((self.triptime_middle as u64 * 19 + sample as u64) / 20) as u32
            };
        if middle < factored {
            middle = factored;
        }
        if middle > sample.saturating_mul(10) {
            middle = sample.saturating_mul(10);
        }
        if middle > options.max_triptime_middle_us {
            middle = options.max_triptime_middle_us;
        }

        self.triptime_middle = middle;
        self.stats.triptime_last_us = sample;
        self.stats.triptime_middle_us = middle;
    }

    /// Retransmits every expired send-queue entry, rescheduling each at the
    /// tail. Reports whether a packet has been retransmitting long enough
    /// for the channel to be declared dead.
    pub(crate) fn process_send_queue(
        &mut self,
        now: u64,
        options: &EngineOptions,
        emit: &mut dyn FnMut(Event),
    ) -> SendQueueTick {
        let mut retransmits = 0;

        while let Some(expires) = self.send_queue.first().map(|entry| entry.expected_time) {
            if expires > now {
                break;
            }

            let expected_time = self.calculate_expected_time(now);
            let Some(entry) = self.send_queue.reschedule_first(expected_time, now) else {
                break;
            };
            let packet = entry.packet.clone();
            let retrieves_start = entry.retrieves_start;

            self.stats.packets_attempt += 1;
            retransmits += 1;
            trace!(
                "channel {} retransmit, next attempt at {expected_time}",
                self.key
            );
            self.send_packet(packet, options, emit);

            if options.long_retransmit_disconnect
                && now.saturating_sub(retrieves_start) > options.max_triptime_middle_us as u64
            {
                warn!("channel {} retransmit budget exhausted", self.key);
                self.mark_disconnecting();
                return SendQueueTick {
                    retransmits,
                    disconnect: true,
                };
            }
        }

        SendQueueTick {
            retransmits,
            disconnect: false,
        }
    }

    /// Keep-alive pass: ping a silent peer, report a dead one.
    pub(crate) fn keep_alive(
        &mut self,
        now: u64,
        options: &EngineOptions,
        emit: &mut dyn FnMut(Event),
    ) -> Result<KeepAliveTick, RudpError> {
        if self.state != ChannelState::Connected {
            return Ok(KeepAliveTick::Idle);
        }

        let age = now.saturating_sub(self.last_received);
        if age > options.disconnect_timeout_us {
            self.mark_disconnecting();
            return Ok(KeepAliveTick::Disconnect);
        }
        if age >= options.keepalive_first_ping_us
            && now.saturating_sub(self.last_ping) >= options.keepalive_next_ping_us
        {
            self.send_ping(crate::consts::KEEPALIVE_PAYLOAD, options, emit)?;
            self.last_ping = now;
            return Ok(KeepAliveTick::Pinged);
        }
        Ok(KeepAliveTick::Idle)
    }
}
