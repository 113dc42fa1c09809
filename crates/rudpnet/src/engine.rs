//! The protocol engine: owns the channel map and the event sink, routes
//! ingress datagrams, and runs the timer-driven passes (retransmission,
//! keep-alive, deferred writes).
//!
//! Single-threaded by design: every method mutates state synchronously and
//! returns promptly. The host blocks on the socket and sleeps until the
//! wake deadline reported by [`Engine::process_send_queues`].

use crate::channel::{Channel, ChannelKey, KeepAliveTick};
use crate::consts::{MAX_CHANNELS, SEND_QUEUE_DROP_LIMIT};
use crate::error::RudpError;
use crate::event::{Event, EventSink};
use crate::options::EngineOptions;
use crate::packet::PacketView;
use crate::stats::EngineStats;
use crate::utils;
use bytes::Bytes;
use log::{info, trace, warn};
use std::collections::HashMap;
use std::net::SocketAddr;

pub struct Engine {
    options: EngineOptions,
    channels: HashMap<ChannelKey, Channel>,
    sink: EventSink,
    stats: EngineStats,
    write_queue_cursor: usize,
}

impl Engine {
    /// Creates an engine and reports `Initialize` through the sink.
    pub fn new(options: EngineOptions, mut sink: EventSink) -> Self {
        sink(Event::Initialize);
        let channels = HashMap::with_capacity(options.map_initial_capacity);
        Self {
            options,
            channels,
            sink,
            stats: EngineStats {
                started_us: utils::timestamp_full(),
                ..EngineStats::default()
            },
            write_queue_cursor: 0,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, key: &ChannelKey) -> Option<&Channel> {
        self.channels.get(key)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&ChannelKey, &Channel)> {
        self.channels.iter()
    }

    /// Reports `Destroy` and tears down every channel.
    pub fn destroy(mut self) {
        (self.sink)(Event::Destroy);
        self.channels.clear();
    }

    /// Registers an outbound channel to a remote endpoint. Idempotent:
    /// an existing channel is kept as is.
    pub fn connect(&mut self, addr: SocketAddr, channel: u8) -> ChannelKey {
        debug_assert!(channel < MAX_CHANNELS);
        let key = ChannelKey::new(addr, channel & 0x0f);
        if !self.channels.contains_key(&key) {
            info!("new channel {key}");
            self.channels
                .insert(key, Channel::new(key, &self.options, utils::timestamp_full()));
        }
        key
    }

    /// Removes a channel and everything it owns. No event is reported;
    /// this is the explicit-disconnect path.
    pub fn destroy_channel(&mut self, key: &ChannelKey) -> bool {
        self.channels.remove(key).is_some()
    }

    /// Validates one ingress datagram and dispatches it to its channel,
    /// creating the channel if the source is unknown. Invalid buffers are
    /// handed back as `ProcessReceiveNoRudp`.
    pub fn process_received(&mut self, data: &[u8], from: SocketAddr) {
        let packet = Bytes::copy_from_slice(data);
        let view = match PacketView::check(packet.clone()) {
            Ok(view) => view,
            Err(err) => {
                trace!("non-protocol datagram from {from}: {err}");
                (self.sink)(Event::ProcessReceiveNoRudp { from, data: packet });
                return;
            }
        };
        trace!("recv from {from}: {}", view.dump_header());

        let key = ChannelKey::new(from, view.channel());
        let now = utils::timestamp_full();
        if !self.channels.contains_key(&key) {
            info!("connect channel {key}");
            self.channels
                .insert(key, Channel::new(key, &self.options, now));
            (self.sink)(Event::Connected { channel: key });
        }

        let Self {
            channels,
            sink,
            options,
            ..
        } = self;
        let Some(channel) = channels.get_mut(&key) else {
            return;
        };
        let emit = &mut **sink;
        channel.touch(now);
        emit(Event::ProcessReceive {
            channel: key,
            packet,
        });
        if let Err(err) = channel.process_packet(&view, options, emit) {
            warn!("channel {key} failed to process a packet: {err}");
        }
        self.track_queue_peaks();
    }

    /// Sends one payload on a channel; fails if the channel is unknown or
    /// the payload does not fit a single datagram.
    pub fn send_data(&mut self, key: &ChannelKey, payload: &[u8]) -> Result<usize, RudpError> {
        let Self {
            channels,
            sink,
            options,
            ..
        } = self;
        let channel = channels
            .get_mut(key)
            .ok_or(RudpError::ChannelNotFound(*key))?;
        let sent = channel.send_data(payload, options, &mut **sink)?;
        self.track_queue_peaks();
        Ok(sent)
    }

    /// Broadcasts one payload to every connected channel, skipping channels
    /// with a backlogged send queue. Returns how many channels got it.
    pub fn send_data_to_all(&mut self, payload: &[u8]) -> usize {
        let Self {
            channels,
            sink,
            options,
            ..
        } = self;
        let mut sent = 0;
        for channel in channels.values_mut() {
            if !channel.is_connected() {
                continue;
            }
            if channel.send_queue_len() >= SEND_QUEUE_DROP_LIMIT {
                trace!("skip backpressured channel {}", channel.key());
                continue;
            }
            match channel.send_data(payload, options, &mut **sink) {
                Ok(_) => sent += 1,
                Err(err) => warn!("broadcast on {} failed: {err}", channel.key()),
            }
        }
        self.track_queue_peaks();
        sent
    }

    /// Starts the reset handshake on one channel.
    pub fn send_reset(&mut self, key: &ChannelKey) -> Result<(), RudpError> {
        let Self {
            channels,
            sink,
            options,
            ..
        } = self;
        let channel = channels
            .get_mut(key)
            .ok_or(RudpError::ChannelNotFound(*key))?;
        channel.send_reset(options, &mut **sink)
    }

    /// Starts the reset handshake on every channel.
    pub fn send_reset_all(&mut self) {
        let Self {
            channels,
            sink,
            options,
            ..
        } = self;
        for channel in channels.values_mut() {
            if let Err(err) = channel.send_reset(options, &mut **sink) {
                warn!("reset on {} failed: {err}", channel.key());
            }
        }
    }

    /// Retransmission pass over every channel. Channels whose retransmit
    /// budget is exhausted are reported `Disconnected` and removed.
    /// Returns the earliest absolute retransmit deadline (µs) across the
    /// surviving channels, for the host to sleep until.
    pub fn process_send_queues(&mut self, now: u64) -> Option<u64> {
        let mut doomed = Vec::new();
        {
            let Self {
                channels,
                sink,
                options,
                ..
            } = self;
            for (key, channel) in channels.iter_mut() {
                let tick = channel.process_send_queue(now, options, &mut **sink);
                if tick.disconnect {
                    doomed.push(*key);
                }
            }
        }
        for key in doomed {
            if let Some(channel) = self.channels.remove(&key) {
                let age = now.saturating_sub(channel.last_received_us());
                info!("disconnect channel {key}: retransmit budget exhausted");
                (self.sink)(Event::Disconnected {
                    channel: key,
                    age_us: Some(age as u32),
                });
            }
        }
        self.channels
            .values()
            .filter_map(Channel::next_retransmit_at)
            .min()
    }

    /// Microseconds until the next send-queue entry expires, across all
    /// channels. `None` when nothing is outstanding.
    pub fn send_queue_timeout(&self, now: u64) -> Option<u64> {
        self.channels
            .values()
            .filter_map(|channel| channel.send_queue_timeout(now))
            .min()
    }

    /// Keep-alive pass: pings silent connected channels and tears down the
    /// ones past the disconnect timeout. Returns the number of pings sent.
    pub fn process_keep_connection(&mut self, now: u64) -> usize {
        let mut pings = 0;
        let mut doomed = Vec::new();
        {
            let Self {
                channels,
                sink,
                options,
                ..
            } = self;
            for (key, channel) in channels.iter_mut() {
                match channel.keep_alive(now, options, &mut **sink) {
                    Ok(KeepAliveTick::Pinged) => pings += 1,
                    Ok(KeepAliveTick::Disconnect) => doomed.push(*key),
                    Ok(KeepAliveTick::Idle) => {}
                    Err(err) => warn!("keep-alive on {key} failed: {err}"),
                }
            }
        }
        for key in doomed {
            if let Some(channel) = self.channels.remove(&key) {
                let age = now.saturating_sub(channel.last_received_us());
                info!("disconnect channel {key}: silent for {age}µs");
                (self.sink)(Event::Disconnected {
                    channel: key,
                    age_us: Some(age as u32),
                });
            }
        }
        pings
    }

    /// Drains one packet from the first non-empty write queue, continuing
    /// round-robin from where the previous call stopped. Returns the packet
    /// length, or zero when every write queue is empty.
    pub fn process_write_queues(&mut self) -> usize {
        let keys: Vec<ChannelKey> = self.channels.keys().copied().collect();
        if keys.is_empty() {
            self.write_queue_cursor = 0;
            return 0;
        }
        for step in 0..keys.len() {
            let index = (self.write_queue_cursor + step) % keys.len();
            let key = keys[index];
            if let Some(channel) = self.channels.get_mut(&key) {
                if let Some(packet) = channel.pop_write_queue() {
                    let length = packet.len();
                    (self.sink)(Event::ProcessSend {
                        channel: key,
                        packet,
                    });
                    self.write_queue_cursor = index + 1;
                    return length;
                }
            }
        }
        self.write_queue_cursor = 0;
        0
    }

    fn track_queue_peaks(&mut self) {
        let mut send = 0;
        let mut receive = 0;
        let mut write = 0;
        for channel in self.channels.values() {
            send += channel.send_queue_len();
            receive += channel.receive_queue_len();
            write += channel.write_queue_len();
        }
        self.stats.send_queue_max = self.stats.send_queue_max.max(send);
        self.stats.receive_queue_max = self.stats.receive_queue_max.max(receive);
        self.stats.write_queue_max = self.stats.write_queue_max.max(write);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{self, PacketKind};
    use std::sync::{Arc, Mutex};

    type EventLog = Arc<Mutex<Vec<Event>>>;

    fn engine_with(options: EngineOptions) -> (Engine, EventLog) {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let engine = Engine::new(
            options,
            Box::new(move |event| sink_log.lock().unwrap().push(event)),
        );
        log.lock().unwrap().clear();
        (engine, log)
    }

    fn engine() -> (Engine, EventLog) {
        engine_with(EngineOptions::default())
    }

    fn take(log: &EventLog) -> Vec<Event> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    fn sent_packets(events: &[Event]) -> Vec<Bytes> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::ProcessSend { packet, .. } => Some(packet.clone()),
                _ => None,
            })
            .collect()
    }

    fn sent_of_kind(events: &[Event], kind: PacketKind) -> Vec<PacketView> {
        sent_packets(events)
            .into_iter()
            .map(|packet| PacketView::check(packet).unwrap())
            .filter(|view| view.kind() == kind)
            .collect()
    }

    fn data_payloads(events: &[Event]) -> Vec<Bytes> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::GotData { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    fn relay(packets: &[Bytes], target: &mut Engine, from: SocketAddr) {
        for packet in packets {
            target.process_received(packet, from);
        }
    }

    fn addr_a() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn addr_b() -> SocketAddr {
        "127.0.0.1:5001".parse().unwrap()
    }

    #[test]
    fn initialize_and_destroy_are_reported() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&log);
        let engine = Engine::new(
            EngineOptions::default(),
            Box::new(move |event| sink_log.lock().unwrap().push(event)),
        );
        assert_eq!(take(&log), vec![Event::Initialize]);

        engine.destroy();
        assert_eq!(take(&log), vec![Event::Destroy]);
    }

    #[test]
    fn ordered_delivery_and_ack_clears_send_queue() {
        let (mut a, log_a) = engine();
        let (mut b, log_b) = engine();
        let key = a.connect(addr_b(), 0);

        for payload in [&b"P0"[..], b"P1", b"P2"] {
            a.send_data(&key, payload).unwrap();
        }
        assert_eq!(a.channel(&key).unwrap().send_queue_len(), 3);

        let wire = sent_packets(&take(&log_a));
        assert_eq!(wire.len(), 3);
        relay(&wire, &mut b, addr_a());

        let events_b = take(&log_b);
        assert!(matches!(events_b[0], Event::Connected { .. }));
        assert_eq!(
            data_payloads(&events_b),
            vec![
                Bytes::from_static(b"P0"),
                Bytes::from_static(b"P1"),
                Bytes::from_static(b"P2")
            ]
        );
        let acks = sent_of_kind(&events_b, PacketKind::Ack);
        assert_eq!(
            acks.iter().map(PacketView::id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let ack_bytes: Vec<Bytes> = acks.iter().map(|v| v.as_bytes().clone()).collect();
        relay(&ack_bytes, &mut a, addr_b());

        let events_a = take(&log_a);
        let got_acks = events_a
            .iter()
            .filter(|e| matches!(e, Event::GotAck { .. }))
            .count();
        assert_eq!(got_acks, 3);
        assert_eq!(a.channel(&key).unwrap().send_queue_len(), 0);
    }

    #[test]
    fn reordered_arrival_is_delivered_in_order() {
        let (mut a, log_a) = engine();
        let (mut b, log_b) = engine();
        let key = a.connect(addr_b(), 0);

        for payload in [&b"P0"[..], b"P1", b"P2", b"P3"] {
            a.send_data(&key, payload).unwrap();
        }
        let wire = sent_packets(&take(&log_a));

        // Arrival order 0, 1, 3, 2.
        b.process_received(&wire[0], addr_a());
        b.process_received(&wire[1], addr_a());
        b.process_received(&wire[3], addr_a());

        let b_key = ChannelKey::new(addr_a(), 0);
        let events = take(&log_b);
        assert_eq!(
            data_payloads(&events),
            vec![Bytes::from_static(b"P0"), Bytes::from_static(b"P1")]
        );
        let channel = b.channel(&b_key).unwrap();
        assert_eq!(channel.receive_queue_len(), 1);
        assert_eq!(channel.outrunning(), 1);

        b.process_received(&wire[2], addr_a());
        let events_late = take(&log_b);
        assert_eq!(
            data_payloads(&events_late),
            vec![Bytes::from_static(b"P2"), Bytes::from_static(b"P3")]
        );
        let channel = b.channel(&b_key).unwrap();
        assert_eq!(channel.receive_queue_len(), 0);
        assert_eq!(channel.outrunning(), 0);
        assert_eq!(channel.receive_expected_id(), 4);

        // ACKs went out in arrival order.
        let mut all = events;
        all.extend(events_late);
        assert_eq!(
            sent_of_kind(&all, PacketKind::Ack)
                .iter()
                .map(PacketView::id)
                .collect::<Vec<_>>(),
            vec![0, 1, 3, 2]
        );
    }

    #[test]
    fn duplicate_data_is_acked_but_not_redelivered() {
        let (mut a, log_a) = engine();
        let (mut b, log_b) = engine();
        let key = a.connect(addr_b(), 0);

        a.send_data(&key, b"first").unwrap();
        a.send_data(&key, b"second").unwrap();
        let wire = sent_packets(&take(&log_a));
        relay(&wire, &mut b, addr_a());
        assert_eq!(data_payloads(&take(&log_b)).len(), 2);

        // The sender missed the ACK and retransmits id 1.
        b.process_received(&wire[1], addr_a());
        let events = take(&log_b);
        assert!(data_payloads(&events).is_empty());
        assert_eq!(
            sent_of_kind(&events, PacketKind::Ack)
                .iter()
                .map(PacketView::id)
                .collect::<Vec<_>>(),
            vec![1]
        );
        let channel = b.channel(&ChannelKey::new(addr_a(), 0)).unwrap();
        assert_eq!(channel.stats().packets_receive_dropped, 1);
    }

    #[test]
    fn lost_packet_is_retransmitted_on_expiry() {
        let (mut a, log_a) = engine();
        let key = a.connect(addr_b(), 0);

        a.send_data(&key, b"lost").unwrap();
        let original = sent_packets(&take(&log_a)).remove(0);
        let deadline = a.channel(&key).unwrap().next_retransmit_at().unwrap();

        assert_eq!(a.process_send_queues(deadline - 1), Some(deadline));
        assert!(sent_packets(&take(&log_a)).is_empty());

        let next = a.process_send_queues(deadline).unwrap();
        assert!(next > deadline);
        let resent = sent_packets(&take(&log_a));
        assert_eq!(resent, vec![original]);
        assert_eq!(a.channel(&key).unwrap().stats().packets_attempt, 1);
    }

    #[test]
    fn reset_handshake_rebases_both_sides() {
        let (mut a, log_a) = engine();
        let (mut b, log_b) = engine();
        let key = a.connect(addr_b(), 0);

        // Undelivered traffic on A's side.
        a.send_data(&key, b"in flight").unwrap();
        take(&log_a);

        a.send_reset(&key).unwrap();
        let events_a = take(&log_a);
        assert!(
            events_a
                .iter()
                .any(|e| matches!(e, Event::SendReset { id: Some(1), .. }))
        );
        let reset = sent_packets(&events_a);
        relay(&reset, &mut b, addr_a());

        let events_b = take(&log_b);
        assert!(events_b.iter().any(|e| matches!(e, Event::GotReset { .. })));
        let b_key = ChannelKey::new(addr_a(), 0);
        assert_eq!(b.channel(&b_key).unwrap().next_send_id(), 0);
        assert_eq!(b.channel(&b_key).unwrap().receive_expected_id(), 0);

        let ack_reset = sent_of_kind(&events_b, PacketKind::AckReset);
        assert_eq!(ack_reset.len(), 1);
        a.process_received(ack_reset[0].as_bytes(), addr_b());

        let events_a = take(&log_a);
        assert!(
            events_a
                .iter()
                .any(|e| matches!(e, Event::GotAckReset { .. }))
        );
        let channel = a.channel(&key).unwrap();
        assert_eq!(channel.next_send_id(), 0);
        assert_eq!(channel.receive_expected_id(), 0);
        assert_eq!(channel.send_queue_len(), 0);
    }

    #[test]
    fn silent_peer_is_pinged_then_disconnected() {
        let (mut a, log_a) = engine();
        let (mut b, log_b) = engine();
        let key = a.connect(addr_b(), 0);

        // One acknowledged exchange marks A's channel connected.
        a.send_data(&key, b"hello").unwrap();
        relay(&sent_packets(&take(&log_a)), &mut b, addr_a());
        let acks = sent_packets(&take(&log_b));
        relay(&acks, &mut a, addr_b());
        take(&log_a);
        assert!(a.channel(&key).unwrap().is_connected());

        let t0 = a.channel(&key).unwrap().last_received_us();
        let options = a.options().clone();

        assert_eq!(
            a.process_keep_connection(t0 + options.keepalive_first_ping_us + 1),
            1
        );
        assert_eq!(
            sent_of_kind(&take(&log_a), PacketKind::Ping).len(),
            1
        );

        assert_eq!(
            a.process_keep_connection(
                t0 + options.keepalive_first_ping_us + 1 + options.keepalive_next_ping_us
            ),
            1
        );
        take(&log_a);

        assert_eq!(
            a.process_keep_connection(t0 + options.disconnect_timeout_us + 5),
            0
        );
        let events = take(&log_a);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Disconnected {
                age_us: Some(age),
                ..
            } if *age > options.disconnect_timeout_us as u32
        )));
        assert!(a.channel(&key).is_none());

        // Sending to the stale key fails; reconnecting starts from id 0.
        assert!(matches!(
            a.send_data(&key, b"late"),
            Err(RudpError::ChannelNotFound(_))
        ));
        let key = a.connect(addr_b(), 0);
        assert_eq!(a.channel(&key).unwrap().next_send_id(), 0);
    }

    #[test]
    fn malformed_datagram_is_surfaced_as_foreign_traffic() {
        let (mut a, log_a) = engine();
        a.process_received(b"not a protocol packet", addr_b());

        let events = take(&log_a);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Event::ProcessReceiveNoRudp { from, data }
                if *from == addr_b() && &data[..] == b"not a protocol packet"
        ));
        assert_eq!(a.channel_count(), 0);
    }

    #[test]
    fn broadcast_skips_unconnected_channels() {
        let (mut a, log_a) = engine();
        a.connect(addr_b(), 0); // never heard from: Fresh

        // A peer that has spoken to us is connected.
        let ping = packet::build_ping(0, 1, b"hi", 7).unwrap();
        a.process_received(&ping, addr_a());
        take(&log_a);

        assert_eq!(a.send_data_to_all(b"broadcast"), 1);
        let sent = sent_of_kind(&take(&log_a), PacketKind::Data);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel(), 1);
    }

    #[test]
    fn broadcast_skips_backpressured_channels() {
        let (mut a, log_a) = engine();
        let ping = packet::build_ping(0, 0, b"", 7).unwrap();
        a.process_received(&ping, addr_b());
        take(&log_a);
        let key = ChannelKey::new(addr_b(), 0);

        for _ in 0..SEND_QUEUE_DROP_LIMIT {
            a.send_data(&key, b"fill").unwrap();
        }
        take(&log_a);
        assert_eq!(a.send_data_to_all(b"over"), 0);
    }

    #[test]
    fn excessive_outrun_requests_reset() {
        let (mut a, log_a) = engine_with(EngineOptions {
            max_outrunning: 2,
            ..EngineOptions::default()
        });

        // Early ids with id 0 still missing.
        for id in [1u32, 2, 3] {
            let data = packet::build_data(id, 0, b"early", 9).unwrap();
            a.process_received(&data, addr_b());
        }

        let events = take(&log_a);
        assert!(events.iter().any(|e| matches!(e, Event::SendReset { .. })));
        assert_eq!(sent_of_kind(&events, PacketKind::Reset).len(), 1);
    }

    #[test]
    fn high_send_id_with_drained_queues_requests_reset() {
        let (mut a, log_a) = engine_with(EngineOptions {
            reset_after_id: 2,
            ..EngineOptions::default()
        });
        let key = a.connect(addr_b(), 0);

        a.send_data(&key, b"one").unwrap();
        a.send_data(&key, b"two").unwrap();
        let wire = sent_packets(&take(&log_a));

        let ack0 = packet::build_ack(&PacketView::check(wire[0].clone()).unwrap()).unwrap();
        a.process_received(&ack0, addr_b());
        assert!(take(&log_a).iter().all(|e| !matches!(e, Event::SendReset { .. })));

        let ack1 = packet::build_ack(&PacketView::check(wire[1].clone()).unwrap()).unwrap();
        a.process_received(&ack1, addr_b());
        let events = take(&log_a);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::SendReset { id: Some(2), .. }))
        );
    }

    #[test]
    fn stale_ack_is_dropped_silently() {
        let (mut a, log_a) = engine();
        let key = a.connect(addr_b(), 0);
        a.send_data(&key, b"x").unwrap();
        take(&log_a);

        let phantom = packet::build_data(55, 0, b"", 3).unwrap();
        let ack = packet::build_ack(&PacketView::check(phantom).unwrap()).unwrap();
        a.process_received(&ack, addr_b());

        let events = take(&log_a);
        assert!(events.iter().all(|e| !matches!(e, Event::GotAck { .. })));
        assert_eq!(a.channel(&key).unwrap().send_queue_len(), 1);
    }

    #[test]
    fn write_queue_mode_drains_round_robin() {
        let (mut a, log_a) = engine_with(EngineOptions {
            use_write_queue: true,
            ..EngineOptions::default()
        });
        let key0 = a.connect(addr_b(), 0);
        let key1 = a.connect(addr_b(), 1);

        a.send_data(&key0, b"zero").unwrap();
        a.send_data(&key1, b"one").unwrap();
        assert!(sent_packets(&take(&log_a)).is_empty());

        let mut drained = 0;
        while a.process_write_queues() > 0 {
            drained += 1;
        }
        assert_eq!(drained, 2);
        let sent = sent_of_kind(&take(&log_a), PacketKind::Data);
        let mut channels: Vec<u8> = sent.iter().map(PacketView::channel).collect();
        channels.sort_unstable();
        assert_eq!(channels, vec![0, 1]);
        assert_eq!(a.process_write_queues(), 0);
    }

    #[test]
    fn ping_is_answered_with_payload_echo() {
        let (mut a, log_a) = engine();
        let ping = packet::build_ping(4, 2, b"are you there", 77).unwrap();
        a.process_received(&ping, addr_b());

        let events = take(&log_a);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::GotPing { payload, .. } if &payload[..] == b"are you there"
        )));
        let replies = sent_of_kind(&events, PacketKind::AckPing);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id(), 4);
        assert_eq!(replies[0].timestamp(), 77);
        assert_eq!(&replies[0].payload()[..], b"are you there");
    }

    #[test]
    fn data_id_zero_after_progress_rebases_receiver() {
        let (mut a, log_a) = engine();
        let (mut b, log_b) = engine();
        let key = a.connect(addr_b(), 0);

        a.send_data(&key, b"0").unwrap();
        a.send_data(&key, b"1").unwrap();
        relay(&sent_packets(&take(&log_a)), &mut b, addr_a());
        let b_key = ChannelKey::new(addr_a(), 0);
        assert_eq!(b.channel(&b_key).unwrap().receive_expected_id(), 2);
        take(&log_b);

        // A replayed id 0 means the peer restarted its id space.
        let rebased = packet::build_data(0, 0, b"fresh start", 5).unwrap();
        b.process_received(&rebased, addr_a());
        assert_eq!(b.channel(&b_key).unwrap().receive_expected_id(), 0);
        assert!(data_payloads(&take(&log_b)).is_empty());
    }
}
