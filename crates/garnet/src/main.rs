use garnet_log::GarnetLogger;
use log::{debug, error, info, trace, warn, Level};
use rudpnet::{ChannelKey, Event, Peer, RudpError};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

mod config;

use config::Config;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    GarnetLogger::init(Level::Debug)?;

    let config = match config::handle() {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    let bind_addr: SocketAddr = config.network.address.parse()?;
    let mut peer = Peer::bind(bind_addr, config.transport.engine_options()).await?;
    info!("garnet listening on {}", peer.local_addr());

    let remote: Option<SocketAddr> = match &config.peer.remote {
        Some(remote) => Some(remote.parse()?),
        None => None,
    };
    let mut outbound: Option<ChannelKey> = remote.map(|addr| {
        info!("talking to {addr} on channel {}", config.peer.channel);
        peer.connect(addr, config.peer.channel)
    });

    let mut counter: u64 = 0;
    let mut last_message = Instant::now();
    let mut last_stats = Instant::now();

    loop {
        match tokio::time::timeout(Duration::from_millis(50), peer.next_event()).await {
            Ok(Ok(event)) => handle_event(&mut peer, &config, event),
            Ok(Err(err)) => {
                error!("transport failure: {err}");
                return Err(err.into());
            }
            Err(_) => {}
        }

        if let (Some(addr), Some(key)) = (remote, outbound) {
            if last_message.elapsed() >= Duration::from_millis(config.peer.message_interval_ms) {
                counter += 1;
                let text = format!("garnet message {counter}");
                match peer.send(&key, text.as_bytes()) {
                    Ok(_) => trace!("queued '{text}'"),
                    Err(RudpError::ChannelNotFound(_)) => {
                        // The channel timed out; start over with a fresh one.
                        info!("reconnecting to {addr}");
                        outbound = Some(peer.connect(addr, config.peer.channel));
                    }
                    Err(err) => warn!("send failed: {err}"),
                }
                last_message = Instant::now();
            }
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            report_stats(&peer);
            last_stats = Instant::now();
        }
    }
}

fn handle_event(peer: &mut Peer, config: &Config, event: Event) {
    match event {
        Event::GotData { channel, payload } => {
            info!(
                "[{channel}] {} bytes: {}",
                payload.len(),
                String::from_utf8_lossy(&payload)
            );
            if config.peer.echo && config.peer.remote.is_none() {
                if let Err(err) = peer.send(&channel, &payload) {
                    warn!("echo on {channel} failed: {err}");
                }
            }
        }
        Event::Connected { channel } => info!("channel {channel} connected"),
        Event::Disconnected { channel, age_us } => match age_us {
            Some(age) => info!("channel {channel} disconnected after {age}µs of silence"),
            None => info!("channel {channel} disconnected"),
        },
        Event::GotReset { channel } => info!("channel {channel} was reset by the peer"),
        Event::GotAckReset { channel } => info!("channel {channel} reset confirmed"),
        Event::SendReset { channel, .. } => debug!("channel {channel} requested a reset"),
        Event::GotPing { channel, payload } => {
            debug!("[{channel}] ping: {}", String::from_utf8_lossy(&payload))
        }
        Event::GotAckPing { channel, .. } => debug!("[{channel}] ping answered"),
        Event::GotAck { channel, .. } => trace!("[{channel}] ack"),
        Event::ProcessReceiveNoRudp { from, data } => {
            warn!("{} bytes of foreign traffic from {from}", data.len())
        }
        other => trace!("{other:?}"),
    }
}

fn report_stats(peer: &Peer) {
    for (key, channel) in peer.engine().channels() {
        let stats = channel.stats();
        info!(
            "[{key}] sent {} (retries {}), received {} (dropped {}), acks {}, rtt {}µs, queues {}/{}/{}",
            stats.packets_send,
            stats.packets_attempt,
            stats.packets_receive,
            stats.packets_receive_dropped,
            stats.ack_receive,
            channel.triptime_us(),
            channel.send_queue_len(),
            channel.receive_queue_len(),
            channel.write_queue_len(),
        );
    }
}
