//! Broker event loop and connection lifecycle tracking.
//!
//! The rumqttc event loop runs on a dedicated worker thread. It resubscribes
//! after every (re)connect, routes reply publishes into the pending table,
//! and applies doubling backoff to reconnect attempts. Once the attempt
//! budget is exhausted the monitor latches a fatal flag and the worker exits;
//! the session loop sees the flag and takes the process down.

use super::payload::ReplyPayload;
use super::pending::PendingTable;
use super::MqttConfig;
use crossbeam_channel::Sender;
use rumqttc::{Client, Connection, Event, Packet, QoS};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Ceiling on any single retry delay, whatever the attempt count.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);
/// Granularity at which retry waits re-check the shutdown flag.
const RETRY_WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }
}

/// Connection lifecycle shared between the worker thread and requesters.
pub(super) struct ConnectionMonitor {
    state: AtomicU8,
    reconnect_attempts: AtomicU32,
    ever_connected: AtomicBool,
    fatal_attempts: AtomicU32,
    shutting_down: AtomicBool,
}

impl ConnectionMonitor {
    pub(super) fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            reconnect_attempts: AtomicU32::new(0),
            ever_connected: AtomicBool::new(false),
            fatal_attempts: AtomicU32::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub(super) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn mark_connected(&self) {
        self.set_state(ConnectionState::Connected);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.ever_connected.store(true, Ordering::SeqCst);
    }

    pub(super) fn ever_connected(&self) -> bool {
        self.ever_connected.load(Ordering::SeqCst)
    }

    /// Attempts after which reconnection was abandoned; zero while healthy.
    pub(super) fn fatal_attempts(&self) -> u32 {
        self.fatal_attempts.load(Ordering::SeqCst)
    }

    pub(super) fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub(super) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Delay before reconnect attempt `attempt` (1-based): base doubled per
/// attempt, capped at `MAX_RETRY_DELAY`.
pub(super) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(MAX_RETRY_DELAY)
}

/// Sleep for `delay` in short slices, returning as soon as shutdown is
/// requested. Shutdown joins the worker thread, so the worker must never
/// park itself in one long uninterruptible sleep.
pub(super) fn wait_before_retry(monitor: &ConnectionMonitor, delay: Duration) {
    let deadline = Instant::now() + delay;
    loop {
        if monitor.is_shutting_down() {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(RETRY_WAIT_SLICE));
    }
}

/// Drive the broker connection until shutdown or a fatal failure.
pub(super) fn run_event_loop(
    mut connection: Connection,
    client: Client,
    cfg: MqttConfig,
    monitor: Arc<ConnectionMonitor>,
    pending: Arc<PendingTable>,
    conn_events: Sender<()>,
) {
    let reply_filter = format!("{}/#", cfg.base_reply_topic);
    let qos = qos_level(cfg.qos);

    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                monitor.mark_connected();
                info!(host = %cfg.host, port = cfg.port, "connected to broker");
                if let Err(err) = client.subscribe(reply_filter.as_str(), qos) {
                    warn!(error = %err, topic = %reply_filter, "subscribe failed");
                }
                // Wake anyone waiting for the initial connection.
                let _ = conn_events.try_send(());
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_publish(&pending, &publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                monitor.set_state(ConnectionState::Disconnected);
                warn!("broker sent disconnect");
            }
            Ok(_) => {}
            Err(err) => {
                if monitor.is_shutting_down() {
                    break;
                }
                monitor.set_state(ConnectionState::Disconnected);

                if !monitor.ever_connected() {
                    // Initial connect failures are paced by the waiter in
                    // connect(); keep retrying at the configured interval.
                    debug!(error = %err, "initial connection attempt failed");
                    wait_before_retry(&monitor, cfg.connect_retry);
                    continue;
                }

                let attempt = monitor.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > cfg.max_reconnect_attempts {
                    monitor.fatal_attempts.store(attempt - 1, Ordering::SeqCst);
                    error!(
                        attempts = attempt - 1,
                        error = %err,
                        "reconnect attempts exhausted"
                    );
                    break;
                }
                let delay = backoff_delay(cfg.reconnect_backoff, attempt);
                warn!(
                    attempt,
                    max = cfg.max_reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "connection lost, retrying"
                );
                wait_before_retry(&monitor, delay);
            }
        }
    }

    monitor.set_state(ConnectionState::Disconnected);
    debug!("broker event loop finished");
}

/// Parse a reply publish and hand it to the pending table. Malformed or
/// uncorrelated messages are dropped without disturbing in-flight requests.
fn handle_publish(pending: &PendingTable, topic: &str, payload: &[u8]) {
    let reply: ReplyPayload = match serde_json::from_slice(payload) {
        Ok(reply) => reply,
        Err(err) => {
            warn!(topic, error = %err, "discarding malformed reply");
            return;
        }
    };
    let corr_id = match reply.corr_id.clone() {
        Some(id) if !id.is_empty() => id,
        _ => {
            warn!(topic, "discarding reply without correlation id");
            return;
        }
    };
    if pending.deliver(&corr_id, reply) {
        debug!(corr_id = %corr_id, "reply delivered");
    } else {
        debug!(corr_id = %corr_id, "reply had no waiting request");
    }
}

pub(super) fn qos_level(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
