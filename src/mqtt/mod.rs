//! Correlated request/reply over an MQTT broker.
//!
//! One transcript becomes one request: a fresh correlation id, a per-request
//! reply topic derived from the base reply topic, and a bounded wait for the
//! matching reply. A background worker owns the rumqttc event loop; the
//! session thread only publishes and waits on its pending slot.

mod connection;
mod payload;
mod pending;

pub use connection::ConnectionState;
pub use payload::{ReplyPayload, RequestPayload};

use connection::{qos_level, ConnectionMonitor};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use pending::PendingTable;
use rumqttc::{Client, MqttOptions, TlsConfiguration, Transport};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Broker transport failures the session loop has to distinguish.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("could not reach broker after {attempts} attempts")]
    ConnectFailed { attempts: u32 },
    #[error("not connected to broker")]
    NotConnected,
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("broker connection lost; gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Validated broker settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// CA certificate in PEM form; TLS is enabled when present.
    pub ca: Option<Vec<u8>>,
    pub keepalive: Duration,
    pub qos: u8,
    pub request_topic: String,
    pub base_reply_topic: String,
    pub connect_attempts: u32,
    pub connect_retry: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
}

/// Request/reply seam between the session loop and the broker client.
pub trait ReplyTransport {
    /// Publish a transcript and wait up to `timeout` for the correlated
    /// reply. `Ok(None)` means the engine did not answer in time; that is an
    /// expected outcome, not a transport failure.
    fn request_reply(
        &self,
        text: &str,
        lang: &str,
        timeout: Duration,
    ) -> Result<Option<ReplyPayload>, ChannelError>;

    /// A latched unrecoverable transport failure, if one has occurred.
    fn fatal_error(&self) -> Option<ChannelError>;
}

impl<T: ReplyTransport> ReplyTransport for &T {
    fn request_reply(
        &self,
        text: &str,
        lang: &str,
        timeout: Duration,
    ) -> Result<Option<ReplyPayload>, ChannelError> {
        (**self).request_reply(text, lang, timeout)
    }

    fn fatal_error(&self) -> Option<ChannelError> {
        (**self).fatal_error()
    }
}

/// MQTT-backed transport. Owns the broker client and its worker thread.
pub struct RequestReplyChannel {
    client: Client,
    cfg: MqttConfig,
    monitor: Arc<ConnectionMonitor>,
    pending: Arc<PendingTable>,
    worker: Option<JoinHandle<()>>,
}

impl RequestReplyChannel {
    /// Connect to the broker and block until the session is established or
    /// the initial attempt budget runs out.
    pub fn connect(cfg: MqttConfig) -> Result<Self, ChannelError> {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(cfg.keepalive);
        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        if let Some(ca) = &cfg.ca {
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca: ca.clone(),
                alpn: None,
                client_auth: None,
            }));
        }

        let (client, connection) = Client::new(options, 64);
        let monitor = Arc::new(ConnectionMonitor::new());
        let pending = PendingTable::new();
        let (conn_tx, conn_rx): (Sender<()>, Receiver<()>) = bounded(1);

        let worker = {
            let client = client.clone();
            let cfg = cfg.clone();
            let monitor = monitor.clone();
            let pending = pending.clone();
            std::thread::Builder::new()
                .name("mqtt-events".to_string())
                .spawn(move || {
                    connection::run_event_loop(connection, client, cfg, monitor, pending, conn_tx)
                })
                .map_err(|_| ChannelError::ConnectFailed { attempts: 0 })?
        };

        let channel = Self {
            client,
            cfg,
            monitor,
            pending,
            worker: Some(worker),
        };

        // Each initial attempt gets one retry interval to produce a ConnAck.
        for _ in 0..channel.cfg.connect_attempts.max(1) {
            match conn_rx.recv_timeout(channel.cfg.connect_retry) {
                Ok(()) => return Ok(channel),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let attempts = channel.cfg.connect_attempts;
        channel.shutdown();
        Err(ChannelError::ConnectFailed { attempts })
    }

    /// Stop the worker and disconnect. Idempotent.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        self.monitor.begin_shutdown();
        if let Err(err) = self.client.disconnect() {
            debug!(error = %err, "disconnect while shutting down");
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("broker worker thread panicked");
            }
        }
    }
}

impl Drop for RequestReplyChannel {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

impl ReplyTransport for RequestReplyChannel {
    fn request_reply(
        &self,
        text: &str,
        lang: &str,
        timeout: Duration,
    ) -> Result<Option<ReplyPayload>, ChannelError> {
        if self.monitor.state() != ConnectionState::Connected {
            return Err(ChannelError::NotConnected);
        }

        let request = RequestPayload::new(text, lang, &self.cfg.base_reply_topic);
        let body = serde_json::to_vec(&request)
            .map_err(|err| ChannelError::PublishFailed(err.to_string()))?;

        // The slot must exist before the request is visible to the engine,
        // or a fast reply could arrive with nowhere to land.
        let (_guard, slot) = self.pending.register(&request.corr_id);

        self.client
            .publish(
                self.cfg.request_topic.as_str(),
                qos_level(self.cfg.qos),
                false,
                body,
            )
            .map_err(|err| ChannelError::PublishFailed(err.to_string()))?;

        info!(
            corr_id = %request.corr_id,
            topic = %self.cfg.request_topic,
            "request published"
        );

        match slot.recv_timeout(timeout) {
            Ok(reply) => Ok(Some(reply)),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    corr_id = %request.corr_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "no reply before timeout"
                );
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn fatal_error(&self) -> Option<ChannelError> {
        let attempts = self.monitor.fatal_attempts();
        if attempts > 0 {
            Some(ChannelError::ReconnectExhausted { attempts })
        } else {
            None
        }
    }
}
