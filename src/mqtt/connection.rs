//! Broker connection lifecycle for one logical client.
//!
//! Each [`MqttConnection`] owns exactly one rumqttc session: an
//! `AsyncClient` for requests and a background task that drives the
//! `EventLoop`. All [`ConnectionState`] writes happen inside that task,
//! in response to broker events; callers only ever request connect or
//! disconnect and observe the state with eventual consistency.

use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS, Transport};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::subscriber::{Inbox, InboundMessage};
use super::topic::ClientIdentity;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_QUEUE_CAPACITY: usize = 64;
/// Pause before re-polling after a transport error, so a dead broker
/// does not turn the event loop into a busy loop.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("unsupported broker scheme '{0}' (expected mqtt, tcp or ws)")]
    UnsupportedScheme(String),

    #[error("invalid broker address '{0}'")]
    InvalidAddress(String),

    #[error("invalid broker port in '{0}'")]
    InvalidPort(String),
}

/// Transport family selected from the broker address scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScheme {
    Tcp,
    Ws,
}

/// Parsed connection target. Scheme validation happens here, before any
/// I/O is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub scheme: BrokerScheme,
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn parse(address: &str) -> Result<Self, MqttError> {
        let (scheme, rest) = address
            .split_once("://")
            .ok_or_else(|| MqttError::InvalidAddress(address.to_string()))?;
        let scheme = match scheme {
            "mqtt" | "tcp" => BrokerScheme::Tcp,
            "ws" => BrokerScheme::Ws,
            other => return Err(MqttError::UnsupportedScheme(other.to_string())),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| MqttError::InvalidPort(address.to_string()))?;
                (host, port)
            }
            None => (rest, 1883),
        };
        if host.is_empty() {
            return Err(MqttError::InvalidAddress(address.to_string()));
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }
}

/// Optional broker credentials; a missing username means anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Connection state as last reported by the event-loop task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

pub struct MqttConnection {
    identity: ClientIdentity,
    endpoint: BrokerEndpoint,
    credentials: Option<Credentials>,
    session_id: String,
    client: Option<AsyncClient>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    inbox: Option<Inbox>,
    subscribe_topic: Option<String>,
    stop: CancellationToken,
    poll_task: Option<JoinHandle<()>>,
}

impl MqttConnection {
    /// Builds a connection object without touching the network. The
    /// broker session id gets a random suffix so the three per-stream
    /// sessions of one client name never collide on the broker.
    pub fn new(
        endpoint: BrokerEndpoint,
        identity: ClientIdentity,
        credentials: Option<Credentials>,
    ) -> Self {
        let session_id = format!(
            "{}_{}_{:02}",
            identity.client_id,
            identity.kind,
            rand::random::<u8>() % 100
        );
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        Self {
            identity,
            endpoint,
            credentials,
            session_id,
            client: None,
            state_tx,
            state_rx,
            inbox: None,
            subscribe_topic: None,
            stop: CancellationToken::new(),
            poll_task: None,
        }
    }

    /// Registers the inbox this connection delivers inbound messages to
    /// and the topic it subscribes to. Must be called before
    /// [`connect`](Self::connect); the subscription is (re)issued on
    /// every ConnAck so a transport-level reconnect restores it.
    pub fn set_inbox(&mut self, inbox: Inbox, topic: String) {
        self.inbox = Some(inbox);
        self.subscribe_topic = Some(topic);
    }

    /// Issues a non-blocking connect request and starts the background
    /// task that drives all socket I/O and event delivery for this
    /// session. Network failures are not raised here; they surface
    /// later through [`state`](Self::state).
    pub fn connect(&mut self) -> Result<(), MqttError> {
        if self.client.is_some() {
            debug!(client = %self.label(), "connect requested twice, ignoring");
            return Ok(());
        }

        let mut options = match self.endpoint.scheme {
            BrokerScheme::Tcp => MqttOptions::new(
                self.session_id.clone(),
                self.endpoint.host.clone(),
                self.endpoint.port,
            ),
            BrokerScheme::Ws => {
                // rumqttc expects the full URL in the host field for
                // websocket transports; the port argument is unused.
                let url = format!("ws://{}:{}/mqtt", self.endpoint.host, self.endpoint.port);
                let mut options = MqttOptions::new(self.session_id.clone(), url, self.endpoint.port);
                options.set_transport(Transport::Ws);
                options
            }
        };
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(credentials) = &self.credentials {
            options.set_credentials(credentials.username.clone(), credentials.password.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);

        let label = self.label();
        let host = self.endpoint.host.clone();
        let state_tx = self.state_tx.clone();
        let inbox = self.inbox.clone();
        let subscribe_topic = self.subscribe_topic.clone();
        let subscribe_client = client.clone();
        let stop = self.stop.clone();

        let task = tokio::spawn(async move {
            let _ = state_tx.send(ConnectionState::Connecting);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    event = event_loop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            if ack.code == ConnectReturnCode::Success {
                                info!(client = %label, %host, "connected to broker");
                                let _ = state_tx.send(ConnectionState::Connected);
                                if let Some(topic) = &subscribe_topic {
                                    if let Err(e) = subscribe_client
                                        .subscribe(topic.as_str(), QoS::AtMostOnce)
                                        .await
                                    {
                                        warn!(client = %label, %topic, "subscribe failed: {e}");
                                    } else {
                                        info!(client = %label, %topic, "subscribed");
                                    }
                                }
                            } else {
                                warn!(client = %label, %host, code = ?ack.code, "broker refused connection");
                                let _ = state_tx.send(ConnectionState::Disconnected);
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if let Some(inbox) = &inbox {
                                inbox.push(InboundMessage {
                                    topic: publish.topic.clone(),
                                    payload: publish.payload.to_vec(),
                                });
                            } else {
                                debug!(client = %label, topic = %publish.topic, "dropping message, no inbox registered");
                            }
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            warn!(client = %label, %host, "disconnected by broker");
                            let _ = state_tx.send(ConnectionState::Disconnected);
                        }
                        Ok(Event::Incoming(Packet::SubAck(ack))) => {
                            debug!(client = %label, pkid = ack.pkid, "subscription acknowledged");
                        }
                        Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                            // QoS 0 gets no broker ack; this is the only
                            // observable trace of a publish attempt.
                            debug!(client = %label, pkid, "publish handed to transport");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(client = %label, %host, "transport error: {e}");
                            let _ = state_tx.send(ConnectionState::Disconnected);
                            tokio::select! {
                                _ = stop.cancelled() => break,
                                _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                            }
                        }
                    }
                }
            }
            let _ = state_tx.send(ConnectionState::Disconnected);
            debug!(client = %label, "event loop stopped");
        });

        self.client = Some(client);
        self.poll_task = Some(task);
        Ok(())
    }

    /// Latest state reported by the event-loop task. Eventually
    /// consistent: a just-issued connect or disconnect request may not
    /// be reflected yet.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Request handle for publishers. Present only after
    /// [`connect`](Self::connect) has been called.
    pub fn client(&self) -> Option<&AsyncClient> {
        self.client.as_ref()
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Tears the session down: requests a broker disconnect, stops the
    /// event-loop task and waits for it to finish. Idempotent, and safe
    /// on a connection that never connected.
    pub async fn disable(&mut self) {
        info!(client = %self.label(), "disable requested");
        if let Some(client) = &self.client {
            if let Err(e) = client.disconnect().await {
                debug!(client = %self.label(), "disconnect request not delivered: {e}");
            }
        }
        self.stop.cancel();
        if let Some(task) = self.poll_task.take() {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!(client = %self.label(), "event loop did not stop in time");
                let _ = self.state_tx.send(ConnectionState::Disconnected);
            }
        }
    }

    fn label(&self) -> String {
        format!("{}/{}", self.identity.client_id, self.identity.kind)
    }
}
