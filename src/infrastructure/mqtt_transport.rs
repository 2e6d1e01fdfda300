// MQTT transport client - Broker session supervision, reconnect and best-effort publish
use crate::application::publisher::{InboundMessage, MessagePublisher, OutboundMessage, TransportError};
use crate::domain::connection::ConnectionState;
use crate::domain::notification::normalize;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, Utc};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How a broker session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// We asked for the disconnect
    Clean,
    Unexpected(String),
}

/// Sending half of an established session
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
}

pub struct BrokerSession {
    pub link: Arc<dyn BrokerLink>,
    /// Resolves once the session is gone
    pub ended: oneshot::Receiver<SessionEnd>,
}

/// Opens broker sessions. Messages received on subscribed topics are pushed
/// into `inbound` for the lifetime of the session.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    fn address(&self) -> String;
    async fn connect(&self, inbound: mpsc::Sender<InboundMessage>) -> Result<BrokerSession>;
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub retry_backoff: Duration,
    /// How long a publish waits for a reconnect before giving up
    pub publish_wait: Duration,
    pub qos: QoS,
    /// Structured messages on this topic get their canonical fields filled in
    pub notification_topic: String,
}

struct Inner {
    connector: Arc<dyn BrokerConnector>,
    settings: TransportSettings,
    state: watch::Sender<ConnectionState>,
    link: RwLock<Option<Arc<dyn BrokerLink>>>,
    wake: Notify,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    inbound: mpsc::Sender<InboundMessage>,
}

impl Inner {
    fn mark_connected(&self) {
        self.state.send_modify(|state| {
            state.connected = true;
            state.last_error = None;
            state.since = Some(Utc::now());
        });
    }

    fn mark_disconnected(&self, error: Option<String>) {
        self.state.send_modify(|state| {
            state.connected = false;
            if error.is_some() {
                state.last_error = error;
            }
            state.since = Some(Utc::now());
        });
    }

    async fn current_link(&self) -> Option<Arc<dyn BrokerLink>> {
        self.link.read().await.clone()
    }
}

/// Owns the single broker connection. Clones share the same session.
#[derive(Clone)]
pub struct TransportClient {
    inner: Arc<Inner>,
}

impl TransportClient {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        settings: TransportSettings,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::disconnected(connector.address()));
        Self {
            inner: Arc::new(Inner {
                connector,
                settings,
                state,
                link: RwLock::new(None),
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
                supervisor: Mutex::new(None),
                closed: AtomicBool::new(false),
                inbound,
            }),
        }
    }

    /// Start the background connect loop if it is not already running.
    /// Never fails: connection errors are retried in the background.
    pub async fn connect(&self) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }

        let mut supervisor = self.inner.supervisor.lock().await;
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *supervisor = Some(tokio::spawn(supervise(self.inner.clone())));
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let payload = self.encode(topic, message)?;
        let link = match self.inner.current_link().await {
            Some(link) => link,
            None => self.reconnect_and_wait().await?,
        };

        link.publish(topic, payload, self.inner.settings.qos)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(topic = %topic, "Message published");
        Ok(())
    }

    /// Clean shutdown. Safe to call more than once.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.shutdown.cancel();
        let handle = self.inner.supervisor.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Transport supervisor ended abnormally");
            }
        }

        let link = self.inner.link.write().await.take();
        if let Some(link) = link {
            if let Err(e) = link.disconnect().await {
                tracing::debug!(error = %e, "Disconnect during close failed");
            }
        }

        self.inner.mark_disconnected(None);
        tracing::info!(broker = %self.inner.connector.address(), "Transport closed");
    }

    fn encode(&self, topic: &str, message: OutboundMessage) -> Result<Vec<u8>, TransportError> {
        match message {
            OutboundMessage::Text(text) => Ok(text.into_bytes()),
            OutboundMessage::Json(mut map) => {
                if topic == self.inner.settings.notification_topic {
                    let filled = normalize(&mut map, Local::now());
                    if !filled.is_empty() {
                        tracing::warn!(topic = %topic, fields = ?filled, "Filled missing notification fields");
                    }
                }
                Ok(serde_json::to_vec(&map)?)
            }
        }
    }

    /// One nudge of the connect loop, then a short wait for it to succeed
    async fn reconnect_and_wait(&self) -> Result<Arc<dyn BrokerLink>, TransportError> {
        let broker = self.inner.connector.address();
        tracing::warn!(broker = %broker, "Not connected, attempting reconnect before publish");

        self.connect().await;
        // wakes a supervisor sitting in backoff, leaves no permit behind
        self.inner.wake.notify_waiters();

        let mut state = self.inner.state.subscribe();
        let connected = {
            let waited = tokio::time::timeout(
                self.inner.settings.publish_wait,
                state.wait_for(|s| s.connected),
            )
            .await;
            matches!(waited, Ok(Ok(_)))
        };

        if connected {
            if let Some(link) = self.inner.current_link().await {
                return Ok(link);
            }
        }
        Err(TransportError::NotConnected { broker })
    }
}

#[async_trait]
impl MessagePublisher for TransportClient {
    async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<(), TransportError> {
        TransportClient::publish(self, topic, message).await
    }

    fn connection_state(&self) -> ConnectionState {
        self.state()
    }
}

/// Connect loop. Runs until the transport is closed.
async fn supervise(inner: Arc<Inner>) {
    let broker = inner.connector.address();
    let backoff = inner.settings.retry_backoff;

    loop {
        if inner.shutdown.is_cancelled() {
            break;
        }

        tracing::info!(broker = %broker, "Connecting to broker");
        let attempt = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            attempt = inner.connector.connect(inner.inbound.clone()) => attempt,
        };

        match attempt {
            Ok(session) => {
                *inner.link.write().await = Some(session.link.clone());
                inner.mark_connected();
                tracing::info!(broker = %broker, "Connected to broker");

                let end = tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    end = session.ended => end.unwrap_or_else(|_| SessionEnd::Unexpected("session driver stopped".into())),
                };

                inner.link.write().await.take();
                match end {
                    SessionEnd::Clean => {
                        tracing::info!(broker = %broker, "Broker session closed");
                        inner.mark_disconnected(None);
                    }
                    SessionEnd::Unexpected(reason) => {
                        tracing::warn!(broker = %broker, reason = %reason, "Broker connection lost, reconnecting");
                        inner.mark_disconnected(Some(reason));
                    }
                }
            }
            Err(e) => {
                inner.mark_disconnected(Some(e.to_string()));
                tracing::warn!(
                    broker = %broker,
                    error = %e,
                    retry_in_secs = backoff.as_secs(),
                    "Broker connection failed"
                );

                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                    _ = inner.wake.notified() => {
                        tracing::debug!(broker = %broker, "Reconnect requested by publisher");
                    }
                }
            }
        }
    }

    let link = inner.link.write().await.take();
    if let Some(link) = link {
        if let Err(e) = link.disconnect().await {
            tracing::debug!(error = %e, "Disconnect on shutdown failed");
        }
    }
    tracing::debug!(broker = %broker, "Transport supervisor stopped");
}

/// Map a configured QoS level to the protocol value. Unknown levels fall
/// back to at-least-once.
pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Broker sessions backed by rumqttc
pub struct RumqttConnector {
    host: String,
    port: u16,
    client_id: String,
    keep_alive: Duration,
    connect_timeout: Duration,
    subscriptions: Vec<String>,
}

impl RumqttConnector {
    pub fn new(
        host: String,
        port: u16,
        client_id: String,
        keep_alive: Duration,
        connect_timeout: Duration,
        subscriptions: Vec<String>,
    ) -> Self {
        Self {
            host,
            port,
            client_id,
            keep_alive,
            connect_timeout,
            subscriptions,
        }
    }
}

#[async_trait]
impl BrokerConnector for RumqttConnector {
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self, inbound: mpsc::Sender<InboundMessage>) -> Result<BrokerSession> {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        tokio::time::timeout(self.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .with_context(|| format!("Timed out connecting to {}", self.address()))??;

        for topic in &self.subscriptions {
            client
                .subscribe(topic.clone(), QoS::AtLeastOnce)
                .await
                .with_context(|| format!("Failed to subscribe to {}", topic))?;
            tracing::info!(topic = %topic, "Subscribed");
        }

        let (ended_tx, ended_rx) = oneshot::channel();
        tokio::spawn(drive_event_loop(eventloop, inbound, ended_tx));

        Ok(BrokerSession {
            link: Arc::new(RumqttLink { client }),
            ended: ended_rx,
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
            if ack.code == ConnectReturnCode::Success {
                return Ok(());
            }
            anyhow::bail!("Broker refused connection: {:?}", ack.code);
        }
    }
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    inbound: mpsc::Sender<InboundMessage>,
    ended: oneshot::Sender<SessionEnd>,
) {
    let end = loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                forward_inbound(
                    &inbound,
                    InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    },
                );
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                break SessionEnd::Unexpected("broker sent disconnect".into());
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break SessionEnd::Clean,
            Ok(_) => {}
            Err(e) => break SessionEnd::Unexpected(e.to_string()),
        }
    };

    let _ = ended.send(end);
}

/// Hand a received message to the consumer without blocking the event
/// loop. A full queue drops the message so keep-alives keep flowing.
fn forward_inbound(inbound: &mpsc::Sender<InboundMessage>, message: InboundMessage) -> bool {
    match inbound.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(message)) => {
            tracing::warn!(topic = %message.topic, "Inbound queue full, dropping message");
            false
        }
        Err(mpsc::error::TrySendError::Closed(message)) => {
            tracing::debug!(topic = %message.topic, "Inbound consumer gone, dropping message");
            false
        }
    }
}

struct RumqttLink {
    client: AsyncClient,
}

#[async_trait]
impl BrokerLink for RumqttLink {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        self.client
            .publish(topic, qos, false, payload)
            .await
            .context("Failed to enqueue publish")
    }

    async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await.context("Failed to send disconnect")
    }
}
