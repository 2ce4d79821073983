//! Agent side: the bus port over one gateway connection.

use super::OUTBOUND_BUFFER;
use super::frame::{Frame, parse_topic};
use crate::bus::{
    adapters::memory::DEFAULT_TOPIC_CAPACITY,
    domain::Topic,
    ports::{CommandBus, CommandBusError, CommandBusResult, Subscription},
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Outcome of a subscribe request, as answered by the gateway.
type SubscribeReply = Result<(), String>;

/// Subscribes awaiting the gateway's answer, keyed by topic.
type Waiting = HashMap<Topic, Vec<oneshot::Sender<SubscribeReply>>>;

/// Topics this client receives and subscriptions awaiting confirmation.
///
/// `waiting` is `None` once the connection is gone.
struct ClientState {
    topics: Mutex<HashMap<Topic, broadcast::Sender<Arc<[u8]>>>>,
    waiting: Mutex<Option<Waiting>>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            waiting: Mutex::new(Some(HashMap::new())),
        }
    }
}

impl ClientState {
    fn deliver(&self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "dropping malformed gateway frame");
                return;
            }
        };
        match frame {
            Frame::Publish { topic, payload } => self.fan_out(&topic, payload),
            Frame::Subscribed { topic } => self.answer(&topic, &Ok(())),
            Frame::Rejected { topic, reason } => self.answer(&topic, &Err(reason)),
            Frame::Subscribe { .. } => warn!("dropping subscribe frame sent by gateway"),
        }
    }

    fn fan_out(&self, name: &str, payload: String) {
        let Ok(topic) = parse_topic(name) else {
            warn!(topic = name, "dropping payload on unknown topic");
            return;
        };
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = topics.get(&topic) else {
            debug!(%topic, "no local subscriber for payload");
            return;
        };
        if sender.send(Arc::from(payload.into_bytes())).is_err() {
            debug!(%topic, "local subscribers went away");
        }
    }

    fn answer(&self, name: &str, reply: &SubscribeReply) {
        let Ok(topic) = parse_topic(name) else {
            return;
        };
        let pending = self
            .waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .and_then(|waiting| waiting.remove(&topic))
            .unwrap_or_default();
        for waiter in pending {
            if waiter.send(reply.clone()).is_err() {
                debug!(%topic, "subscriber stopped waiting");
            }
        }
    }

    /// Closes every local subscription and fails pending subscribes.
    fn disconnect(&self) {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Bus port implementation that talks to a remote [`super::WebSocketGateway`].
///
/// Dropping the last clone closes the connection.
#[derive(Clone)]
pub struct WebSocketCommandBus {
    outbound: mpsc::Sender<Frame>,
    state: Arc<ClientState>,
}

impl WebSocketCommandBus {
    /// Connects to the gateway at `url` (`ws://host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`CommandBusError::Transport`] when the connection or
    /// handshake fails.
    pub async fn connect(url: &str) -> CommandBusResult<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(CommandBusError::transport)?;
        info!(url, "connected to bus gateway");
        let (mut writer, mut reader) = ws.split();
        let (outbound, mut pending) = mpsc::channel::<Frame>(OUTBOUND_BUFFER);
        let state = Arc::new(ClientState::default());

        tokio::spawn(async move {
            while let Some(frame) = pending.recv().await {
                let message = match frame.to_message() {
                    Ok(encoded) => encoded,
                    Err(err) => {
                        warn!(error = %err, "dropping unencodable frame");
                        continue;
                    }
                };
                if writer.send(message).await.is_err() {
                    break;
                }
            }
            if writer.close().await.is_err() {
                debug!("gateway connection already closed");
            }
        });

        let inbound = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Text(text)) => inbound.deliver(text.as_str()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "bus gateway connection failed");
                        break;
                    }
                }
            }
            inbound.disconnect();
            info!("disconnected from bus gateway");
        });

        Ok(Self { outbound, state })
    }

    async fn send(&self, frame: Frame) -> CommandBusResult<()> {
        self.outbound.send(frame).await.map_err(|_| closed())
    }
}

fn closed() -> CommandBusError {
    CommandBusError::transport(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "bus gateway connection closed",
    ))
}

#[async_trait]
impl CommandBus for WebSocketCommandBus {
    /// Hands the payload to the gateway. The remote receiver count is not
    /// reported back, so an accepted frame counts as one delivery.
    async fn publish(&self, topic: &Topic, payload: Vec<u8>) -> CommandBusResult<usize> {
        let frame = Frame::publish(topic, &payload).map_err(CommandBusError::transport)?;
        self.send(frame).await?;
        Ok(1)
    }

    async fn subscribe(&self, topic: &Topic) -> CommandBusResult<Subscription> {
        let receiver = self
            .state
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(DEFAULT_TOPIC_CAPACITY).0)
            .subscribe();
        let (reply, confirmed) = oneshot::channel();
        self.state
            .waiting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .ok_or_else(closed)?
            .entry(topic.clone())
            .or_default()
            .push(reply);
        self.send(Frame::subscribe(topic)).await?;
        match confirmed.await {
            Ok(Ok(())) => Ok(Subscription::new(topic.clone(), receiver)),
            Ok(Err(reason)) => Err(CommandBusError::transport(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("gateway rejected {topic}: {reason}"),
            ))),
            Err(_) => Err(closed()),
        }
    }
}
