//! Server side: bridges remote connections onto a local bus.

use super::OUTBOUND_BUFFER;
use super::frame::{Frame, parse_topic};
use crate::bus::{
    domain::Topic,
    ports::{CommandBus, Subscription},
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accepts agent connections and relays their frames to and from `bus`.
pub struct WebSocketGateway<B>
where
    B: CommandBus + 'static,
{
    listener: TcpListener,
    bus: Arc<B>,
}

impl<B> WebSocketGateway<B>
where
    B: CommandBus + 'static,
{
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns the bind failure.
    pub async fn bind(addr: &str, bus: Arc<B>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, bus })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns the socket error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until cancelled. Open connections are closed
    /// with it.
    pub async fn run(self, cancel: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "bus gateway listening");
        }
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        let connection = Connection {
                            bus: Arc::clone(&self.bus),
                            peer,
                            cancel: cancel.child_token(),
                        };
                        tokio::spawn(connection.serve(socket));
                    }
                    Err(err) => warn!(error = %err, "bus gateway accept failed"),
                },
            }
        }
        info!("bus gateway stopped");
    }
}

/// One remote client.
struct Connection<B>
where
    B: CommandBus + 'static,
{
    bus: Arc<B>,
    peer: SocketAddr,
    cancel: CancellationToken,
}

impl<B> Connection<B>
where
    B: CommandBus + 'static,
{
    async fn serve(self, socket: TcpStream) {
        let ws = match tokio_tungstenite::accept_async(socket).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(peer = %self.peer, error = %err, "bus client handshake failed");
                return;
            }
        };
        debug!(peer = %self.peer, "bus client connected");
        let (mut writer, mut reader) = ws.split();
        let (outbound, mut pending) = mpsc::channel::<Frame>(OUTBOUND_BUFFER);
        let mut opened = HashSet::new();

        loop {
            let frame = tokio::select! {
                () = self.cancel.cancelled() => break,
                Some(frame) = pending.recv() => frame,
                incoming = reader.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match self.handle(text.as_str(), &outbound, &mut opened).await {
                            Some(reply) => reply,
                            None => continue,
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        debug!(peer = %self.peer, error = %err, "bus client read failed");
                        break;
                    }
                },
            };
            let message = match frame.to_message() {
                Ok(encoded) => encoded,
                Err(err) => {
                    warn!(peer = %self.peer, error = %err, "dropping unencodable frame");
                    continue;
                }
            };
            if writer.send(message).await.is_err() {
                break;
            }
        }

        // Ends the forwarders so the bus stops counting this client.
        self.cancel.cancel();
        if writer.close().await.is_err() {
            debug!(peer = %self.peer, "bus client already gone");
        }
        debug!(peer = %self.peer, topics = opened.len(), "bus client disconnected");
    }

    /// Acts on one client frame and returns the reply, if any.
    async fn handle(
        &self,
        text: &str,
        outbound: &mpsc::Sender<Frame>,
        opened: &mut HashSet<Topic>,
    ) -> Option<Frame> {
        let frame = match Frame::decode(text) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(peer = %self.peer, error = %err, "dropping malformed frame");
                return None;
            }
        };
        match frame {
            Frame::Subscribe { topic } => match self.open(&topic, outbound, opened).await {
                Ok(()) => Some(Frame::Subscribed { topic }),
                Err(reason) => {
                    warn!(peer = %self.peer, topic, reason, "subscription rejected");
                    Some(Frame::Rejected { topic, reason })
                }
            },
            Frame::Publish { topic, payload } => {
                match parse_topic(&topic) {
                    Ok(target) => {
                        if let Err(err) = self.bus.publish(&target, payload.into_bytes()).await {
                            warn!(peer = %self.peer, topic = %target, error = %err, "relaying publish failed");
                        }
                    }
                    Err(err) => warn!(peer = %self.peer, error = %err, "dropping publish"),
                }
                None
            }
            Frame::Subscribed { .. } | Frame::Rejected { .. } => {
                warn!(peer = %self.peer, "dropping gateway-only frame sent by client");
                None
            }
        }
    }

    /// Subscribes on the local bus once per topic and connection.
    async fn open(
        &self,
        name: &str,
        outbound: &mpsc::Sender<Frame>,
        opened: &mut HashSet<Topic>,
    ) -> Result<(), String> {
        let topic = parse_topic(name).map_err(|err| err.to_string())?;
        if opened.contains(&topic) {
            return Ok(());
        }
        let subscription = self
            .bus
            .subscribe(&topic)
            .await
            .map_err(|err| err.to_string())?;
        opened.insert(topic);
        tokio::spawn(forward(subscription, outbound.clone(), self.cancel.clone()));
        Ok(())
    }
}

/// Copies payloads from a local subscription to the client until the
/// connection ends.
async fn forward(
    mut subscription: Subscription,
    outbound: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            payload = subscription.recv() => payload,
        };
        let Some(payload) = received else {
            break;
        };
        match Frame::publish(subscription.topic(), &payload) {
            Ok(frame) => {
                if outbound.send(frame).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(topic = %subscription.topic(), error = %err, "dropping payload for remote subscriber");
            }
        }
    }
}
