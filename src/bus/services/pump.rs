//! Fan-out of agent events to reconciliation shards.
//!
//! Events for the same stream (status) or the same agent (heartbeat) always
//! land on the same shard, so each key is processed in arrival order while
//! different keys proceed in parallel.

use crate::bus::{
    domain::{AgentEvent, Topic, WireError},
    ports::{CommandBus, CommandBusResult, Subscription},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-shard channel depth.
const SHARD_BUFFER: usize = 256;

/// Picks the shard for `key` out of `shards`.
#[must_use]
pub fn shard_for(key: Uuid, shards: usize) -> usize {
    let Ok(count) = u128::try_from(shards) else {
        return 0;
    };
    key.as_u128()
        .checked_rem(count)
        .and_then(|index| usize::try_from(index).ok())
        .unwrap_or(0)
}

/// Subscribes to the shared status and heartbeat topics and routes decoded
/// events to a fixed set of shard channels.
pub struct EventPump {
    status: Subscription,
    heartbeat: Subscription,
    shards: Vec<mpsc::Sender<AgentEvent>>,
}

impl EventPump {
    /// Subscribes to the agent event topics and creates `shard_count`
    /// channels, returning the pump and the shard receivers.
    ///
    /// # Errors
    ///
    /// Returns the transport error when subscribing fails.
    pub async fn connect<B>(
        bus: &B,
        shard_count: usize,
    ) -> CommandBusResult<(Self, Vec<mpsc::Receiver<AgentEvent>>)>
    where
        B: CommandBus + ?Sized,
    {
        let status = bus.subscribe(&Topic::status()).await?;
        let heartbeat = bus.subscribe(&Topic::heartbeat()).await?;
        let (senders, receivers) = (0..shard_count.max(1))
            .map(|_| mpsc::channel(SHARD_BUFFER))
            .unzip();
        Ok((
            Self {
                status,
                heartbeat,
                shards: senders,
            },
            receivers,
        ))
    }

    /// Routes events until cancelled or both topics close.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(shards = self.shards.len(), "event pump started");
        loop {
            let decoded = tokio::select! {
                () = cancel.cancelled() => break,
                payload = self.status.recv() => match payload {
                    Some(bytes) => AgentEvent::decode_status(&bytes),
                    None => break,
                },
                payload = self.heartbeat.recv() => match payload {
                    Some(bytes) => AgentEvent::decode_heartbeat(&bytes),
                    None => break,
                },
            };
            if !self.route(decoded).await {
                break;
            }
        }
        info!("event pump stopped");
    }

    async fn route(&self, decoded: Result<AgentEvent, WireError>) -> bool {
        let event = match decoded {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "dropping malformed agent event");
                return true;
            }
        };
        let index = shard_for(event.routing_key(), self.shards.len());
        let Some(shard) = self.shards.get(index) else {
            return false;
        };
        if shard.send(event).await.is_err() {
            warn!(shard = index, "reconciliation shard closed");
            return false;
        }
        true
    }
}
