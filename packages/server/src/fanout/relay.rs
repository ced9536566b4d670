//! Relay task: broker topic → local connections of one room.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    connection::{ConnectionHandle, ConnectionId, close_code},
    registry::{RelayHandle, RelayId, RoomRegistry},
};
use crate::{
    config::SenderEcho,
    domain::{BrokerError, BrokerSubscription, MessageBroker, RoomId, room_topic},
    infrastructure::dto::{broker::BroadcastEnvelope, websocket::OutgoingChatMessage},
};

/// Everything a relay task needs.
#[derive(Clone)]
pub struct RelayContext {
    pub room_id: RoomId,
    pub registry: Arc<RoomRegistry>,
    pub broker: Arc<dyn MessageBroker>,
    pub echo: SenderEcho,
    /// Id of this server process, compared with envelope origins.
    pub instance_id: Uuid,
}

/// Outcome of delivering one frame to a room snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: Vec<ConnectionId>,
}

/// Subscribe to the room topic and spawn the relay.
///
/// The subscription is open when this returns, so anything published
/// afterwards reaches the relay.
pub async fn start_relay(ctx: RelayContext) -> Result<RelayHandle, BrokerError> {
    let topic = room_topic(ctx.room_id);
    let subscription = ctx.broker.subscribe(&topic).await?;

    let id = RelayId::next();
    let token = CancellationToken::new();
    let task = tokio::spawn(run_relay(ctx, id, subscription, token.clone()));
    tracing::info!("Relay started on '{}'", topic);

    Ok(RelayHandle::new(id, token, task))
}

async fn run_relay(
    ctx: RelayContext,
    relay_id: RelayId,
    mut subscription: Box<dyn BrokerSubscription>,
    token: CancellationToken,
) {
    let failure = loop {
        let payload = tokio::select! {
            biased;
            _ = token.cancelled() => break None,
            received = subscription.recv() => match received {
                Ok(payload) => payload,
                Err(e) => break Some(e),
            },
        };

        let envelope = match BroadcastEnvelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Skipping malformed payload on chat {}: {}", ctx.room_id, e);
                continue;
            }
        };
        if envelope.chat_id != ctx.room_id.value() {
            tracing::warn!(
                "Skipping payload for chat {} received on chat {}",
                envelope.chat_id,
                ctx.room_id
            );
            continue;
        }
        let frame = match serde_json::to_string(&OutgoingChatMessage::from(&envelope)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to encode frame for chat {}: {}", ctx.room_id, e);
                continue;
            }
        };

        let targets = tokio::select! {
            biased;
            _ = token.cancelled() => break None,
            targets = ctx.registry.snapshot(ctx.room_id) => targets,
        };

        let report = fan_out(&targets, &envelope, &frame, ctx.echo, ctx.instance_id);
        tracing::debug!(
            "Relayed message {} on chat {}: {} delivered, {} skipped, {} failed",
            envelope.id,
            ctx.room_id,
            report.delivered,
            report.skipped,
            report.failed.len()
        );
    };

    subscription.unsubscribe().await;

    match failure {
        None => tracing::info!("Relay on '{}' stopped", subscription.topic()),
        Some(e) => {
            tracing::error!(
                "Relay for chat {} lost its subscription to '{}': {}",
                ctx.room_id,
                subscription.topic(),
                e
            );
            let evicted = tokio::select! {
                biased;
                _ = token.cancelled() => Vec::new(),
                evicted = ctx.registry.evict(ctx.room_id, relay_id) => evicted,
            };
            for handle in &evicted {
                handle.close(close_code::TRY_AGAIN_LATER, "room relay unavailable");
            }
        }
    }
}

fn is_origin(envelope: &BroadcastEnvelope, handle: &ConnectionHandle, instance_id: Uuid) -> bool {
    envelope.origin.is_some_and(|origin| {
        origin.instance_id == instance_id && origin.connection_id == handle.id().value()
    })
}

/// Push `frame` to every target.
///
/// Deliveries are independent: a failed push marks only that connection as
/// closed.
pub fn fan_out(
    targets: &[ConnectionHandle],
    envelope: &BroadcastEnvelope,
    frame: &str,
    echo: SenderEcho,
    instance_id: Uuid,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for handle in targets {
        if echo == SenderEcho::Exclude && is_origin(envelope, handle, instance_id) {
            report.skipped += 1;
            continue;
        }
        if !handle.is_alive() {
            // 既に閉じた接続は自身の leave を待っている
            tracing::debug!("Skipping closed connection {}", handle.id());
            handle.mark_closed();
            report.failed.push(handle.id());
            continue;
        }
        match handle.push(frame) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::warn!("Dropping connection {}: {}", handle.id(), e);
                handle.mark_closed();
                report.failed.push(handle.id());
            }
        }
    }

    report
}
