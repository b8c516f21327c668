//! Worker-channel routes.
//!
//! Installed once per registered worker. Besides the room-ownership protocol
//! (`registerRoom`/`getRoom`), a worker's channel carries three kinds of
//! worker-originated traffic that the Coordinator must route onward: offer
//! requests and answer pushes toward a specific browser session, and
//! bridging packets toward the worker named in `target_id`.

use crate::coordinator::{Coordinator, ERROR_PAYLOAD};

use common::{RoomId, WorkerId};
use relay_protocol::{Channel, Packet, PacketKind};
use std::sync::Arc;
use tracing::warn;

pub(crate) fn route(coordinator: &Arc<Coordinator>, worker_id: &WorkerId, channel: &Channel) {
    channel.on(PacketKind::Heartbeat, |packet| async move { Some(packet) });

    // The one writer of the room-ownership map.
    let registry = Arc::clone(coordinator);
    let owner = worker_id.clone();
    channel.on(PacketKind::RegisterRoom, move |packet| {
        let coordinator = Arc::clone(&registry);
        let owner = owner.clone();
        async move {
            coordinator.record_room(RoomId::from(packet.data), owner);
            Some(Packet::new(PacketKind::RegisterRoom))
        }
    });

    // Owner lookup; an empty reply means "unknown, create it yourself".
    let registry = Arc::clone(coordinator);
    channel.on(PacketKind::GetRoom, move |packet| {
        let coordinator = Arc::clone(&registry);
        async move {
            let owner = coordinator
                .room_owner(&RoomId::from(packet.data))
                .map(|worker_id| worker_id.to_string())
                .unwrap_or_default();
            Some(Packet::with_data(PacketKind::GetRoom, owner))
        }
    });

    // Worker asks a specific browser for a fresh offer (bridging only); the
    // browser's reply travels back as this event's reply.
    let relay = Arc::clone(coordinator);
    channel.on(PacketKind::RequestOffer, move |packet| {
        let coordinator = Arc::clone(&relay);
        async move {
            let Some(browser) = coordinator.session_channel(&packet.session_id) else {
                warn!(
                    target: "coordinator.relay",
                    session_id = %packet.session_id,
                    "Offer requested for unknown session"
                );
                return Some(Packet::with_data(PacketKind::RequestOffer, ERROR_PAYLOAD));
            };
            match browser.request(packet).await {
                Ok(reply) => Some(reply),
                Err(err) => {
                    warn!(target: "coordinator.relay", error = %err, "Offer round trip failed");
                    Some(Packet::with_data(PacketKind::RequestOffer, ERROR_PAYLOAD))
                }
            }
        }
    });

    // Worker pushes an answer toward a browser; fire and forget.
    let relay = Arc::clone(coordinator);
    channel.on(PacketKind::Sdp, move |packet| {
        let coordinator = Arc::clone(&relay);
        async move {
            if let Some(browser) = coordinator.session_channel(&packet.session_id) {
                let _ = browser.notify(packet).await;
            }
            None
        }
    });

    // Bridging relays: packets stamped with a target worker are forwarded
    // there and the target's reply returned to the origin.
    for kind in [PacketKind::InitWebrtc, PacketKind::Start] {
        let relay = Arc::clone(coordinator);
        let origin = worker_id.clone();
        channel.on(kind, move |packet| {
            let coordinator = Arc::clone(&relay);
            let origin = origin.clone();
            async move { coordinator.relay_to_target(&origin, packet).await }
        });
    }
}
