//! Browser-channel routes.
//!
//! Installed once per admitted browser session. Heartbeats are answered
//! locally and ICE candidates accumulated; every room-scoped operation is a
//! synchronous relay to the session's assigned worker.

use crate::coordinator::Coordinator;

use common::SessionId;
use relay_protocol::{Channel, PacketKind};
use std::sync::Arc;

/// Packet kinds relayed verbatim to the session's worker.
const RELAYED_KINDS: [PacketKind; 5] = [
    PacketKind::InitWebrtc,
    PacketKind::Start,
    PacketKind::Save,
    PacketKind::Load,
    PacketKind::Quit,
];

pub(crate) fn route(coordinator: &Arc<Coordinator>, session_id: &SessionId, channel: &Channel) {
    channel.on(PacketKind::Heartbeat, |packet| async move { Some(packet) });

    let relay = Arc::clone(coordinator);
    let sid = session_id.clone();
    channel.on(PacketKind::IceCandidate, move |packet| {
        let coordinator = Arc::clone(&relay);
        let session_id = sid.clone();
        async move {
            coordinator.push_candidate(&session_id, packet.data);
            None
        }
    });

    for kind in RELAYED_KINDS {
        let relay = Arc::clone(coordinator);
        let sid = session_id.clone();
        channel.on(kind, move |packet| {
            let coordinator = Arc::clone(&relay);
            let session_id = sid.clone();
            async move { Some(coordinator.relay_to_worker(&session_id, packet).await) }
        });
    }
}
