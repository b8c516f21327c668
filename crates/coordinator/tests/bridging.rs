//! Cross-worker bridging: a browser placed on one worker joining a room
//! owned by another.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use coordinator::Coordinator;
use relay_protocol::{Packet, PacketKind};
use std::sync::Arc;
use std::time::Duration;
use support::{admit_browser, eventually, spawn_worker, PinnedSelector, TestBrowser};
use tokio::time::timeout;

/// Admit a browser on the pinned worker and complete its signaling, then
/// return it together with a drain of sdp events pushed to it.
async fn signaled_browser(
    coordinator: &Arc<Coordinator>,
    offer: &str,
) -> (TestBrowser, tokio::sync::mpsc::UnboundedReceiver<String>) {
    let browser = admit_browser(coordinator);

    let (sdp_tx, sdp_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    browser.channel.on(PacketKind::Sdp, move |packet| {
        let sdp_tx = sdp_tx.clone();
        async move {
            let _ = sdp_tx.send(packet.data);
            None
        }
    });

    let answer = browser
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, offer))
        .await
        .unwrap();
    assert_eq!(answer.kind, PacketKind::Sdp);

    (browser, sdp_rx)
}

#[tokio::test]
async fn test_browser_on_one_worker_joins_room_owned_by_another() {
    let selector = PinnedSelector::new();
    let coordinator = Coordinator::new(Box::new(Arc::clone(&selector)));

    let owner = spawn_worker(&coordinator, "w1").await;
    let visitor_host = spawn_worker(&coordinator, "w2").await;

    // Player one lands on w1 and creates the room there.
    selector.pin(owner.id.clone());
    let (player_one, _sdp_one) = signaled_browser(&coordinator, "offer-1").await;
    let started = player_one
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    let room_id = started.room_id.clone();
    assert!(owner.worker.room(&room_id).is_some());

    let registry = Arc::clone(&coordinator);
    let owned = room_id.clone();
    let expected = owner.id.clone();
    eventually(move || registry.room_owner(&owned) == Some(expected.clone())).await;

    // Player two lands on w2 and asks for w1's room.
    selector.pin(visitor_host.id.clone());
    let (player_two, mut sdp_two) = signaled_browser(&coordinator, "offer-2").await;

    // During bridging, the origin worker asks this browser for a fresh offer.
    player_two.channel.on(PacketKind::RequestOffer, |_packet| async move {
        Some(Packet::with_data(PacketKind::RequestOffer, "fresh-offer"))
    });

    let mut join = Packet::with_data(PacketKind::Start, "game.rom").in_room(room_id.clone());
    join.player_index = 2;
    let joined = player_two.channel.request(join).await.unwrap();

    // The ack names the owner's room, and the answer the browser received
    // mid-bridge came from the owner's transport, not w2's.
    assert_eq!(joined.kind, PacketKind::Start);
    assert_eq!(joined.room_id, room_id);
    let bridged_answer = timeout(Duration::from_secs(1), sdp_two.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bridged_answer, "w1-answer:fresh-offer");

    // The peer session ended up attached on w1; w2 hosts nothing.
    let room = owner.worker.room(&room_id).unwrap();
    assert_eq!(room.session_count(), 2);
    assert!(owner.connector.take_rig(&player_two.session_id).is_some());
    assert_eq!(visitor_host.worker.room_count(), 0);
}

#[tokio::test]
async fn test_bridged_join_retry_is_idempotent() {
    let selector = PinnedSelector::new();
    let coordinator = Coordinator::new(Box::new(Arc::clone(&selector)));

    let owner = spawn_worker(&coordinator, "w1").await;
    let visitor_host = spawn_worker(&coordinator, "w2").await;

    selector.pin(owner.id.clone());
    let (player_one, _sdp) = signaled_browser(&coordinator, "offer-1").await;
    let started = player_one
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    let room_id = started.room_id.clone();

    let registry = Arc::clone(&coordinator);
    let owned = room_id.clone();
    let expected = owner.id.clone();
    eventually(move || registry.room_owner(&owned) == Some(expected.clone())).await;

    selector.pin(visitor_host.id.clone());
    let (player_two, _sdp_two) = signaled_browser(&coordinator, "offer-2").await;
    player_two.channel.on(PacketKind::RequestOffer, |_packet| async move {
        Some(Packet::with_data(PacketKind::RequestOffer, "fresh-offer"))
    });

    let mut join = Packet::with_data(PacketKind::Start, "game.rom").in_room(room_id.clone());
    join.player_index = 2;
    let first = player_two.channel.request(join.clone()).await.unwrap();
    assert_eq!(first.room_id, room_id);

    let room = owner.worker.room(&room_id).unwrap();
    assert_eq!(room.session_count(), 2);

    // The browser retries the whole join; the room must not grow.
    let second = player_two.channel.request(join).await.unwrap();
    assert_eq!(second.room_id, room_id);
    assert_eq!(room.session_count(), 2);
}

#[tokio::test]
async fn test_requested_room_unknown_to_registry_is_created_locally() {
    let selector = PinnedSelector::new();
    let coordinator = Coordinator::new(Box::new(Arc::clone(&selector)));

    let _other = spawn_worker(&coordinator, "w1").await;
    let host = spawn_worker(&coordinator, "w2").await;

    selector.pin(host.id.clone());
    let (browser, _sdp) = signaled_browser(&coordinator, "offer").await;

    let reply = browser
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom").in_room("room-nobody-owns".into()))
        .await
        .unwrap();

    // No owner on record, so the assigned worker creates the room itself.
    assert_eq!(reply.room_id.as_str(), "room-nobody-owns");
    assert!(host.worker.room(&reply.room_id).is_some());

    let registry = Arc::clone(&coordinator);
    let room_id = reply.room_id.clone();
    let expected = host.id.clone();
    eventually(move || registry.room_owner(&room_id) == Some(expected.clone())).await;
}

#[tokio::test]
async fn test_bridge_to_a_dead_owner_fails_in_band() {
    let selector = PinnedSelector::new();
    let coordinator = Coordinator::new(Box::new(Arc::clone(&selector)));

    let owner = spawn_worker(&coordinator, "w1").await;
    let visitor_host = spawn_worker(&coordinator, "w2").await;

    selector.pin(owner.id.clone());
    let (player_one, _sdp) = signaled_browser(&coordinator, "offer-1").await;
    let started = player_one
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    let room_id = started.room_id.clone();

    let registry = Arc::clone(&coordinator);
    let owned = room_id.clone();
    eventually(move || registry.room_owner(&owned).is_some()).await;

    selector.pin(visitor_host.id.clone());
    let (player_two, _sdp_two) = signaled_browser(&coordinator, "offer-2").await;
    player_two.channel.on(PacketKind::RequestOffer, |_packet| async move {
        Some(Packet::with_data(PacketKind::RequestOffer, "fresh-offer"))
    });

    // The owner dies after registering the room but before the bridge. The
    // registry drops its rooms, so the join lands locally on w2 instead of
    // hanging the browser.
    owner.kill();
    let registry = Arc::clone(&coordinator);
    eventually(move || registry.worker_count() == 1).await;

    let joined = player_two
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom").in_room(room_id.clone()))
        .await
        .unwrap();
    assert_eq!(joined.room_id, room_id);
    assert!(visitor_host.worker.room(&room_id).is_some());
}
