//! End-to-end scenarios: a browser joining through the Coordinator onto a
//! real worker over in-memory channels.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use coordinator::{Coordinator, RandomSelector};
use relay_protocol::{Packet, PacketKind};
use support::{admit_browser, eventually, spawn_worker};

#[tokio::test]
async fn test_start_with_no_rooms_creates_and_registers_one() {
    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let worker = spawn_worker(&coordinator, "w1").await;
    let browser = admit_browser(&coordinator);

    // Signaling first: offer in, answer out.
    let sdp = browser
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, "browser-offer"))
        .await
        .unwrap();
    assert_eq!(sdp.kind, PacketKind::Sdp);
    assert_eq!(sdp.data, "w1-answer:browser-offer");

    // Join with no room id: the worker creates a room and replies with it.
    let reply = browser
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    assert_eq!(reply.kind, PacketKind::Start);
    assert!(!reply.room_id.is_empty());

    let room_id = reply.room_id.clone();
    let room = worker.worker.room(&room_id).expect("room should exist on the worker");
    assert!(room.is_running());
    assert_eq!(room.session_count(), 1);

    // Ownership lands in the registry via the worker's registerRoom event.
    let registry = std::sync::Arc::clone(&coordinator);
    let owner_of = room_id.clone();
    let expected = worker.id.clone();
    eventually(move || registry.room_owner(&owner_of) == Some(expected.clone())).await;
}

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let worker = spawn_worker(&coordinator, "w1").await;
    let browser = admit_browser(&coordinator);

    browser
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, "offer"))
        .await
        .unwrap();
    let started = browser
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    let room_id = started.room_id.clone();

    let saved = browser
        .channel
        .request(Packet::new(PacketKind::Save))
        .await
        .unwrap();
    assert_eq!(saved.kind, PacketKind::Save);
    assert_eq!(saved.data, "ok");
    assert!(worker.store.get(room_id.as_str()).is_some());

    let loaded = browser
        .channel
        .request(Packet::new(PacketKind::Load))
        .await
        .unwrap();
    assert_eq!(loaded.data, "ok");

    let director = worker.factory.director(&room_id).unwrap();
    assert_eq!(director.save_count(), 1);
    assert_eq!(director.load_count(), 1);
}

#[tokio::test]
async fn test_save_before_joining_any_room_errors_in_band() {
    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let _worker = spawn_worker(&coordinator, "w1").await;
    let browser = admit_browser(&coordinator);

    let reply = browser
        .channel
        .request(Packet::new(PacketKind::Save))
        .await
        .unwrap();
    assert_eq!(reply.kind, PacketKind::Save);
    assert_eq!(reply.data, "error");
}

#[tokio::test]
async fn test_heartbeat_is_echoed_to_the_browser() {
    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let _worker = spawn_worker(&coordinator, "w1").await;
    let browser = admit_browser(&coordinator);

    let reply = browser
        .channel
        .request(Packet::with_data(PacketKind::Heartbeat, "ping"))
        .await
        .unwrap();
    assert_eq!(reply.kind, PacketKind::Heartbeat);
    assert_eq!(reply.data, "ping");
}

#[tokio::test]
async fn test_second_player_joins_the_same_room() {
    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let worker = spawn_worker(&coordinator, "w1").await;

    let player_one = admit_browser(&coordinator);
    player_one
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, "offer-1"))
        .await
        .unwrap();
    let started = player_one
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    let room_id = started.room_id.clone();

    let player_two = admit_browser(&coordinator);
    player_two
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, "offer-2"))
        .await
        .unwrap();
    let mut join = Packet::with_data(PacketKind::Start, "game.rom").in_room(room_id.clone());
    join.player_index = 2;
    let joined = player_two.channel.request(join).await.unwrap();
    assert_eq!(joined.room_id, room_id);

    let room = worker.worker.room(&room_id).unwrap();
    assert_eq!(room.session_count(), 2);
    // One room total: the second start reused it.
    assert_eq!(worker.worker.room_count(), 1);
}

#[tokio::test]
async fn test_quit_detaches_and_the_room_self_terminates() {
    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let worker = spawn_worker(&coordinator, "w1").await;
    let browser = admit_browser(&coordinator);

    browser
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, "offer"))
        .await
        .unwrap();
    let started = browser
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    let room_id = started.room_id.clone();
    let director = worker.factory.director(&room_id).unwrap();

    let reply = browser
        .channel
        .request(Packet::new(PacketKind::Quit))
        .await
        .unwrap();
    assert_eq!(reply.data, "ok");

    let probe = std::sync::Arc::clone(&worker.worker);
    let gone = room_id.clone();
    eventually(move || probe.room(&gone).is_none()).await;
    assert_eq!(director.stop_count(), 1);
}

#[tokio::test]
async fn test_browser_disconnect_cleans_up_its_session() {
    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let worker = spawn_worker(&coordinator, "w1").await;
    let browser = admit_browser(&coordinator);

    browser
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, "offer"))
        .await
        .unwrap();
    let started = browser
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    let room_id = started.room_id.clone();

    // The browser vanishes without a quit; the Coordinator notices the dead
    // channel and tells the worker to terminate the session.
    let session_id = browser.session_id.clone();
    browser.channel.close();
    drop(browser);

    let probe = std::sync::Arc::clone(&worker.worker);
    let gone = room_id.clone();
    eventually(move || probe.room(&gone).is_none()).await;

    let registry = std::sync::Arc::clone(&coordinator);
    eventually(move || registry.session_worker(&session_id).is_none()).await;
}

#[tokio::test]
async fn test_start_on_a_dead_room_id_creates_a_fresh_room() {
    let coordinator = Coordinator::new(Box::new(RandomSelector::new()));
    let worker = spawn_worker(&coordinator, "w1").await;

    let browser = admit_browser(&coordinator);
    browser
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, "offer"))
        .await
        .unwrap();
    let started = browser
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom"))
        .await
        .unwrap();
    let room_id = started.room_id.clone();
    let director = worker.factory.director(&room_id).unwrap();

    // Kill the room.
    let quit = browser.channel.request(Packet::new(PacketKind::Quit)).await.unwrap();
    assert_eq!(quit.data, "ok");
    let probe = std::sync::Arc::clone(&worker.worker);
    let gone = room_id.clone();
    eventually(move || probe.room(&gone).is_none()).await;

    // A new join naming the dead id gets a fresh room instance; the old
    // terminated one is never resurrected.
    let rejoin_browser = admit_browser(&coordinator);
    rejoin_browser
        .channel
        .request(Packet::with_data(PacketKind::InitWebrtc, "offer-2"))
        .await
        .unwrap();
    let rejoined = rejoin_browser
        .channel
        .request(Packet::with_data(PacketKind::Start, "game.rom").in_room(room_id.clone()))
        .await
        .unwrap();
    assert_eq!(rejoined.room_id, room_id);

    let room = worker.worker.room(&rejoined.room_id).unwrap();
    assert!(room.is_running());
    assert_eq!(room.session_count(), 1);
    // The fresh room runs on a fresh emulator instance.
    assert_eq!(director.stop_count(), 1);
}
