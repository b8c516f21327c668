//! The worker service.
//!
//! A worker holds one persistent channel to the Coordinator. Everything a
//! browser does arrives over that channel as a relayed packet stamped with
//! the browser's session id; the worker keeps a small per-session record
//! (pending peer connection, joined room) and owns the rooms it created.
//!
//! The one multi-hop operation is bridging: when a browser relayed to this
//! worker asks to join a room owned by a different worker, this worker
//! shuttles a fresh offer/answer exchange and a start directive to the owner
//! through the Coordinator, and the peer session ends up attached on the
//! owner's side.

use crate::emulator::DirectorFactory;
use crate::errors::WorkerError;
use crate::peer::{PeerConnector, PeerSession};
use crate::room::Room;
use crate::storage::SaveStore;

use common::{RoomId, SessionId, WorkerId};
use relay_protocol::{Channel, Packet, PacketKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// In-band payload for an operation that succeeded.
const OK_PAYLOAD: &str = "ok";
/// In-band payload for an operation that failed application-side.
const ERROR_PAYLOAD: &str = "error";

/// Worker-side record of one relayed browser session.
#[derive(Default)]
struct BrowserSession {
    /// Room this session has joined, empty until the first `start`.
    room_id: RoomId,
    /// Peer connection established by `initwebrtc`, waiting to be attached.
    peer: Option<Arc<PeerSession>>,
    /// ICE candidates accumulated for this session.
    ice_candidates: Vec<String>,
}

struct WorkerState {
    /// Identity assigned by the Coordinator at registration.
    id: WorkerId,
    rooms: HashMap<RoomId, Arc<Room>>,
    sessions: HashMap<SessionId, BrowserSession>,
}

/// One worker process: rooms it owns plus the browser sessions relayed to it.
pub struct Worker {
    state: Mutex<WorkerState>,
    connector: Arc<dyn PeerConnector>,
    directors: Arc<dyn DirectorFactory>,
    store: Arc<dyn SaveStore>,
}

impl Worker {
    /// Build a worker around its three collaborators.
    #[must_use]
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        directors: Arc<dyn DirectorFactory>,
        store: Arc<dyn SaveStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(WorkerState {
                id: WorkerId::default(),
                rooms: HashMap::new(),
                sessions: HashMap::new(),
            }),
            connector,
            directors,
            store,
        })
    }

    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// This worker's Coordinator-assigned id; empty before registration.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.lock().id.clone()
    }

    /// Look up a live room by id.
    #[must_use]
    pub fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.lock().rooms.get(room_id).cloned()
    }

    /// Number of rooms currently hosted here.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    /// Register this worker's handlers on a freshly established Coordinator
    /// channel. Called once per (re)connect.
    ///
    /// Note: no `heartbeat` handler on purpose. The Coordinator echoes our
    /// heartbeats; an echo handler here would bounce them back forever.
    pub fn attach_coordinator(self: &Arc<Self>, channel: &Channel) {
        let worker = Arc::clone(self);
        channel.on(PacketKind::WorkerAssign, move |packet| {
            let worker = Arc::clone(&worker);
            async move { worker.handle_assign(&packet) }
        });

        let worker = Arc::clone(self);
        channel.on(PacketKind::IceCandidate, move |packet| {
            let worker = Arc::clone(&worker);
            async move { worker.handle_ice_candidate(packet) }
        });

        let worker = Arc::clone(self);
        channel.on(PacketKind::InitWebrtc, move |packet| {
            let worker = Arc::clone(&worker);
            async move { worker.handle_init_webrtc(&packet) }
        });

        let worker = Arc::clone(self);
        let start_channel = channel.clone();
        channel.on(PacketKind::Start, move |packet| {
            let worker = Arc::clone(&worker);
            let channel = start_channel.clone();
            async move { Some(worker.handle_start(&channel, packet).await) }
        });

        let worker = Arc::clone(self);
        channel.on(PacketKind::Save, move |packet| {
            let worker = Arc::clone(&worker);
            async move { Some(worker.handle_save(&packet)) }
        });

        let worker = Arc::clone(self);
        channel.on(PacketKind::Load, move |packet| {
            let worker = Arc::clone(&worker);
            async move { Some(worker.handle_load(&packet)) }
        });

        let worker = Arc::clone(self);
        channel.on(PacketKind::Quit, move |packet| {
            let worker = Arc::clone(&worker);
            async move {
                worker.cleanup_session(&packet.session_id);
                Some(Packet::with_data(PacketKind::Quit, OK_PAYLOAD))
            }
        });

        let worker = Arc::clone(self);
        channel.on(PacketKind::TerminateSession, move |packet| {
            let worker = Arc::clone(&worker);
            async move {
                worker.cleanup_session(&packet.session_id);
                None
            }
        });
    }

    fn handle_assign(&self, packet: &Packet) -> Option<Packet> {
        let id = WorkerId::from(packet.data.as_str());
        info!(target: "worker", worker_id = %id, "Assigned worker id by Coordinator");
        self.lock().id = id;
        None
    }

    fn handle_ice_candidate(&self, packet: Packet) -> Option<Packet> {
        let mut state = self.lock();
        state
            .sessions
            .entry(packet.session_id)
            .or_default()
            .ice_candidates
            .push(packet.data);
        None
    }

    /// Consume a browser's offer and answer with our local description. The
    /// resulting peer connection waits in the session record until `start`
    /// attaches it to a room. A retried offer replaces the pending peer.
    fn handle_init_webrtc(&self, packet: &Packet) -> Option<Packet> {
        match self
            .connector
            .start_as_offeree(&packet.session_id, &packet.data)
        {
            Ok((answer, peer)) => {
                let mut state = self.lock();
                state
                    .sessions
                    .entry(packet.session_id.clone())
                    .or_default()
                    .peer = Some(Arc::new(peer));
                Some(Packet::with_data(PacketKind::Sdp, answer))
            }
            Err(err) => {
                warn!(
                    target: "worker",
                    session_id = %packet.session_id,
                    error = %err,
                    "Peer signaling failed"
                );
                Some(Packet::with_data(PacketKind::Sdp, ERROR_PAYLOAD))
            }
        }
    }

    /// Join or create a room for this session.
    ///
    /// Three shapes:
    /// - a packet stamped with a `target_id` is the tail of a bridge: another
    ///   worker's browser joining a room that lives here;
    /// - a requested room owned by some other worker starts a bridge from
    ///   here toward the owner;
    /// - everything else is a plain local join-or-create.
    async fn handle_start(self: &Arc<Self>, channel: &Channel, packet: Packet) -> Packet {
        let session_id = packet.session_id.clone();
        let player_index = packet.player_index.max(1);
        let game = packet.data.clone();

        if !packet.target_worker_id.is_empty() {
            return self.join_existing(&session_id, &packet.room_id, player_index);
        }

        if !packet.room_id.is_empty() {
            match channel
                .request(Packet::with_data(PacketKind::GetRoom, packet.room_id.as_str()))
                .await
            {
                Ok(reply) if !reply.data.is_empty() => {
                    let owner = WorkerId::from(reply.data);
                    if owner != self.id() {
                        return self
                            .bridge(channel, &session_id, &game, &packet.room_id, player_index, owner)
                            .await;
                    }
                }
                Ok(_) => {
                    // Unknown room: create it here.
                }
                Err(err) => {
                    warn!(
                        target: "worker",
                        room_id = %packet.room_id,
                        error = %err,
                        "Room lookup failed, joining locally"
                    );
                }
            }
        }

        self.join_local(channel, &session_id, &game, packet.room_id, player_index)
            .await
    }

    /// Plain local join: reuse a running room with this id or create one.
    async fn join_local(
        self: &Arc<Self>,
        channel: &Channel,
        session_id: &SessionId,
        game: &str,
        room_id: RoomId,
        player_index: u8,
    ) -> Packet {
        let existing = if room_id.is_empty() {
            None
        } else {
            self.room(&room_id).filter(|room| room.is_running())
        };

        let room = match existing {
            Some(room) => room,
            None => match self.create_room(room_id, game) {
                Ok(room) => room,
                Err(err) => {
                    warn!(target: "worker", error = %err, "Room creation failed");
                    return Packet::with_data(PacketKind::Start, ERROR_PAYLOAD);
                }
            },
        };

        if let Err(err) = self.attach_session(session_id, &room, player_index) {
            warn!(
                target: "worker",
                session_id = %session_id,
                room_id = %room.id(),
                error = %err,
                "Join failed"
            );
            return Packet::with_data(PacketKind::Start, ERROR_PAYLOAD);
        }

        // Ownership is global state: the Coordinator only learns who owns a
        // room from this event.
        let register = Packet::with_data(PacketKind::RegisterRoom, room.id().as_str());
        if let Err(err) = channel.notify(register).await {
            warn!(target: "worker", error = %err, "Failed to register room with Coordinator");
        }

        Packet::new(PacketKind::Start).in_room(room.id().clone())
    }

    /// Tail of a bridge: attach this session's pending peer to a room that
    /// already lives here. Never creates a room, and an already-attached
    /// peer acknowledges idempotently so bridge retries are harmless.
    fn join_existing(&self, session_id: &SessionId, room_id: &RoomId, player_index: u8) -> Packet {
        let Some(room) = self.room(room_id) else {
            warn!(
                target: "worker",
                room_id = %room_id,
                "Bridge join for a room not hosted here"
            );
            return Packet::with_data(PacketKind::Start, ERROR_PAYLOAD);
        };

        match self.attach_session(session_id, &room, player_index) {
            Ok(()) => Packet::new(PacketKind::Start).in_room(room.id().clone()),
            Err(err) => {
                warn!(
                    target: "worker",
                    session_id = %session_id,
                    room_id = %room_id,
                    error = %err,
                    "Bridge join failed"
                );
                Packet::with_data(PacketKind::Start, ERROR_PAYLOAD)
            }
        }
    }

    /// Origin side of a bridge: the target room lives on `owner`, so shuttle
    /// signaling between our browser and the owner through the Coordinator,
    /// then direct the owner to start.
    async fn bridge(
        &self,
        channel: &Channel,
        session_id: &SessionId,
        game: &str,
        room_id: &RoomId,
        player_index: u8,
        owner: WorkerId,
    ) -> Packet {
        info!(
            target: "worker.bridge",
            session_id = %session_id,
            room_id = %room_id,
            owner = %owner,
            "Bridging join to owning worker"
        );

        // A fresh offer from the browser; the one it sent us belongs to a
        // peer connection that would terminate here, not on the owner.
        let offer = match channel
            .request(Packet::new(PacketKind::RequestOffer).for_session(session_id.clone()))
            .await
        {
            Ok(reply) => reply.data,
            Err(err) => {
                warn!(target: "worker.bridge", error = %err, "Offer request failed");
                return Packet::with_data(PacketKind::Start, ERROR_PAYLOAD);
            }
        };

        // Offer over to the owner; its answer comes back the same way.
        let answer = match channel
            .request(
                Packet::with_data(PacketKind::InitWebrtc, offer)
                    .for_session(session_id.clone())
                    .to_worker(owner.clone()),
            )
            .await
        {
            Ok(reply) => reply.data,
            Err(err) => {
                warn!(target: "worker.bridge", error = %err, "Offer relay failed");
                return Packet::with_data(PacketKind::Start, ERROR_PAYLOAD);
            }
        };

        // The browser consumes the owner's answer as a normal sdp event.
        let sdp = Packet::with_data(PacketKind::Sdp, answer).for_session(session_id.clone());
        if let Err(err) = channel.notify(sdp).await {
            warn!(target: "worker.bridge", error = %err, "Answer push failed");
            return Packet::with_data(PacketKind::Start, ERROR_PAYLOAD);
        }

        // Tell the owner to attach the freshly signaled peer to the room.
        let start = Packet {
            kind: PacketKind::Start,
            data: game.to_string(),
            room_id: room_id.clone(),
            player_index,
            target_worker_id: owner,
            session_id: session_id.clone(),
            ..Packet::default()
        };
        match channel.request(start).await {
            Ok(ack) => {
                if !ack.room_id.is_empty() {
                    let mut state = self.lock();
                    state
                        .sessions
                        .entry(session_id.clone())
                        .or_default()
                        .room_id = ack.room_id.clone();
                }
                ack
            }
            Err(err) => {
                warn!(target: "worker.bridge", error = %err, "Bridged start failed");
                Packet::with_data(PacketKind::Start, ERROR_PAYLOAD)
            }
        }
    }

    fn handle_save(&self, packet: &Packet) -> Packet {
        let outcome = self
            .session_room(packet)
            .and_then(|room| room.save_state(&*self.store));
        match outcome {
            Ok(()) => Packet::with_data(PacketKind::Save, OK_PAYLOAD),
            Err(err) => {
                warn!(target: "worker", session_id = %packet.session_id, error = %err, "Save failed");
                Packet::with_data(PacketKind::Save, ERROR_PAYLOAD)
            }
        }
    }

    fn handle_load(&self, packet: &Packet) -> Packet {
        let outcome = self
            .session_room(packet)
            .and_then(|room| room.load_state());
        match outcome {
            Ok(()) => Packet::with_data(PacketKind::Load, OK_PAYLOAD),
            Err(err) => {
                warn!(target: "worker", session_id = %packet.session_id, error = %err, "Load failed");
                Packet::with_data(PacketKind::Load, ERROR_PAYLOAD)
            }
        }
    }

    /// The room a save/load applies to: the packet's stamped room id when
    /// present, the session's joined room otherwise.
    fn session_room(&self, packet: &Packet) -> Result<Arc<Room>, WorkerError> {
        let room_id = if packet.room_id.is_empty() {
            let state = self.lock();
            let session = state
                .sessions
                .get(&packet.session_id)
                .ok_or_else(|| WorkerError::NotJoined(packet.session_id.clone()))?;
            if session.room_id.is_empty() {
                return Err(WorkerError::NotJoined(packet.session_id.clone()));
            }
            session.room_id.clone()
        } else {
            packet.room_id.clone()
        };

        self.room(&room_id)
            .ok_or(WorkerError::RoomNotFound(room_id))
    }

    fn create_room(self: &Arc<Self>, room_id: RoomId, game: &str) -> Result<Arc<Room>, WorkerError> {
        let room = Room::create(room_id, game, &*self.directors)?;
        room.hydrate_from(&*self.store);

        {
            let mut state = self.lock();
            state.rooms.insert(room.id().clone(), Arc::clone(&room));
        }

        // Reclaim the slot when the room terminates. A later room may reuse
        // the id, so only this exact instance is removed.
        let worker = Arc::clone(self);
        let id = room.id().clone();
        let watched = Arc::clone(&room);
        let terminated = room.terminated();
        tokio::spawn(async move {
            terminated.cancelled().await;
            let mut state = worker.lock();
            if state
                .rooms
                .get(&id)
                .is_some_and(|current| Arc::ptr_eq(current, &watched))
            {
                state.rooms.remove(&id);
                debug!(target: "worker", room_id = %id, "Room slot reclaimed");
            }
        });

        Ok(room)
    }

    /// Attach the session's pending peer to `room`, detaching it from any
    /// previous room first. A peer already in the room is left alone.
    fn attach_session(
        &self,
        session_id: &SessionId,
        room: &Arc<Room>,
        player_index: u8,
    ) -> Result<(), WorkerError> {
        let (peer, previous) = {
            let mut state = self.lock();
            let (peer, joined) = {
                let session = state.sessions.entry(session_id.clone()).or_default();
                let peer = session
                    .peer
                    .clone()
                    .ok_or_else(|| WorkerError::NoPeerConnection(session_id.clone()))?;
                (peer, session.room_id.clone())
            };
            let previous = if joined.is_empty() || joined == *room.id() {
                None
            } else {
                state.rooms.get(&joined).cloned()
            };
            (peer, previous)
        };

        if let Some(previous) = previous {
            previous.detach(peer.id());
        }

        if !room.has_session(peer.id()) {
            room.attach(Arc::clone(&peer), player_index)?;
        }

        let mut state = self.lock();
        state
            .sessions
            .entry(session_id.clone())
            .or_default()
            .room_id = room.id().clone();
        Ok(())
    }

    /// Drop a browser session and detach its peer from its room. The room
    /// self-terminates if that was its last peer.
    fn cleanup_session(&self, session_id: &SessionId) {
        let (peer, room) = {
            let mut state = self.lock();
            let Some(session) = state.sessions.remove(session_id) else {
                return;
            };
            let room = state.rooms.get(&session.room_id).cloned();
            (session.peer, room)
        };

        debug!(target: "worker", session_id = %session_id, "Session terminated");
        if let (Some(peer), Some(room)) = (peer, room) {
            room.detach(peer.id());
        }
    }
}
