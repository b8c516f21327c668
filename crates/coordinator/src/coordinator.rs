//! The Coordinator: worker registry, room ownership, and browser relay.
//!
//! The Coordinator is the only process with a global view. It assigns every
//! connecting worker an identity, admits browsers onto a chosen worker, and
//! keeps the authoritative `room -> worker` map. Everything room-scoped a
//! browser sends is relayed synchronously to the owning worker and the
//! worker's reply returned verbatim; the Coordinator's only added state is
//! remembering which room a session joined so later save/load packets can be
//! stamped with it.
//!
//! Ownership invariant: the `room -> worker` map is written only by the
//! owning worker's `registerRoom` event and erased when that worker's
//! channel dies.

use crate::balancer::WorkerSelector;
use crate::errors::CoordinatorError;
use crate::{browser, workers};

use common::{RoomId, SessionId, WorkerId};
use relay_protocol::{Channel, Packet, PacketKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// In-band payload reporting a failed relay or refused operation.
pub(crate) const ERROR_PAYLOAD: &str = "error";

/// One admitted browser session.
struct BrowserRecord {
    channel: Channel,
    /// Worker this session was placed on at admission.
    worker_id: WorkerId,
    /// Room the session joined; empty until its first successful `start`.
    room_id: RoomId,
    /// ICE candidates accumulated for this session.
    ice_candidates: Vec<String>,
}

/// The central registry and relay.
pub struct Coordinator {
    workers: Mutex<HashMap<WorkerId, Channel>>,
    rooms: Mutex<HashMap<RoomId, WorkerId>>,
    sessions: Mutex<HashMap<SessionId, BrowserRecord>>,
    selector: Box<dyn WorkerSelector>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Coordinator {
    /// Build a Coordinator with the given placement strategy.
    #[must_use]
    pub fn new(selector: Box<dyn WorkerSelector>) -> Arc<Self> {
        Arc::new(Self {
            workers: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            selector,
        })
    }

    /// Register a newly connected worker: assign it a fresh id, push the id
    /// over its channel, install its handlers, and watch for its death.
    pub async fn register_worker(self: &Arc<Self>, channel: Channel) -> WorkerId {
        let worker_id = WorkerId::generate();
        info!(target: "coordinator", worker_id = %worker_id, "Worker registered");

        lock(&self.workers).insert(worker_id.clone(), channel.clone());
        workers::route(self, &worker_id, &channel);

        // A dead worker takes all of its rooms with it.
        let coordinator = Arc::clone(self);
        let watched_id = worker_id.clone();
        let closed = channel.closed();
        tokio::spawn(async move {
            closed.cancelled().await;
            coordinator.remove_worker(&watched_id);
        });

        let assign = Packet::with_data(PacketKind::WorkerAssign, worker_id.as_str());
        if let Err(err) = channel.notify(assign).await {
            warn!(
                target: "coordinator",
                worker_id = %worker_id,
                error = %err,
                "Failed to push worker id"
            );
        }

        worker_id
    }

    /// Drop a worker and every room it owned.
    pub fn remove_worker(&self, worker_id: &WorkerId) {
        lock(&self.workers).remove(worker_id);

        let mut rooms = lock(&self.rooms);
        let before = rooms.len();
        rooms.retain(|_, owner| owner != worker_id);
        let dropped = before - rooms.len();
        drop(rooms);

        info!(
            target: "coordinator",
            worker_id = %worker_id,
            dropped_rooms = dropped,
            "Worker unregistered"
        );
    }

    /// Admit a newly connected browser: place it on a worker, install its
    /// relay handlers, and watch for its death.
    ///
    /// Zero registered workers refuses the admission outright.
    pub fn admit_browser(self: &Arc<Self>, channel: Channel) -> Result<SessionId, CoordinatorError> {
        let candidates: Vec<WorkerId> = lock(&self.workers).keys().cloned().collect();
        let worker_id = self
            .selector
            .pick(&candidates)
            .ok_or(CoordinatorError::NoWorkerAvailable)?;

        let session_id = SessionId::generate();
        lock(&self.sessions).insert(
            session_id.clone(),
            BrowserRecord {
                channel: channel.clone(),
                worker_id: worker_id.clone(),
                room_id: RoomId::default(),
                ice_candidates: Vec::new(),
            },
        );
        browser::route(self, &session_id, &channel);

        let coordinator = Arc::clone(self);
        let watched_id = session_id.clone();
        let closed = channel.closed();
        tokio::spawn(async move {
            closed.cancelled().await;
            coordinator.expire_session(&watched_id).await;
        });

        info!(
            target: "coordinator",
            session_id = %session_id,
            worker_id = %worker_id,
            "Browser admitted"
        );
        Ok(session_id)
    }

    /// Forget a browser session and tell its worker to release whatever the
    /// session held.
    async fn expire_session(&self, session_id: &SessionId) {
        let Some(record) = lock(&self.sessions).remove(session_id) else {
            return;
        };
        debug!(target: "coordinator", session_id = %session_id, "Browser session expired");

        if let Some(worker) = self.worker_channel(&record.worker_id) {
            let terminate =
                Packet::new(PacketKind::TerminateSession).for_session(session_id.clone());
            if let Err(err) = worker.notify(terminate).await {
                debug!(
                    target: "coordinator",
                    session_id = %session_id,
                    error = %err,
                    "Could not notify worker of session termination"
                );
            }
        }
    }

    /// Relay one room-scoped browser packet to the session's worker and hand
    /// the worker's reply back. This is the synchronous store-and-forward
    /// hop every browser operation takes.
    pub(crate) async fn relay_to_worker(&self, session_id: &SessionId, mut packet: Packet) -> Packet {
        let kind = packet.kind;
        let Some(worker_id) = self.session_worker(session_id) else {
            warn!(target: "coordinator.relay", session_id = %session_id, "Relay for unknown session");
            return Packet::with_data(kind, ERROR_PAYLOAD);
        };
        let Some(worker) = self.worker_channel(&worker_id) else {
            warn!(
                target: "coordinator.relay",
                session_id = %session_id,
                worker_id = %worker_id,
                "Relay to a worker that is gone"
            );
            return Packet::with_data(kind, ERROR_PAYLOAD);
        };

        packet.session_id = session_id.clone();
        if matches!(kind, PacketKind::Save | PacketKind::Load) && packet.room_id.is_empty() {
            if let Some(room_id) = self.session_room(session_id) {
                packet.room_id = room_id;
            }
        }

        match worker.request(packet).await {
            Ok(reply) => {
                // The definitive room id comes back on the start reply; keep
                // it so save/load can be stamped later.
                if kind == PacketKind::Start && !reply.room_id.is_empty() {
                    self.set_session_room(session_id, reply.room_id.clone());
                }
                reply
            }
            Err(err) => {
                warn!(
                    target: "coordinator.relay",
                    session_id = %session_id,
                    worker_id = %worker_id,
                    kind = ?kind,
                    error = %err,
                    "Relay failed"
                );
                Packet::with_data(kind, ERROR_PAYLOAD)
            }
        }
    }

    /// Relay a bridging packet from `origin` to the worker named in its
    /// `target_id`. Returns `None` (no reply) when the packet targets the
    /// origin itself.
    pub(crate) async fn relay_to_target(&self, origin: &WorkerId, packet: Packet) -> Option<Packet> {
        let target = packet.target_worker_id.clone();
        if target.is_empty() || target == *origin {
            return None;
        }

        let kind = packet.kind;
        let Some(channel) = self.worker_channel(&target) else {
            warn!(
                target: "coordinator.relay",
                origin = %origin,
                target = %target,
                "Bridge relay to a worker that is gone"
            );
            return Some(Packet::with_data(kind, ERROR_PAYLOAD));
        };

        debug!(
            target: "coordinator.relay",
            origin = %origin,
            target = %target,
            kind = ?kind,
            "Relaying bridge packet"
        );
        match channel.request(packet).await {
            Ok(reply) => Some(reply),
            Err(err) => {
                warn!(
                    target: "coordinator.relay",
                    origin = %origin,
                    target = %target,
                    error = %err,
                    "Bridge relay failed"
                );
                Some(Packet::with_data(kind, ERROR_PAYLOAD))
            }
        }
    }

    /// Record that `worker_id` owns `room_id`. Called only from the owning
    /// worker's `registerRoom` event.
    pub(crate) fn record_room(&self, room_id: RoomId, worker_id: WorkerId) {
        info!(target: "coordinator", room_id = %room_id, worker_id = %worker_id, "Room registered");
        lock(&self.rooms).insert(room_id, worker_id);
    }

    /// The worker owning `room_id`, if any. `None` means "not yet created"
    /// and tells the caller to create the room itself.
    #[must_use]
    pub fn room_owner(&self, room_id: &RoomId) -> Option<WorkerId> {
        lock(&self.rooms).get(room_id).cloned()
    }

    /// Number of rooms with a known owner.
    #[must_use]
    pub fn room_count(&self) -> usize {
        lock(&self.rooms).len()
    }

    /// Number of registered workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }

    /// The channel of a registered worker.
    #[must_use]
    pub(crate) fn worker_channel(&self, worker_id: &WorkerId) -> Option<Channel> {
        lock(&self.workers).get(worker_id).cloned()
    }

    /// The worker a session was placed on.
    #[must_use]
    pub fn session_worker(&self, session_id: &SessionId) -> Option<WorkerId> {
        lock(&self.sessions)
            .get(session_id)
            .map(|record| record.worker_id.clone())
    }

    /// The room a session has joined, if any.
    #[must_use]
    pub fn session_room(&self, session_id: &SessionId) -> Option<RoomId> {
        lock(&self.sessions)
            .get(session_id)
            .map(|record| record.room_id.clone())
            .filter(|room_id| !room_id.is_empty())
    }

    pub(crate) fn set_session_room(&self, session_id: &SessionId, room_id: RoomId) {
        if let Some(record) = lock(&self.sessions).get_mut(session_id) {
            record.room_id = room_id;
        }
    }

    pub(crate) fn session_channel(&self, session_id: &SessionId) -> Option<Channel> {
        lock(&self.sessions)
            .get(session_id)
            .map(|record| record.channel.clone())
    }

    pub(crate) fn push_candidate(&self, session_id: &SessionId, candidate: String) {
        if let Some(record) = lock(&self.sessions).get_mut(session_id) {
            record.ice_candidates.push(candidate);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::balancer::RandomSelector;
    use relay_protocol::FrameTransport;

    fn coordinator() -> Arc<Coordinator> {
        Coordinator::new(Box::new(RandomSelector::new()))
    }

    fn channel() -> (Channel, Channel) {
        let (left, right) = FrameTransport::pair(64);
        (Channel::spawn(left), Channel::spawn(right))
    }

    #[tokio::test]
    async fn test_admission_with_no_workers_is_refused() {
        let coordinator = coordinator();
        let (browser, _far) = channel();

        let outcome = coordinator.admit_browser(browser);
        assert!(matches!(outcome, Err(CoordinatorError::NoWorkerAvailable)));
    }

    #[tokio::test]
    async fn test_room_ownership_lifecycle() {
        let coordinator = coordinator();
        let (worker_channel, _far) = channel();

        let worker_id = coordinator.register_worker(worker_channel).await;
        assert_eq!(coordinator.worker_count(), 1);

        let room = RoomId::from("room-1");
        assert!(coordinator.room_owner(&room).is_none());

        coordinator.record_room(room.clone(), worker_id.clone());
        assert_eq!(coordinator.room_owner(&room), Some(worker_id.clone()));

        coordinator.remove_worker(&worker_id);
        assert_eq!(coordinator.worker_count(), 0);
        assert!(coordinator.room_owner(&room).is_none());
    }

    #[tokio::test]
    async fn test_worker_death_cascades_to_its_rooms() {
        let coordinator = coordinator();
        let (worker_channel, far) = channel();

        let worker_id = coordinator.register_worker(worker_channel.clone()).await;
        coordinator.record_room(RoomId::from("r-1"), worker_id.clone());
        coordinator.record_room(RoomId::from("r-2"), worker_id.clone());
        assert_eq!(coordinator.room_count(), 2);

        // Kill the connection; the registered watcher cleans up.
        far.close();
        worker_channel.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while coordinator.worker_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(coordinator.room_count(), 0);
    }

    #[tokio::test]
    async fn test_session_room_is_recorded_and_queryable() {
        let coordinator = coordinator();
        let (worker_channel, _far) = channel();
        coordinator.register_worker(worker_channel).await;

        let (browser_channel, _browser_far) = channel();
        let session_id = coordinator.admit_browser(browser_channel).unwrap();

        assert!(coordinator.session_room(&session_id).is_none());
        coordinator.set_session_room(&session_id, RoomId::from("room-9"));
        assert_eq!(
            coordinator.session_room(&session_id),
            Some(RoomId::from("room-9"))
        );
        assert!(coordinator.session_worker(&session_id).is_some());
    }
}
