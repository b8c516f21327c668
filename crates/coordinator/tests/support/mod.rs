//! Shared fixtures: an in-process Coordinator wired to real workers over
//! in-memory channel pairs, plus a scriptable browser end.

#![allow(dead_code)]

use common::{SessionId, WorkerId};
use coordinator::{Coordinator, WorkerSelector};
use relay_protocol::{Channel, FrameTransport};
use relay_test_utils::{FakeDirectorFactory, FakePeerConnector, MemorySaveStore};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::timeout;
use worker::emulator::DirectorFactory;
use worker::peer::PeerConnector;
use worker::storage::SaveStore;
use worker::Worker;

pub const WAIT: Duration = Duration::from_secs(1);

/// Poll until `predicate` holds or the wait budget runs out.
pub async fn eventually(mut predicate: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !predicate() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn channel_pair() -> (Channel, Channel) {
    let (left, right) = FrameTransport::pair(64);
    (Channel::spawn(left), Channel::spawn(right))
}

/// A real worker linked to the Coordinator over an in-memory channel, with
/// the test holding every collaborator fake.
pub struct TestWorker {
    pub worker: Arc<Worker>,
    pub id: WorkerId,
    pub connector: Arc<FakePeerConnector>,
    pub factory: Arc<FakeDirectorFactory>,
    pub store: Arc<MemorySaveStore>,
    /// The worker's end of the Coordinator link.
    pub channel: Channel,
    /// The Coordinator's end of the link.
    pub coordinator_channel: Channel,
}

impl TestWorker {
    /// Simulate the worker's connection dying: both ends of the in-memory
    /// link go down, like a socket EOF would take both pumps with it.
    pub fn kill(&self) {
        self.channel.close();
        self.coordinator_channel.close();
    }
}

pub async fn spawn_worker(coordinator: &Arc<Coordinator>, label: &str) -> TestWorker {
    let connector = Arc::new(FakePeerConnector::new(label));
    let factory = FakeDirectorFactory::new();
    let store = Arc::new(MemorySaveStore::new());
    let worker = Worker::new(
        Arc::clone(&connector) as Arc<dyn PeerConnector>,
        Arc::clone(&factory) as Arc<dyn DirectorFactory>,
        Arc::clone(&store) as Arc<dyn SaveStore>,
    );

    let (coordinator_side, worker_side) = FrameTransport::pair(64);
    let coordinator_channel = Channel::spawn(coordinator_side);
    let worker_channel = Channel::spawn(worker_side);

    // Handlers first, so the id push cannot be missed.
    worker.attach_coordinator(&worker_channel);
    let id = coordinator
        .register_worker(coordinator_channel.clone())
        .await;

    let expected = id.clone();
    let probe = Arc::clone(&worker);
    eventually(move || probe.id() == expected).await;

    TestWorker {
        worker,
        id,
        connector,
        factory,
        store,
        channel: worker_channel,
        coordinator_channel,
    }
}

/// The browser's end of an admitted session.
pub struct TestBrowser {
    pub session_id: SessionId,
    pub channel: Channel,
}

pub fn admit_browser(coordinator: &Arc<Coordinator>) -> TestBrowser {
    let (coordinator_side, browser_side) = FrameTransport::pair(64);
    let coordinator_channel = Channel::spawn(coordinator_side);
    let browser_channel = Channel::spawn(browser_side);

    let session_id = coordinator
        .admit_browser(coordinator_channel)
        .expect("admission should succeed");

    TestBrowser {
        session_id,
        channel: browser_channel,
    }
}

/// Selector that always returns the pinned worker, letting tests place each
/// browser deterministically.
pub struct PinnedSelector {
    pinned: Mutex<Option<WorkerId>>,
}

impl PinnedSelector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pinned: Mutex::new(None),
        })
    }

    pub fn pin(&self, worker_id: WorkerId) {
        *self
            .pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(worker_id);
    }
}

impl WorkerSelector for PinnedSelector {
    fn pick(&self, workers: &[WorkerId]) -> Option<WorkerId> {
        let pinned = self
            .pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match pinned.as_ref() {
            Some(id) if workers.contains(id) => Some(id.clone()),
            _ => workers.first().cloned(),
        }
    }
}
