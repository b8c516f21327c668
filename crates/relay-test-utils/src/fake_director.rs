//! Scriptable emulator director.

use bytes::Bytes;
use common::RoomId;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use worker::emulator::{DirectorError, DirectorFactory, EmulatorEndpoints, GameDirector, InputWord};

/// Buffer depth of the fake emulator's media and input channels.
const FAKE_CHANNEL_BUFFER: usize = 100;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A director that counts control calls and persists a marker file.
pub struct FakeDirector {
    path: PathBuf,
    saves: AtomicUsize,
    loads: AtomicUsize,
    stops: AtomicUsize,
    fail_save: AtomicBool,
    fail_load: AtomicBool,
}

impl FakeDirector {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            saves: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_save: AtomicBool::new(false),
            fail_load: AtomicBool::new(false),
        }
    }

    /// How many times `save` succeeded.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// How many times `load` succeeded.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// How many times `stop` was called. A healthy room stops its director
    /// exactly once.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Make subsequent `save` calls fail.
    pub fn set_fail_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `load` calls fail.
    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }
}

impl GameDirector for FakeDirector {
    fn save(&self) -> Result<(), DirectorError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(DirectorError::SaveFailed("scripted failure".to_string()));
        }
        fs::write(&self.path, b"fake-state")
            .map_err(|e| DirectorError::SaveFailed(e.to_string()))?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<(), DirectorError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(DirectorError::LoadFailed("scripted failure".to_string()));
        }
        if !self.path.exists() {
            return Err(DirectorError::LoadFailed("no save file".to_string()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn save_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// The test's ends of one fake emulator instance.
pub struct DirectorHandle {
    /// Feed encoded video frames into the room.
    pub video: mpsc::Sender<Bytes>,
    /// Feed encoded audio packets into the room.
    pub audio: mpsc::Sender<Bytes>,
    /// Drain the combined input words the room delivered.
    pub input: mpsc::Receiver<InputWord>,
    /// The director control handle behind the room.
    pub director: Arc<FakeDirector>,
}

/// Factory handing out [`FakeDirector`]s and retaining the test-side handles.
pub struct FakeDirectorFactory {
    root: PathBuf,
    handles: Mutex<HashMap<RoomId, DirectorHandle>>,
    directors: Mutex<HashMap<RoomId, Arc<FakeDirector>>>,
}

impl FakeDirectorFactory {
    /// A factory rooted in a fresh temp directory.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let root = std::env::temp_dir().join(format!("arcadia-fake-{}", uuid::Uuid::new_v4()));
        let _ = fs::create_dir_all(&root);
        Arc::new(Self {
            root,
            handles: Mutex::new(HashMap::new()),
            directors: Mutex::new(HashMap::new()),
        })
    }

    /// Take the test-side handle for a room's emulator. Each handle can be
    /// taken once.
    #[must_use]
    pub fn take_handle(&self, room_id: &RoomId) -> Option<DirectorHandle> {
        lock(&self.handles).remove(room_id)
    }

    /// The director created for a room, if any.
    #[must_use]
    pub fn director(&self, room_id: &RoomId) -> Option<Arc<FakeDirector>> {
        lock(&self.directors).get(room_id).cloned()
    }

    /// Room ids this factory has created directors for.
    #[must_use]
    pub fn created_rooms(&self) -> Vec<RoomId> {
        lock(&self.directors).keys().cloned().collect()
    }
}

impl DirectorFactory for FakeDirectorFactory {
    fn create(
        &self,
        room_id: &RoomId,
        _game: &str,
    ) -> Result<(Arc<dyn GameDirector>, EmulatorEndpoints), DirectorError> {
        let (video_tx, video_rx) = mpsc::channel(FAKE_CHANNEL_BUFFER);
        let (audio_tx, audio_rx) = mpsc::channel(FAKE_CHANNEL_BUFFER);
        let (input_tx, input_rx) = mpsc::channel(FAKE_CHANNEL_BUFFER);

        let director = Arc::new(FakeDirector::new(
            self.root.join(format!("{room_id}.state")),
        ));

        lock(&self.handles).insert(
            room_id.clone(),
            DirectorHandle {
                video: video_tx,
                audio: audio_tx,
                input: input_rx,
                director: Arc::clone(&director),
            },
        );
        lock(&self.directors).insert(room_id.clone(), Arc::clone(&director));

        let director: Arc<dyn GameDirector> = director;
        Ok((director, EmulatorEndpoints {
            video: video_rx,
            audio: audio_rx,
            input: input_tx,
        }))
    }
}
