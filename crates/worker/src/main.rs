//! Arcadia worker binary.
//!
//! Wires the routing core to its collaborators and keeps the Coordinator
//! uplink running until shutdown. The emulator core and the peer-media
//! transport are injected at this level; the development backends below keep
//! the service runnable on a bare checkout, producing no media but speaking
//! the full protocol.

#![warn(clippy::pedantic)]

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use common::{RoomId, SessionId};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worker::config::Config;
use worker::coordinator_client;
use worker::emulator::{
    DirectorError, DirectorFactory, EmulatorEndpoints, GameDirector, InputWord,
};
use worker::peer::{PeerConnector, PeerEndpoints, PeerError, PeerSession, PeerState};
use worker::storage::DirSaveStore;
use worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worker=debug,relay_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Arcadia worker");

    let config = Config::from_env();
    info!(
        coordinator_url = %config.coordinator_url,
        save_dir = %config.save_dir,
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        request_timeout_ms = config.request_timeout_ms,
        "Configuration loaded"
    );

    let save_dir = PathBuf::from(&config.save_dir);
    let store = Arc::new(DirSaveStore::open(&save_dir)?);
    let directors = Arc::new(DevDirectorFactory {
        save_dir: save_dir.clone(),
    });
    let connector = Arc::new(DevConnector::default());

    let worker = Worker::new(connector, directors, store);

    let shutdown = CancellationToken::new();
    let uplink = tokio::spawn(coordinator_client::run(
        Arc::clone(&worker),
        config,
        shutdown.clone(),
    ));

    info!("Worker running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received");
    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), uplink).await;

    info!("Worker shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; without them the service
/// could never shut down cleanly.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Development director: a silent emulator. Keeps the room's channel ends
/// open and honors save/load against a marker file, so the whole signaling
/// and routing path can be exercised without an emulator core linked in.
struct DevDirector {
    path: PathBuf,
    _video: mpsc::Sender<Bytes>,
    _audio: mpsc::Sender<Bytes>,
    _input: Mutex<mpsc::Receiver<InputWord>>,
}

impl GameDirector for DevDirector {
    fn save(&self) -> Result<(), DirectorError> {
        fs::write(&self.path, b"dev-state").map_err(|e| DirectorError::SaveFailed(e.to_string()))
    }

    fn load(&self) -> Result<(), DirectorError> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(DirectorError::LoadFailed("no save file".to_string()))
        }
    }

    fn save_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn stop(&self) {}
}

struct DevDirectorFactory {
    save_dir: PathBuf,
}

impl DirectorFactory for DevDirectorFactory {
    fn create(
        &self,
        room_id: &RoomId,
        _game: &str,
    ) -> Result<(Arc<dyn GameDirector>, EmulatorEndpoints), DirectorError> {
        let (video_tx, video_rx) = mpsc::channel(100);
        let (audio_tx, audio_rx) = mpsc::channel(512);
        let (input_tx, input_rx) = mpsc::channel(100);

        let director: Arc<dyn GameDirector> = Arc::new(DevDirector {
            path: self.save_dir.join(format!("{room_id}.state")),
            _video: video_tx,
            _audio: audio_tx,
            _input: Mutex::new(input_rx),
        });

        Ok((
            director,
            EmulatorEndpoints {
                video: video_rx,
                audio: audio_rx,
                input: input_tx,
            },
        ))
    }
}

/// Development peer connector: accepts any offer, reports connected, and
/// parks the transport ends so the session's channels stay open.
#[derive(Default)]
struct DevConnector {
    parked: Mutex<HashMap<String, PeerEndpoints>>,
}

impl PeerConnector for DevConnector {
    fn start_as_offeree(
        &self,
        session_id: &SessionId,
        remote_offer: &str,
    ) -> Result<(String, PeerSession), PeerError> {
        let (session, endpoints) = PeerSession::new(format!("peer-{session_id}"));
        let _ = endpoints.state.send(PeerState::Connected);
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id().to_string(), endpoints);
        Ok((format!("answer:{remote_offer}"), session))
    }
}
