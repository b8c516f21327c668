//! Worker selection for browser admission.
//!
//! Placement policy sits behind [`WorkerSelector`] so latency- or load-aware
//! strategies can replace the baseline without touching the relay logic. The
//! baseline picks uniformly at random among the registered workers.

use common::WorkerId;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::warn;

/// Placement strategy for new browser sessions.
pub trait WorkerSelector: Send + Sync {
    /// Pick one of `workers`, or `None` when the slice is empty.
    fn pick(&self, workers: &[WorkerId]) -> Option<WorkerId>;
}

/// Forward selection through a shared handle, so an `Arc`-wrapped selector is
/// itself a [`WorkerSelector`].
impl<S: WorkerSelector + ?Sized> WorkerSelector for Arc<S> {
    fn pick(&self, workers: &[WorkerId]) -> Option<WorkerId> {
        (**self).pick(workers)
    }
}

/// Uniform random selection using the system CSPRNG.
pub struct RandomSelector {
    rng: SystemRandom,
}

impl RandomSelector {
    /// A selector backed by the system CSPRNG.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSelector for RandomSelector {
    fn pick(&self, workers: &[WorkerId]) -> Option<WorkerId> {
        if workers.len() <= 1 {
            return workers.first().cloned();
        }

        let mut random_bytes = [0u8; 8];
        if self.rng.fill(&mut random_bytes).is_err() {
            // Falling back to the first worker keeps admission working even
            // if the CSPRNG is somehow unavailable.
            warn!(target: "coordinator.balancer", "CSPRNG failed, falling back to first worker");
            return workers.first().cloned();
        }

        // Convert to f64 in [0, 1) and scale to an index.
        let random_u64 = u64::from_le_bytes(random_bytes);
        #[allow(clippy::cast_precision_loss)]
        let random_f64 = (random_u64 as f64) / (u64::MAX as f64);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = ((random_f64 * workers.len() as f64) as usize).min(workers.len() - 1);

        workers.get(index).cloned()
    }
}
