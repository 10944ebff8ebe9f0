//! Stage executors.
//!
//! # Data Flow
//! ```text
//! Rendezvous
//!     → rendezvous stage (optional: normalize + interpret)
//!     → conductor stage  (handler invocation; mandatory hand-off)
//!     → central stage    (request events to the collector)
//!
//! Each stage: core..max workers + bounded queue
//!     queue full, pool at max → caller runs the job
//! ```
//!
//! # Design Decisions
//! - Independently sized pools so slow handlers cannot starve pre/post-processing
//! - Plain OS threads: handlers are synchronous business logic
//! - Completion is observed through a `StageTask` future, so async callers
//!   never block a runtime worker while the job is queued

pub mod executor;
pub mod task;

use serde::Serialize;

use crate::config::StagesConfig;

pub use executor::{StageExecutor, StageStats};
pub use task::StageTask;

/// Error type for stage submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The pool no longer accepts work.
    #[error("stage executor is shut down")]
    Shutdown,
    /// The job was dropped before producing a value (it panicked).
    #[error("stage job abandoned before completion")]
    Abandoned,
    /// The OS refused to create a worker thread.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}

/// The three pipeline stages, owned together by a running aggregator.
#[derive(Debug)]
pub struct StageExecutors {
    pub rendezvous: StageExecutor,
    pub conductor: StageExecutor,
    pub central: StageExecutor,
}

/// Stats for all three stages.
#[derive(Debug, Clone, Serialize)]
pub struct StagesStats {
    pub rendezvous: StageStats,
    pub conductor: StageStats,
    pub central: StageStats,
}

impl StageExecutors {
    pub fn new(config: &StagesConfig) -> Result<Self, ExecutorError> {
        Ok(Self {
            rendezvous: StageExecutor::new("rendezvous", &config.rendezvous)?,
            conductor: StageExecutor::new("conductor", &config.conductor)?,
            central: StageExecutor::new("central", &config.central)?,
        })
    }

    /// Stop all stages, then wait for each to drain.
    ///
    /// Blocking; call from `spawn_blocking` inside a runtime.
    pub fn shutdown_and_join(&self) {
        self.rendezvous.shutdown();
        self.conductor.shutdown();
        self.central.shutdown();

        self.rendezvous.shutdown_and_join();
        self.conductor.shutdown_and_join();
        self.central.shutdown_and_join();
    }

    pub fn stats(&self) -> StagesStats {
        StagesStats {
            rendezvous: self.rendezvous.stats(),
            conductor: self.conductor.stats(),
            central: self.central.stats(),
        }
    }
}
