// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod connector;
pub mod curation;
pub mod error;
pub mod health;
pub mod metrics;
pub mod model;
pub mod runtime;
pub mod scheduler;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::config::PulseConfig;
pub use crate::curation::{CurationService, CycleOutcome, CycleReport};
pub use crate::error::{FetchError, PulseError, Result};
pub use crate::health::{HealthReport, HealthStatus};
pub use crate::runtime::PulseRuntime;
pub use crate::scheduler::{Scheduler, SchedulerState, SchedulerStatus};
pub use crate::store::CardStore;
