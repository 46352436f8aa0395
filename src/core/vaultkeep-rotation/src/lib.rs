//! # Vaultkeep Rotation
//!
//! Scheduled credential rotation on top of [`SecretStoreClient`].
//!
//! - [`RotationScheduler`] owns the active [`RotationPolicy`] set, computes
//!   due dates and drives check passes
//! - [`RotationOrchestrator`] runs one rotation through a pluggable
//!   [`RotationHandler`], with rollback on failure and at most one rotation
//!   per path in flight
//! - [`RotationHistoryTracker`] keeps a bounded record of every attempt
//!
//! [`SecretStoreClient`]: vaultkeep_client::SecretStoreClient

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cron;
pub mod error;
pub mod handler;
pub mod history;
pub mod orchestrator;
pub mod policy;
pub mod scheduler;

pub use error::{HandlerError, RotationError};
pub use handler::{HandlerRegistry, RotationHandler};
pub use history::{RotationHistoryRecord, RotationHistoryTracker, RotationStats};
pub use orchestrator::RotationOrchestrator;
pub use policy::{normalize_path, RotationPolicy, RotationStatus, RotationType, SchedulePattern};
pub use scheduler::{RotationScheduler, ScheduledRotation};
