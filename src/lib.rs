// =============================================================================
// FREIGHT TRACE ENGINE
// =============================================================================
//
// Ask every carrier we know where a container is, keep whoever answers
// first, and fold all the answers into one list of shipments.
//
//   input values -> session (retries, workers, cancellation)
//                -> orchestrator (cache, tiered race)
//                -> reconcile (identity, merge, sort)
//                -> ordered shipments
// =============================================================================

pub mod adapters;
pub mod cache;
pub mod config;
pub mod dates;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod reconcile;
pub mod session;

pub use adapters::{AdapterRegistry, CarrierAdapter, Tier};
pub use config::Config;
pub use error::{AdapterError, ValueFailure};
pub use models::{AdapterProgress, ProgressStatus, TrackedShipment, TrackingResult};
pub use orchestrator::{Orchestrator, ProgressFn};
pub use reconcile::ReconciliationEngine;
pub use session::{SearchController, SearchHandle, SessionUpdate};
