//! Business Services
//!
//! - `ApplyService` - validates sync batches and applies them transactionally
//! - `validation` - the pure conflict checks behind it
//!
//! Services coordinate between the database layer and the HTTP surface.

pub mod apply_service;
pub mod error;
pub mod validation;

pub use apply_service::{ApplyService, ApplySummary};
pub use error::ApplyError;
pub use validation::{plan_batch, ApplyPlan, PersistedState, Rejection};
