//! Trigger matching and notification dispatch.
//!
//! The processing half of the CDC pipeline: given a decoded
//! [`ChangeEvent`](vigil_core::change::ChangeEvent), find the triggers it
//! satisfies, durably record each match, and make one webhook delivery
//! attempt per match.
//!
//! - [`store`] -- persistence seam (`EventStore`) with the production
//!   PostgreSQL implementation and an in-memory one for tests.
//! - [`matcher`] -- candidate selection and fail-closed filter evaluation.
//! - [`delivery`] -- webhook delivery channel.
//! - [`processor`] -- per-(trigger, event) orchestration with the
//!   record-before-deliver durability contract.

pub mod delivery;
pub mod matcher;
pub mod processor;
pub mod store;

pub use delivery::webhook::{ChangeNotification, WebhookNotifier, FAILURE_STATUS};
pub use matcher::TriggerMatcher;
pub use processor::EventProcessor;
pub use store::{EventStore, MemoryEventStore, PgEventStore};
