//! Hazard events and the shared working set.
//!
//! - [`Event`]: a hazard record with location and open/closed state
//! - [`EventStore`]: the active set both ingestion drivers write into

mod event;
mod event_store;

pub use crate::events::event::Event;
pub use crate::events::event_store::{EventStore, UpsertOutcome};
