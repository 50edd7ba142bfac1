//! Alert matching, suppression and dispatch.
//!
//! - [`GeofenceMatcher`]: finds the subscribers within a radius of an event
//! - [`CooldownTracker`]: keeps a subscriber from being alerted twice about
//!   the same event on the same channel
//! - [`CooldownLoader`]: persists the cooldowns between restarts
//! - [`AlertDispatcher`]: delivers alerts and records their outcome
//! - [`DispatchLog`]: bounded history of dispatch records
//!
//! # Flow
//!
//! ```text
//! Event ──> GeofenceMatcher ──> Match* ──> CooldownTracker::try_reserve
//!                                              │
//!                      suppressed <── no ──────┤
//!                                              yes
//!                                              │
//!                                     channel send (timeout)
//!                                       │             │
//!                          record_sent <┘             └> release
//! ```

mod cooldown;
mod cooldown_loader;
mod dispatch_log;
mod dispatch_record;
mod dispatcher;
mod matcher;
mod payload;

pub use crate::alerts::cooldown::{CooldownKey, CooldownTracker, SentEntry};
pub use crate::alerts::cooldown_loader::CooldownLoader;
pub use crate::alerts::dispatch_log::{DispatchLog, DispatchSummary};
pub use crate::alerts::dispatch_record::{Channel, DispatchRecord, Outcome};
pub use crate::alerts::dispatcher::AlertDispatcher;
pub use crate::alerts::matcher::{GeofenceMatcher, Match};
pub use crate::alerts::payload::AlertPayload;
