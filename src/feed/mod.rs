//! Hazard feed integration.
//!
//! This module polls an EONET-compatible disaster feed and converts its
//! snapshot into engine [`Event`](crate::events::Event)s.
//!
//! # Modules
//!
//! - `requester` - HTTP client for the feed endpoint
//! - `response_structs` - Data structures for feed responses
//! - `sync` - Conversion of feed entries into events

mod requester;
mod response_structs;
mod sync;

#[cfg(test)]
pub use crate::feed::requester::MockFeedRequester;
#[cfg(test)]
pub use crate::feed::response_structs::{CategoryResponse, EventResponse, GeometryResponse};
pub use crate::feed::requester::{EonetRequester, FeedRequester};
pub use crate::feed::sync::FeedSync;
