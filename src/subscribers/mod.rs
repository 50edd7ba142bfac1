//! Subscribers and the registry the matcher reads from.
//!
//! - `subscriber` - the [`Subscriber`] record owned by the account system
//! - `requester` - HTTP client for the account system's subscriber query
//! - `registry` - the [`SubscriberRegistry`] snapshot shared by both drivers

mod registry;
mod requester;
mod subscriber;

pub use crate::subscribers::registry::SubscriberRegistry;
#[cfg(test)]
pub use crate::subscribers::requester::MockSubscriberRequester;
pub use crate::subscribers::requester::{RegistryRequester, SubscriberRequester};
pub use crate::subscribers::subscriber::Subscriber;
