//! Outbound alert channels.
//!
//! - `broadcast` - push to connected client sessions through an in-process hub
//! - `sms` - text messages through a Twilio-compatible gateway

mod broadcast;
mod sms;

#[cfg(test)]
pub use crate::channels::broadcast::MockBroadcastChannel;
pub use crate::channels::broadcast::{BroadcastChannel, BroadcastHub, relay_lines};
#[cfg(test)]
pub use crate::channels::sms::MockSmsChannel;
pub use crate::channels::sms::{SmsChannel, TwilioSms};
