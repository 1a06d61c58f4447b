//! Core SMTP types: replies, capabilities, envelopes.

mod capability;
mod envelope;
mod reply;

pub use capability::Capabilities;
pub use envelope::{Envelope, SendResult};
pub use reply::{Reply, ReplyCode};
