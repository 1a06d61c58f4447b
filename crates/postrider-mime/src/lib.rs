//! # postrider-mime
//!
//! MIME message construction for outbound email.
//!
//! ## Features
//!
//! - **Message model**: Immutable message records built through a
//!   validating builder
//! - **Composition**: `text/plain`, `text/html`, `multipart/alternative`,
//!   and `multipart/mixed` payloads with attachments
//! - **Encoding**: Base64, Quoted-Printable, RFC 2047 header encoding,
//!   RFC 5322 header folding
//! - **Addresses**: Display-form parsing and bare-address extraction
//!
//! ## Quick Start
//!
//! ```ignore
//! use postrider_mime::{Message, compose};
//!
//! let message = Message::builder()
//!     .from("sender@example.com")?
//!     .to("recipient@example.com")?
//!     .subject("Hello")
//!     .text("Hello, World!")
//!     .build()?;
//!
//! let composed = compose(&message, "localhost")?;
//! println!("{}", composed.payload);
//! ```
//!
//! ## Attachments
//!
//! ```ignore
//! use postrider_mime::{Attachment, Message};
//!
//! let message = Message::builder()
//!     .from("sender@example.com")?
//!     .to("recipient@example.com")?
//!     .subject("Report")
//!     .text("Attached.")
//!     .attach(Attachment::from_path("report.pdf").content_type("application/pdf"))
//!     .build()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod composer;
mod error;
mod message;

pub mod encoding;

pub use address::{Mailbox, extract_address};
pub use composer::{ComposedMessage, compose};
pub use error::{Error, Result};
pub use message::{
    Attachment, AttachmentSource, Message, MessageBuilder, Priority, TransferEncoding,
};
