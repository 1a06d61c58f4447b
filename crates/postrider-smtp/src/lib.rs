//! # postrider-smtp
//!
//! An async SMTP submission client implementing RFC 5321.
//!
//! ## Features
//!
//! - **Full submission protocol**: EHLO/HELO, MAIL FROM, RCPT TO, DATA,
//!   RSET, NOOP, QUIT
//! - **TLS**: Implicit TLS (port 465) and STARTTLS upgrade (RFC 3207)
//! - **Authentication**: PLAIN, LOGIN, CRAM-MD5, XOAUTH2
//! - **Capability discovery**: SIZE, 8BITMIME, PIPELINING, SMTPUTF8,
//!   ENHANCEDSTATUSCODES
//! - **Typed errors**: a stable taxonomy with server status codes, raw
//!   responses, and remediation hints
//!
//! ## Quick Start
//!
//! ```ignore
//! use postrider_mime::Message;
//! use postrider_smtp::{Credentials, Options, SmtpClient};
//!
//! #[tokio::main]
//! async fn main() -> postrider_smtp::Result<()> {
//!     let options = Options::builder("smtp.example.com").build();
//!     let mut client = SmtpClient::new(options)
//!         .credentials(Credentials::password("user@example.com", "password"));
//!
//!     let message = Message::builder()
//!         .from("user@example.com")?
//!         .to("friend@example.com")?
//!         .subject("Hello")
//!         .text("Hello, World!")
//!         .build()?;
//!
//!     let result = client.send(&message).await?;
//!     println!("accepted: {:?}", result.accepted);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL mechanism selection and dialogues
//! - [`command`]: SMTP command serialization
//! - [`connection`]: Transport, configuration, and the connection state
//!   machine
//! - [`parser`]: Incremental reply parser
//! - [`types`]: Replies, capabilities, envelopes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
mod client;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use auth::{Credentials, Mechanism};
pub use client::{SmtpClient, send_message};
pub use connection::{
    CollectingEvents, ConnectionEvents, LoggingEvents, NoopEvents, Options, OptionsBuilder,
    SmtpConnection, SmtpStream, State, TlsOptions,
};
pub use error::{Error, ErrorKind, Result};
pub use types::{Capabilities, Envelope, Reply, ReplyCode, SendResult};
