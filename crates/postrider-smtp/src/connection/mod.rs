//! SMTP connection management.

mod client;
mod config;
mod events;
mod stream;

pub use client::SmtpConnection;
pub use config::{Options, OptionsBuilder, TlsOptions};
pub use events::{CollectingEvents, ConnectionEvents, LoggingEvents, NoopEvents};
pub use stream::{SmtpStream, connect, connect_tls};

/// Connection lifecycle state.
///
/// ```text
/// CLOSED → CONNECTING → CONNECTED → READY ⇄ SENDING → CLOSING → CLOSED
///                                     │
///                                   ERROR (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No socket.
    Closed,
    /// TCP/TLS handshake in progress.
    Connecting,
    /// Greeting received, EHLO in progress.
    Connected,
    /// Handshake complete; commands may be dispatched.
    Ready,
    /// A mail transaction is in progress.
    Sending,
    /// QUIT dispatched.
    Closing,
    /// Terminal failure; the socket is unusable.
    Error,
}
