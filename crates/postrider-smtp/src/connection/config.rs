//! Connection configuration.

use std::time::Duration;

/// Default submission port when STARTTLS is expected.
const DEFAULT_PORT: u16 = 587;

/// Default port for implicit TLS.
const DEFAULT_TLS_PORT: u16 = 465;

/// TLS behavior options.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Verify the server certificate chain. **Disable only for testing.**
    pub reject_unauthorized: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            reject_unauthorized: true,
        }
    }
}

/// SMTP connection options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Server hostname; also used as the TLS server name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Use implicit TLS from the first byte (port 465).
    pub secure: bool,
    /// TLS behavior.
    pub tls: TlsOptions,
    /// Timeout covering the TCP/TLS handshake.
    pub connection_timeout: Duration,
    /// Timeout from transport establishment to the 220 greeting.
    pub greeting_timeout: Duration,
    /// Idle timeout on the live socket.
    pub socket_timeout: Duration,
    /// Client name announced in EHLO/HELO.
    pub name: String,
    /// Skip the STARTTLS upgrade even when the server offers it.
    pub disable_starttls: bool,
}

impl Options {
    /// Creates options for the given host with submission defaults.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::builder(host).build()
    }

    /// Creates an options builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> OptionsBuilder {
        OptionsBuilder::new(host)
    }
}

/// Builder for connection options.
#[derive(Debug, Clone)]
pub struct OptionsBuilder {
    host: String,
    port: Option<u16>,
    secure: bool,
    tls: TlsOptions,
    connection_timeout: Duration,
    greeting_timeout: Duration,
    socket_timeout: Duration,
    name: String,
    disable_starttls: bool,
}

impl OptionsBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            secure: false,
            tls: TlsOptions::default(),
            connection_timeout: Duration::from_secs(10),
            greeting_timeout: Duration::from_secs(5),
            socket_timeout: Duration::from_secs(60),
            name: "localhost".to_string(),
            disable_starttls: false,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables implicit TLS.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets certificate verification behavior.
    #[must_use]
    pub const fn reject_unauthorized(mut self, reject: bool) -> Self {
        self.tls.reject_unauthorized = reject;
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the greeting timeout.
    #[must_use]
    pub const fn greeting_timeout(mut self, timeout: Duration) -> Self {
        self.greeting_timeout = timeout;
        self
    }

    /// Sets the idle socket timeout.
    #[must_use]
    pub const fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Sets the client name announced in EHLO/HELO.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Disables the STARTTLS upgrade.
    #[must_use]
    pub const fn disable_starttls(mut self, disable: bool) -> Self {
        self.disable_starttls = disable;
        self
    }

    /// Builds the options.
    #[must_use]
    pub fn build(self) -> Options {
        let port = self.port.unwrap_or(if self.secure {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PORT
        });

        Options {
            host: self.host,
            port,
            secure: self.secure,
            tls: self.tls,
            connection_timeout: self.connection_timeout,
            greeting_timeout: self.greeting_timeout,
            socket_timeout: self.socket_timeout,
            name: self.name,
            disable_starttls: self.disable_starttls,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::new("smtp.example.com");
        assert_eq!(options.port, 587);
        assert!(!options.secure);
        assert!(options.tls.reject_unauthorized);
        assert_eq!(options.connection_timeout, Duration::from_secs(10));
        assert_eq!(options.greeting_timeout, Duration::from_secs(5));
        assert_eq!(options.socket_timeout, Duration::from_secs(60));
        assert_eq!(options.name, "localhost");
        assert!(!options.disable_starttls);
    }

    #[test]
    fn test_secure_default_port() {
        let options = Options::builder("smtp.example.com").secure(true).build();
        assert_eq!(options.port, 465);
    }

    #[test]
    fn test_explicit_port_wins() {
        let options = Options::builder("smtp.example.com")
            .secure(true)
            .port(2465)
            .build();
        assert_eq!(options.port, 2465);
    }

    #[test]
    fn test_builder_fields() {
        let options = Options::builder("smtp.example.com")
            .name("mail.client.example")
            .reject_unauthorized(false)
            .disable_starttls(true)
            .socket_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(options.name, "mail.client.example");
        assert!(!options.tls.reject_unauthorized);
        assert!(options.disable_starttls);
        assert_eq!(options.socket_timeout, Duration::from_secs(5));
    }
}
