//! SMTP command builder.

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// HELO - Legacy greeting fallback
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Mechanism name (e.g., `PLAIN`)
        mechanism: String,
        /// Initial response, when the mechanism sends one
        initial_response: Option<String>,
    },
    /// An authentication continuation line (base64 payload or empty)
    AuthData {
        /// The continuation payload
        payload: String,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Bare sender address
        from: String,
        /// SIZE parameter, sent when the server advertises SIZE
        size: Option<usize>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Bare recipient address
        to: String,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to wire bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => match initial_response {
                Some(response) => format!("AUTH {mechanism} {response}"),
                None => format!("AUTH {mechanism}"),
            },
            Self::AuthData { payload } => payload.clone(),
            Self::MailFrom { from, size } => match size {
                Some(size) => format!("MAIL FROM:<{from}> SIZE={size}"),
                None => format!("MAIL FROM:<{from}>"),
            },
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Noop => "NOOP".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        line.push_str("\r\n");
        line.into_bytes()
    }

    /// Returns the command line for logging, with credential bytes
    /// masked: `AUTH` commands appear as `AUTH ***` and authentication
    /// continuation payloads as `***`.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Auth { .. } => "AUTH ***".to_string(),
            Self::AuthData { .. } => "***".to_string(),
            _ => {
                let bytes = self.serialize();
                String::from_utf8_lossy(&bytes).trim_end().to_string()
            }
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
    fn test_ehlo_command() {
        let cmd = Command::Ehlo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"EHLO client.example.com\r\n");
    }

    #[test]
    fn test_helo_command() {
        let cmd = Command::Helo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"HELO client.example.com\r\n");
    }

    #[test]
    fn test_starttls_command() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
    }

    #[test]
    fn test_auth_with_initial_response() {
        let cmd = Command::Auth {
            mechanism: "PLAIN".to_string(),
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
    }

    #[test]
    fn test_auth_without_initial_response() {
        let cmd = Command::Auth {
            mechanism: "LOGIN".to_string(),
            initial_response: None,
        };
        assert_eq!(cmd.serialize(), b"AUTH LOGIN\r\n");
    }

    #[test]
    fn test_auth_data_empty_line() {
        let cmd = Command::AuthData {
            payload: String::new(),
        };
        assert_eq!(cmd.serialize(), b"\r\n");
    }

    #[test]
    fn test_mail_from() {
        let cmd = Command::MailFrom {
            from: "sender@example.com".to_string(),
            size: None,
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<sender@example.com>\r\n");
    }

    #[test]
    fn test_mail_from_with_size() {
        let cmd = Command::MailFrom {
            from: "sender@example.com".to_string(),
            size: Some(12345),
        };
        assert_eq!(
            cmd.serialize(),
            b"MAIL FROM:<sender@example.com> SIZE=12345\r\n"
        );
    }

    #[test]
    fn test_rcpt_to() {
        let cmd = Command::RcptTo {
            to: "recipient@example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"RCPT TO:<recipient@example.com>\r\n");
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Noop.serialize(), b"NOOP\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_auth_redacted() {
        let cmd = Command::Auth {
            mechanism: "PLAIN".to_string(),
            initial_response: Some("c2VjcmV0".to_string()),
        };
        assert_eq!(cmd.redacted(), "AUTH ***");

        let data = Command::AuthData {
            payload: "c2VjcmV0".to_string(),
        };
        assert_eq!(data.redacted(), "***");
    }

    #[test]
    fn test_redacted_plain_commands_unmasked() {
        let cmd = Command::MailFrom {
            from: "a@x.com".to_string(),
            size: None,
        };
        assert_eq!(cmd.redacted(), "MAIL FROM:<a@x.com>");
    }
}
