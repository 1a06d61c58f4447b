//! SMTP envelope derivation and send results.

use postrider_mime::{Message, extract_address};

/// The envelope negotiated via MAIL FROM / RCPT TO, distinct from the
/// message's own `To`/`Cc` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Bare sender address.
    pub from: String,
    /// Deduplicated recipients: `to ++ cc ++ bcc` in first-occurrence
    /// order.
    pub to: Vec<String>,
}

impl Envelope {
    /// Derives the envelope from a message.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        let from = extract_address(message.from.address()).to_string();

        let mut to = Vec::new();
        for mailbox in message
            .to
            .iter()
            .chain(&message.cc)
            .chain(&message.bcc)
        {
            let address = extract_address(mailbox.address()).to_string();
            if !to.contains(&address) {
                to.push(address);
            }
        }

        Self { from, to }
    }
}

/// The outcome of a completed send.
#[derive(Debug, Clone)]
pub struct SendResult {
    /// Message id: the `queued as` token from the final server reply when
    /// present, otherwise the `Message-ID` header value.
    pub message_id: String,
    /// Recipients the server accepted.
    pub accepted: Vec<String>,
    /// Recipients the server rejected.
    pub rejected: Vec<String>,
    /// The server's final reply as `<code> <message>`.
    pub response: String,
    /// The envelope that was transmitted.
    pub envelope: Envelope,
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
    use postrider_mime::Message;

    #[test]
    fn test_envelope_union_order() {
        let message = Message::builder()
            .from("Sender <s@x.com>")
            .unwrap()
            .to("a@x.com")
            .unwrap()
            .to("b@x.com")
            .unwrap()
            .cc("c@x.com")
            .unwrap()
            .bcc("d@x.com")
            .unwrap()
            .subject("hi")
            .text("hello")
            .build()
            .unwrap();

        let envelope = Envelope::from_message(&message);
        assert_eq!(envelope.from, "s@x.com");
        assert_eq!(envelope.to, vec!["a@x.com", "b@x.com", "c@x.com", "d@x.com"]);
    }

    #[test]
    fn test_envelope_deduplicates() {
        let message = Message::builder()
            .from("s@x.com")
            .unwrap()
            .to("a@x.com")
            .unwrap()
            .cc("a@x.com")
            .unwrap()
            .bcc("b@x.com")
            .unwrap()
            .bcc("a@x.com")
            .unwrap()
            .subject("hi")
            .text("hello")
            .build()
            .unwrap();

        let envelope = Envelope::from_message(&message);
        assert_eq!(envelope.to, vec!["a@x.com", "b@x.com"]);
    }
}
