//! Turns a relay request (recipient, subject, HTML body) into a sendable email.

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::error::Error;
use crate::types::{EmailAddress, Envelope, SendableEmail};

/// Width of the base64 lines in the body, per RFC 2045.
const BASE64_LINE_LENGTH: usize = 76;

static MESSAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An address with an optional display name, as used in the `From` header
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Mailbox {
    name: Option<String>,
    address: EmailAddress,
}

impl Mailbox {
    /// Creates a mailbox; an empty name is the same as no name
    pub fn new(name: Option<String>, address: EmailAddress) -> Mailbox {
        Mailbox {
            name: name.filter(|name| !name.trim().is_empty()),
            address,
        }
    }

    /// The bare address, used as envelope sender
    pub fn address(&self) -> &EmailAddress {
        &self.address
    }
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(ref name) => write!(f, "{} <{}>", encode_phrase(name), self.address),
            None => write!(f, "<{}>", self.address),
        }
    }
}

/// One relay request: constructed per call, rendered once, then dropped
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct OutboundMessage {
    recipient: String,
    subject: String,
    html_body: String,
}

impl OutboundMessage {
    pub fn new<R, S, B>(recipient: R, subject: S, html_body: B) -> OutboundMessage
    where
        R: Into<String>,
        S: Into<String>,
        B: Into<String>,
    {
        OutboundMessage {
            recipient: recipient.into(),
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Renders a MIME `text/html` message from `from` to the recipient.
    ///
    /// Fails if the recipient is not a usable address.
    pub fn render(&self, from: &Mailbox) -> Result<SendableEmail, Error> {
        let to: EmailAddress = self.recipient.trim().parse()?;
        let envelope = Envelope::new(Some(from.address().clone()), vec![to.clone()])?;
        let message_id = new_message_id(from.address());

        let mut message = String::with_capacity(self.html_body.len() * 4 / 3 + 512);
        push_header(&mut message, "From", &from.to_string());
        push_header(&mut message, "To", &format!("<{}>", to));
        push_header(&mut message, "Subject", &encode_text(&self.subject));
        push_header(&mut message, "Date", &Utc::now().to_rfc2822());
        push_header(&mut message, "Message-ID", &format!("<{}>", message_id));
        push_header(&mut message, "MIME-Version", "1.0");
        push_header(&mut message, "Content-Type", "text/html; charset=utf-8");
        push_header(&mut message, "Content-Transfer-Encoding", "base64");
        message.push_str("\r\n");

        let encoded = base64::encode(self.html_body.as_bytes());
        for line in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
            // base64 output is ASCII, so every chunk is valid UTF-8
            message.push_str(&String::from_utf8_lossy(line));
            message.push_str("\r\n");
        }

        Ok(SendableEmail::new(envelope, message_id, message))
    }
}

fn push_header(message: &mut String, name: &str, value: &str) {
    message.push_str(name);
    message.push_str(": ");
    message.push_str(value);
    message.push_str("\r\n");
}

fn new_message_id(from: &EmailAddress) -> String {
    let now = Utc::now();
    format!(
        "{}.{}.{}@{}",
        now.timestamp(),
        now.timestamp_subsec_nanos(),
        MESSAGE_COUNTER.fetch_add(1, Ordering::Relaxed),
        from.domain().unwrap_or("localhost")
    )
}

/// Header text with line breaks folded away, as an RFC 2047 encoded-word when it is
/// not plain printable ASCII.
fn encode_text(text: &str) -> String {
    let text: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();

    if text.chars().all(|c| c == ' ' || c.is_ascii_graphic()) {
        text
    } else {
        format!("=?utf-8?b?{}?=", base64::encode(text.as_bytes()))
    }
}

/// A display name: quoted when it holds specials, encoded when it is not ASCII.
fn encode_phrase(name: &str) -> String {
    let encoded = encode_text(name);
    if encoded.starts_with("=?") {
        return encoded;
    }
    if encoded
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || "!#$%&'*+-/=?^_`{|}~".contains(c))
    {
        encoded
    } else {
        format!(
            "\"{}\"",
            encoded.replace('\\', "\\\\").replace('"', "\\\"")
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sender() -> Mailbox {
        Mailbox::new(
            Some("ANDO JV".to_string()),
            "noreply@example.com".parse().unwrap(),
        )
    }

    fn rendered(message: &OutboundMessage) -> String {
        let email = message.render(&sender()).unwrap();
        String::from_utf8(email.message().to_vec()).unwrap()
    }

    #[test]
    fn test_mailbox_display() {
        assert_eq!(sender().to_string(), "ANDO JV <noreply@example.com>");
        let bare = Mailbox::new(Some("  ".to_string()), "a@example.com".parse().unwrap());
        assert_eq!(bare.to_string(), "<a@example.com>");
        let quoted = Mailbox::new(Some("Ops, Inc.".to_string()), "a@example.com".parse().unwrap());
        assert_eq!(quoted.to_string(), "\"Ops, Inc.\" <a@example.com>");
        let encoded = Mailbox::new(Some("Почта".to_string()), "a@example.com".parse().unwrap());
        assert!(encoded.to_string().starts_with("=?utf-8?b?"));
    }

    #[test]
    fn test_render_headers_and_envelope() {
        let message = OutboundMessage::new("a@example.com", "Subj", "<p>hi</p>");
        let email = message.render(&sender()).unwrap();

        assert_eq!(email.envelope().from().unwrap().as_ref(), "noreply@example.com");
        assert_eq!(email.envelope().to()[0].as_ref(), "a@example.com");
        assert!(email.message_id().ends_with("@example.com"));

        let text = String::from_utf8(email.message().to_vec()).unwrap();
        assert!(text.starts_with("From: ANDO JV <noreply@example.com>\r\n"));
        assert!(text.contains("\r\nTo: <a@example.com>\r\n"));
        assert!(text.contains("\r\nSubject: Subj\r\n"));
        assert!(text.contains("\r\nDate: "));
        assert!(text.contains(&format!("\r\nMessage-ID: <{}>\r\n", email.message_id())));
        assert!(text.contains("\r\nContent-Type: text/html; charset=utf-8\r\n"));
        assert!(text.contains("\r\n\r\nPHA+aGk8L3A+\r\n"));
    }

    #[test]
    fn test_render_non_ascii_subject() {
        let message = OutboundMessage::new("a@example.com", "Подтверждение", "<p>код</p>");
        let text = rendered(&message);
        assert!(text.contains(&format!(
            "\r\nSubject: =?utf-8?b?{}?=\r\n",
            base64::encode("Подтверждение".as_bytes())
        )));
    }

    #[test]
    fn test_subject_cannot_inject_headers() {
        let message = OutboundMessage::new("a@example.com", "Hi\r\nBcc: x@evil.example", "x");
        let text = rendered(&message);
        assert!(!text.contains("\r\nBcc:"));
        assert!(text.contains("\r\nSubject: Hi  Bcc: x@evil.example\r\n"));
    }

    #[test]
    fn test_body_lines_are_wrapped() {
        let body = "x".repeat(400);
        let text = rendered(&OutboundMessage::new("a@example.com", "s", body));
        let (_, encoded) = text.split_once("\r\n\r\n").unwrap();
        assert!(encoded
            .split("\r\n")
            .all(|line| line.len() <= BASE64_LINE_LENGTH));
        let joined: String = encoded.split("\r\n").collect();
        assert_eq!(base64::decode(joined).unwrap(), "x".repeat(400).into_bytes());
    }

    #[test]
    fn test_invalid_recipient() {
        for recipient in &["", "a b@example.com", "<a@example.com>", "a@example.com\r\nRCPT"] {
            assert!(matches!(
                OutboundMessage::new(*recipient, "s", "b").render(&sender()),
                Err(Error::InvalidEmailAddress)
            ));
        }
    }

    #[test]
    fn test_message_ids_are_unique() {
        let message = OutboundMessage::new("a@example.com", "s", "b");
        let first = message.render(&sender()).unwrap();
        let second = message.render(&sender()).unwrap();
        assert_ne!(first.message_id(), second.message_id());
    }
}
