use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::Error;

/// A bare mailbox address, safe to put between `<` and `>` on the wire.
///
/// Only what could break the command syntax is rejected, the server judges the rest.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct EmailAddress(String);

fn breaks_command(c: char) -> bool {
    !c.is_ascii() || c.is_ascii_control() || c.is_ascii_whitespace() || matches!(c, '<' | '>')
}

impl EmailAddress {
    pub fn new(address: String) -> Result<EmailAddress, Error> {
        if address.is_empty() || address.chars().any(breaks_command) {
            return Err(Error::InvalidEmailAddress);
        }
        Ok(EmailAddress(address))
    }

    /// The part after the last `@`, if any
    pub fn domain(&self) -> Option<&str> {
        self.0.rsplit_once('@').map(|(_, domain)| domain)
    }
}

impl FromStr for EmailAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmailAddress::new(s.to_string())
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Who the server is told the message is from and for
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Envelope {
    sender: Option<EmailAddress>,
    recipients: Vec<EmailAddress>,
}

impl Envelope {
    /// Fails without recipients. A missing sender is the null reverse path `<>`.
    pub fn new(from: Option<EmailAddress>, to: Vec<EmailAddress>) -> Result<Envelope, Error> {
        if to.is_empty() {
            return Err(Error::MissingTo);
        }
        Ok(Envelope {
            sender: from,
            recipients: to,
        })
    }

    pub fn to(&self) -> &[EmailAddress] {
        &self.recipients
    }

    pub fn from(&self) -> Option<&EmailAddress> {
        self.sender.as_ref()
    }
}

/// A rendered message with its envelope
///
/// The message is kept in memory so the same email can be offered to a
/// second session when the first one turns out to be dead.
#[derive(Clone, Debug)]
pub struct SendableEmail {
    envelope: Envelope,
    message_id: String,
    message: Vec<u8>,
}

impl SendableEmail {
    pub fn new<S: AsRef<str>, T: AsRef<[u8]>>(
        envelope: Envelope,
        message_id: S,
        message: T,
    ) -> SendableEmail {
        SendableEmail {
            envelope,
            message_id: message_id.as_ref().into(),
            message: message.as_ref().to_vec(),
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }
}
