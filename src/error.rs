//! Errors of an SMTP exchange

use std::io;
use std::string::FromUtf8Error;

use base64::DecodeError;

use crate::response::{Response, Severity};
use crate::runtime::TimeoutError;

/// Anything that can go wrong between opening a connection and closing it.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// 4xx reply
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    #[error("transient: {}", .0.first_line().unwrap_or("no detail given"))]
    Transient(Response),
    /// 5xx reply
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    #[error("permanent: {}", .0.first_line().unwrap_or("no detail given"))]
    Permanent(Response),
    /// Well-formed reply that makes no sense at this point
    #[error("unexpected reply: {}", .0.code)]
    UnexpectedReply(Response),
    /// Reply that is not what the protocol says
    #[error("malformed reply: {0}")]
    Malformed(&'static str),
    /// Reply that could not be parsed at all
    #[error("reply syntax: {0:?}")]
    Syntax(nom::error::ErrorKind),
    /// Authentication challenge that is not base64
    #[error("challenge: {0}")]
    Challenge(#[from] DecodeError),
    /// Authentication challenge that is not UTF-8
    #[error("challenge text: {0}")]
    ChallengeText(#[from] FromUtf8Error),
    /// Login could not go ahead
    #[error("authentication: {0}")]
    Auth(&'static str),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("tls: {0}")]
    Tls(#[from] async_native_tls::Error),
    /// Deadline exceeded while talking to the server
    #[error("timeout: {0}")]
    Timeout(#[from] TimeoutError),
    /// Address rejected before it reached the wire
    #[error("invalid email address")]
    InvalidEmailAddress,
    /// Envelope without recipient
    #[error("missing destination address")]
    MissingTo,
}

impl From<Response> for Error {
    fn from(response: Response) -> Error {
        match response.code.severity {
            Severity::TransientNegativeCompletion => Error::Transient(response),
            Severity::PermanentNegativeCompletion => Error::Permanent(response),
            _ => Error::UnexpectedReply(response),
        }
    }
}

/// SMTP result type
pub type SmtpResult = Result<Response, Error>;
