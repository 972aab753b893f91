//! What the keep-alive manager needs from a live connection.

use async_trait::async_trait;

use crate::error::{Error, SmtpResult};
use crate::runtime::{Read, Write};
use crate::smtp_client::SmtpTransport;
use crate::SendableEmail;

/// An authenticated connection to the submission server.
///
/// A session that returned an error once is presumed dead and is never used again.
#[async_trait]
pub trait Session: Send + Sized {
    /// Transmits one email.
    async fn send(&mut self, email: &SendableEmail) -> SmtpResult;

    /// Checks that the server still answers.
    async fn noop(&mut self) -> SmtpResult;

    /// Ends the session.
    async fn close(self) -> Result<(), Error>;
}

#[async_trait]
impl<S> Session for SmtpTransport<S>
where
    S: Read + Write + Unpin + Send,
{
    async fn send(&mut self, email: &SendableEmail) -> SmtpResult {
        SmtpTransport::send(self, email).await
    }

    async fn noop(&mut self) -> SmtpResult {
        SmtpTransport::noop(self).await
    }

    async fn close(self) -> Result<(), Error> {
        SmtpTransport::close(self).await
    }
}
