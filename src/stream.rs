use std::fmt::Display;
use std::string::String;
use std::time::Duration;

use log::debug;

use crate::codec::ClientCodec;
use crate::commands::*;
use crate::error::{Error, SmtpResult};
use crate::extension::ClientId;
use crate::response::parse_response;
use crate::runtime::{maybe_timeout, BufReadExt, BufReader, Read, Write, WriteExt};

/// SMTP stream.
#[derive(Debug)]
pub struct SmtpStream<S: Read + Write + Unpin> {
    /// Inner stream.
    inner: BufReader<S>,
    /// Deadline for each write and each response read.
    timeout: Option<Duration>,
}

impl<S: Read + Write + Unpin> SmtpStream<S> {
    /// Creates new SMTP stream.
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::new(stream),
            timeout: None,
        }
    }

    /// Sets the deadline applied to every exchange with the server.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Returns inner stream.
    ///
    /// Should only be used when there are no unread responses,
    /// because the buffer of `BufReader` may be lost.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }

    /// Borrows the inner stream.
    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Sends EHLO command and returns server response.
    pub async fn ehlo(&mut self, client_id: ClientId) -> SmtpResult {
        // Extended Hello
        let ehlo_response = self.command(EhloCommand::new(client_id)).await?;
        Ok(ehlo_response)
    }

    /// Send the given SMTP command to the server.
    pub async fn command(&mut self, command: impl Display) -> SmtpResult {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Like [`SmtpStream::command`], but keeps the command text out of the logs.
    ///
    /// Used for authentication exchanges.
    pub async fn command_redacted(&mut self, command: impl Display) -> SmtpResult {
        self.write_bytes(command.to_string().as_bytes()).await?;
        debug!(">> <credentials>");
        self.read_response().await
    }

    /// Sends the given SMTP command to the server without waiting for response.
    pub async fn send_command(&mut self, command: impl Display) -> Result<(), Error> {
        self.write(command.to_string().as_bytes()).await?;
        Ok(())
    }

    /// Writes the given data to the server.
    async fn write(&mut self, string: &[u8]) -> Result<(), Error> {
        self.write_bytes(string).await?;

        debug!(
            ">> {}",
            escape_crlf(String::from_utf8_lossy(string).as_ref())
        );
        Ok(())
    }

    async fn write_bytes(&mut self, string: &[u8]) -> Result<(), Error> {
        let stream = self.inner.get_mut();
        maybe_timeout(self.timeout, async {
            stream.write_all(string).await?;
            stream.flush().await
        })
        .await?;
        Ok(())
    }

    /// Read an SMTP response from the wire.
    pub async fn read_response(&mut self) -> SmtpResult {
        let timeout = self.timeout;
        let reader = &mut self.inner;
        let mut buffer = String::with_capacity(100);

        loop {
            let read = maybe_timeout(timeout, reader.read_line(&mut buffer)).await?;
            if read == 0 {
                break;
            }
            debug!("<< {}", escape_crlf(&buffer));
            match parse_response(&buffer) {
                Ok((_remaining, response)) => {
                    if response.is_positive() {
                        return Ok(response);
                    }

                    return Err(response.into());
                }
                Err(nom::Err::Failure(e)) => {
                    return Err(Error::Syntax(e.code));
                }
                Err(nom::Err::Incomplete(_)) => { /* read more */ }
                Err(nom::Err::Error(e)) => {
                    return Err(Error::Syntax(e.code));
                }
            }
        }

        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "incomplete").into())
    }

    /// Sends the message content.
    pub(crate) async fn message(&mut self, message: &[u8]) -> SmtpResult {
        let mut codec = ClientCodec::new();
        let stream = self.inner.get_mut();

        maybe_timeout(self.timeout, async {
            codec.encode(message, &mut *stream).await?;
            codec.finish(&mut *stream).await?;
            stream.flush().await
        })
        .await?;

        debug!(">> <{} bytes of message data>", message.len());

        self.read_response().await
    }
}

/// Returns the string replacing all the CRLF with "\<CRLF\>"
/// Used for debug displays
fn escape_crlf(string: &str) -> String {
    string.replace("\r\n", "<CRLF>")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::async_test;
    use crate::mock::MockStream;

    #[test]
    fn test_escape_crlf() {
        assert_eq!(escape_crlf("\r\n"), "<CRLF>");
        assert_eq!(escape_crlf("EHLO my_name\r\n"), "EHLO my_name<CRLF>");
        assert_eq!(
            escape_crlf("EHLO my_name\r\nSIZE 42\r\n"),
            "EHLO my_name<CRLF>SIZE 42<CRLF>"
        );
    }

    async_test! { test_command_reads_multiline_reply, {
        let mock = MockStream::with_vec(b"250-relay\r\n250 PIPELINING\r\n".to_vec());
        let mut stream = SmtpStream::new(mock);

        let response = stream.command(NoopCommand).await.unwrap();
        assert!(response.has_code(250));
        assert_eq!(response.message, vec!["relay".to_string(), "PIPELINING".to_string()]);
        assert_eq!(stream.get_ref().written(), b"NOOP\r\n".to_vec());
    }}

    async_test! { test_negative_reply_is_error, {
        let mock = MockStream::with_vec(b"421 4.4.2 idle too long\r\n".to_vec());
        let mut stream = SmtpStream::new(mock);

        match stream.command(NoopCommand).await {
            Err(Error::Transient(response)) => assert!(response.has_code(421)),
            other => panic!("unexpected result: {:?}", other),
        }
    }}

    async_test! { test_closed_connection_is_error, {
        let mut stream = SmtpStream::new(MockStream::new());
        assert!(matches!(stream.read_response().await, Err(Error::Io(_))));
    }}

    async_test! { test_message_is_dot_stuffed_and_terminated, {
        let mock = MockStream::with_vec(b"250 queued\r\n".to_vec());
        let mut stream = SmtpStream::new(mock);

        let response = stream.message(b"Subject: x\r\n\r\n.hidden\r\n").await.unwrap();
        assert!(response.has_code(250));
        assert_eq!(
            String::from_utf8(stream.get_ref().written()).unwrap(),
            "Subject: x\r\n\r\n..hidden\r\n.\r\n"
        );
    }}
}
