use std::time::Duration;

use log::{debug, info};

use crate::authentication::{Credentials, Mechanism};
use crate::commands::*;
use crate::error::{Error, SmtpResult};
use crate::extension::{ClientId, Extension, MailBodyParameter, MailParameter, ServerInfo};
use crate::runtime::{timeout, Read, Write, WriteExt};
use crate::stream::SmtpStream;
use crate::SendableEmail;

/// How long a polite `QUIT` may take before the connection is just dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Contains client configuration
#[derive(Debug, Clone)]
pub struct SmtpClient {
    /// Name sent during EHLO
    hello_name: ClientId,
    /// Deadline for each command exchange once connected
    timeout: Option<Duration>,
}

impl Default for SmtpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the SMTP `SmtpTransport`
impl SmtpClient {
    /// Creates a new SMTP client.
    ///
    /// It does not connect to the server, but only creates the `SmtpTransport`.
    ///
    /// Defaults are:
    ///
    /// * The machine's hostname in EHLO
    /// * A 60 seconds timeout for smtp commands
    pub fn new() -> Self {
        SmtpClient {
            hello_name: Default::default(),
            timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Set the name used during EHLO
    pub fn hello_name(self, name: ClientId) -> SmtpClient {
        Self {
            hello_name: name,
            ..self
        }
    }

    /// Set the timeout applied to each command exchange
    pub fn timeout(self, timeout: Option<Duration>) -> SmtpClient {
        Self { timeout, ..self }
    }
}

/// Structure that implements the high level SMTP client
#[derive(Debug)]
pub struct SmtpTransport<S: Read + Write + Unpin> {
    /// Information about the server
    server_info: ServerInfo,
    /// Information about the client
    client_info: SmtpClient,
    /// Low level client
    stream: SmtpStream<S>,
    /// Set once a login exchange succeeded
    authenticated: bool,
}

impl<S: Read + Write + Unpin> SmtpTransport<S> {
    /// Creates a new SMTP transport over an established stream.
    ///
    /// Reads the greeting and sends EHLO.
    pub async fn new(builder: SmtpClient, stream: S) -> Result<Self, Error> {
        let mut stream = SmtpStream::new(stream);
        stream.set_timeout(builder.timeout);
        let _greeting = stream.read_response().await?;
        let ehlo_response = stream.ehlo(builder.hello_name.clone()).await?;
        let server_info = ServerInfo::from_response(&ehlo_response)?;

        // Print server information
        debug!("server {}", server_info);

        let transport = SmtpTransport {
            server_info,
            client_info: builder,
            stream,
            authenticated: false,
        };
        Ok(transport)
    }

    /// Information the server gave in its EHLO reply
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Whether a login exchange completed on this connection
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Borrows the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Try to login with the given accepted mechanisms.
    ///
    /// An empty list of accepted mechanisms skips authentication. Otherwise the first
    /// mechanism the server advertises is used, and it is an error if there is none.
    pub async fn try_login(
        &mut self,
        credentials: &Credentials,
        accepted_mechanisms: &[Mechanism],
    ) -> Result<(), Error> {
        if accepted_mechanisms.is_empty() {
            info!("No authentication mechanism accepted, skipping login");
            return Ok(());
        }

        match accepted_mechanisms
            .iter()
            .find(|mechanism| self.server_info.supports_auth_mechanism(**mechanism))
        {
            Some(mechanism) => {
                self.auth(*mechanism, credentials).await?;
                self.authenticated = true;
                debug!("authenticated as {} using {}", credentials.username(), mechanism);
                Ok(())
            }
            None => Err(Error::Auth("no accepted mechanism offered by the server")),
        }
    }

    fn supports_feature(&self, keyword: Extension) -> bool {
        self.server_info.supports_feature(keyword)
    }

    /// Closes the SMTP transaction if possible.
    pub async fn quit(&mut self) -> Result<(), Error> {
        self.stream.command(QuitCommand).await?;

        Ok(())
    }

    /// Sends `NOOP`, checking that the server still answers.
    pub async fn noop(&mut self) -> SmtpResult {
        self.stream.command(NoopCommand).await
    }

    /// Says goodbye and shuts the connection down.
    ///
    /// `QUIT` is bounded by a short deadline, the stream is shut down either way.
    pub async fn close(mut self) -> Result<(), Error> {
        let quit = timeout(CLOSE_TIMEOUT, self.quit()).await;
        let mut stream = self.stream.into_inner();
        let shutdown = stream.shutdown().await;
        quit??;
        shutdown?;
        Ok(())
    }

    /// Sends an AUTH command with the given mechanism, and handles challenge if needed
    pub async fn auth(&mut self, mechanism: Mechanism, credentials: &Credentials) -> SmtpResult {
        let mut challenges = 10;
        let mut response = self
            .stream
            .command_redacted(AuthCommand::new(mechanism, credentials.clone(), None)?)
            .await?;

        while challenges > 0 && response.has_code(334) {
            challenges -= 1;
            response = self
                .stream
                .command_redacted(AuthCommand::new_from_response(
                    mechanism,
                    credentials.clone(),
                    &response,
                )?)
                .await?;
        }

        if response.has_code(334) {
            Err(Error::Malformed("Unexpected number of challenges"))
        } else {
            Ok(response)
        }
    }

    /// Sends an email.
    pub async fn send(&mut self, email: &SendableEmail) -> SmtpResult {
        // Mail
        let mut mail_options = vec![];

        if self.supports_feature(Extension::EightBitMime) {
            mail_options.push(MailParameter::Body(MailBodyParameter::EightBitMime));
        }

        if self.supports_feature(Extension::Pipelining) {
            self.stream
                .send_command(MailCommand::new(
                    email.envelope().from().cloned(),
                    mail_options,
                ))
                .await?;
            let mut sent_commands = 1;

            // Recipient
            for to_address in email.envelope().to() {
                self.stream
                    .send_command(RcptCommand::new(to_address.clone()))
                    .await?;
                sent_commands += 1;
            }

            // Data
            self.stream.send_command(DataCommand).await?;
            sent_commands += 1;

            for _ in 0..sent_commands {
                self.stream.read_response().await?;
            }
        } else {
            self.stream
                .command(MailCommand::new(
                    email.envelope().from().cloned(),
                    mail_options,
                ))
                .await?;

            // Recipient
            for to_address in email.envelope().to() {
                self.stream
                    .command(RcptCommand::new(to_address.clone()))
                    .await?;
                // Log the rcpt command
                debug!("{}: to=<{}>", email.message_id(), to_address);
            }

            // Data
            self.stream.command(DataCommand).await?;
        }

        let res = self.stream.message(email.message()).await;

        // Message content
        if let Ok(result) = &res {
            // Log the message
            debug!(
                "{}: status=sent ({})",
                email.message_id(),
                result.first_line().unwrap_or("no response")
            );
        }

        res
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::async_test;
    use crate::mock::MockStream;
    use crate::Envelope;

    const GREETING_AND_EHLO: &[u8] =
        b"220 mx.example ESMTP\r\n250-mx.example\r\n250-8BITMIME\r\n250 AUTH LOGIN PLAIN\r\n";

    fn client() -> SmtpClient {
        SmtpClient::new().hello_name(ClientId::new("relay.local".to_string()))
    }

    fn email() -> SendableEmail {
        SendableEmail::new(
            Envelope::new(
                Some("noreply@example.com".parse().unwrap()),
                vec!["a@example.com".parse().unwrap()],
            )
            .unwrap(),
            "id",
            "Subject: hi\r\n\r\nhello\r\n",
        )
    }

    async_test! { test_new_reads_greeting_and_ehlo, {
        let transport = SmtpTransport::new(client(), MockStream::with_vec(GREETING_AND_EHLO.to_vec()))
            .await
            .unwrap();

        assert_eq!(transport.server_info().name, "mx.example");
        assert!(transport.server_info().supports_feature(Extension::EightBitMime));
        assert!(!transport.is_authenticated());
        assert_eq!(transport.get_ref().written(), b"EHLO relay.local\r\n".to_vec());
    }}

    async_test! { test_login_prefers_first_accepted_mechanism, {
        let mut replies = GREETING_AND_EHLO.to_vec();
        replies.extend_from_slice(b"235 2.7.0 accepted\r\n");
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        let credentials = Credentials::new("user".to_string(), "password".to_string());
        transport
            .try_login(&credentials, &[Mechanism::Plain, Mechanism::Login])
            .await
            .unwrap();

        assert!(transport.is_authenticated());
        let written = String::from_utf8(transport.get_ref().written()).unwrap();
        assert!(written.ends_with("AUTH PLAIN AHVzZXIAcGFzc3dvcmQ=\r\n"));
    }}

    async_test! { test_login_challenge_response, {
        let mut replies = GREETING_AND_EHLO.to_vec();
        replies.extend_from_slice(b"334 VXNlcm5hbWU6\r\n334 UGFzc3dvcmQ6\r\n235 ok\r\n");
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        let credentials = Credentials::new("user".to_string(), "password".to_string());
        transport.try_login(&credentials, &[Mechanism::Login]).await.unwrap();

        let written = String::from_utf8(transport.get_ref().written()).unwrap();
        assert!(written.ends_with("AUTH LOGIN\r\ndXNlcg==\r\ncGFzc3dvcmQ=\r\n"));
    }}

    async_test! { test_login_accepts_after_ten_challenges, {
        let mut replies = GREETING_AND_EHLO.to_vec();
        for _ in 0..10 {
            replies.extend_from_slice(b"334 VXNlcm5hbWU6\r\n");
        }
        replies.extend_from_slice(b"235 ok\r\n");
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        let credentials = Credentials::new("user".to_string(), "password".to_string());
        let response = transport.auth(Mechanism::Login, &credentials).await.unwrap();
        assert!(response.has_code(235));
    }}

    async_test! { test_login_gives_up_after_ten_challenges, {
        let mut replies = GREETING_AND_EHLO.to_vec();
        for _ in 0..11 {
            replies.extend_from_slice(b"334 VXNlcm5hbWU6\r\n");
        }
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        let credentials = Credentials::new("user".to_string(), "password".to_string());
        assert!(matches!(
            transport.auth(Mechanism::Login, &credentials).await,
            Err(Error::Malformed(_))
        ));
    }}

    async_test! { test_login_rejected, {
        let mut replies = GREETING_AND_EHLO.to_vec();
        replies.extend_from_slice(b"535 5.7.8 bad credentials\r\n");
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        let credentials = Credentials::new("user".to_string(), "nope".to_string());
        assert!(matches!(
            transport.try_login(&credentials, &[Mechanism::Plain]).await,
            Err(Error::Permanent(_))
        ));
        assert!(!transport.is_authenticated());
    }}

    async_test! { test_login_without_common_mechanism, {
        let replies = b"220 mx\r\n250 mx.example\r\n".to_vec();
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        let credentials = Credentials::new("user".to_string(), "password".to_string());
        assert!(transport.try_login(&credentials, &[Mechanism::Plain]).await.is_err());
        assert!(transport.try_login(&credentials, &[]).await.is_ok());
    }}

    async_test! { test_send, {
        let mut replies = GREETING_AND_EHLO.to_vec();
        replies.extend_from_slice(b"250 ok\r\n250 ok\r\n354 go ahead\r\n250 queued as 1\r\n");
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        let response = transport.send(&email()).await.unwrap();
        assert!(response.has_code(250));

        let written = String::from_utf8(transport.get_ref().written()).unwrap();
        assert_eq!(
            written,
            "EHLO relay.local\r\n\
             MAIL FROM:<noreply@example.com> BODY=8BITMIME\r\n\
             RCPT TO:<a@example.com>\r\n\
             DATA\r\n\
             Subject: hi\r\n\r\nhello\r\n.\r\n"
        );
    }}

    async_test! { test_send_pipelined, {
        let mut replies =
            b"220 mx\r\n250-mx.example\r\n250 PIPELINING\r\n".to_vec();
        replies.extend_from_slice(b"250 ok\r\n250 ok\r\n354 go ahead\r\n250 queued\r\n");
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        assert!(transport.send(&email()).await.is_ok());

        let written = String::from_utf8(transport.get_ref().written()).unwrap();
        assert!(written.starts_with(
            "EHLO relay.local\r\n\
             MAIL FROM:<noreply@example.com>\r\n\
             RCPT TO:<a@example.com>\r\n\
             DATA\r\n"
        ));
    }}

    async_test! { test_send_rejected_recipient, {
        let mut replies = GREETING_AND_EHLO.to_vec();
        replies.extend_from_slice(b"250 ok\r\n550 5.1.1 unknown user\r\n");
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        assert!(matches!(
            transport.send(&email()).await,
            Err(Error::Permanent(_))
        ));
    }}

    async_test! { test_noop_on_dead_connection, {
        let mut transport = SmtpTransport::new(client(), MockStream::with_vec(GREETING_AND_EHLO.to_vec()))
            .await
            .unwrap();

        assert!(transport.noop().await.is_err());
    }}

    async_test! { test_close_sends_quit, {
        let mut replies = GREETING_AND_EHLO.to_vec();
        replies.extend_from_slice(b"221 bye\r\n");
        let transport = SmtpTransport::new(client(), MockStream::with_vec(replies))
            .await
            .unwrap();

        assert!(transport.close().await.is_ok());
    }}
}
