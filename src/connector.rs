//! Opening new sessions to the submission server.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::authentication::{
    Credentials, Mechanism, DEFAULT_ENCRYPTED_MECHANISMS, DEFAULT_UNENCRYPTED_MECHANISMS,
};
use crate::config::ServerEndpoint;
use crate::error::Error;
use crate::extension::ClientId;
use crate::net::{ClientSecurity, ClientTlsParameters, NetworkStream};
use crate::runtime::timeout;
use crate::session::Session;
use crate::smtp_client::{SmtpClient, SmtpTransport};

/// Creates ready-to-use sessions.
///
/// Every call makes a brand new connection; failures are never retried here.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The session type handed out
    type Session: Session + 'static;

    /// Connects, greets and logs in.
    async fn connect(&self) -> Result<Self::Session, Error>;
}

/// Connects to a real SMTP server over TCP, TLS-wrapped or not
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    host: String,
    port: u16,
    security: ClientSecurity,
    credentials: Option<Credentials>,
    /// Optional enforced authentication mechanisms
    authentication_mechanism: Option<Vec<Mechanism>>,
    client: SmtpClient,
    connect_timeout: Duration,
}

impl SmtpConnector {
    /// Creates a connector without credentials.
    ///
    /// Defaults are:
    ///
    /// * No authentication
    /// * A 20 seconds bound on connecting, greeting, EHLO and login together
    /// * The defaults of [`SmtpClient::new`] once connected
    pub fn new<H: Into<String>>(host: H, port: u16, security: ClientSecurity) -> SmtpConnector {
        SmtpConnector {
            host: host.into(),
            port,
            security,
            credentials: None,
            authentication_mechanism: None,
            client: SmtpClient::new(),
            connect_timeout: Duration::from_secs(20),
        }
    }

    /// The connector described by `endpoint`
    pub fn from_endpoint(endpoint: &ServerEndpoint) -> SmtpConnector {
        let security = if endpoint.tls {
            ClientSecurity::Wrapper(ClientTlsParameters::with_default_roots(
                endpoint.host.clone(),
            ))
        } else {
            ClientSecurity::None
        };

        let mut client = SmtpClient::new().timeout(Some(endpoint.command_timeout()));
        if let Some(ref name) = endpoint.hello_name {
            client = client.hello_name(ClientId::new(name.clone()));
        }

        SmtpConnector::new(endpoint.host.clone(), endpoint.port, security)
            .credentials(endpoint.credentials())
            .client(client)
            .connect_timeout(endpoint.connect_timeout())
    }

    /// Set the client credentials
    pub fn credentials<S: Into<Credentials>>(mut self, credentials: S) -> SmtpConnector {
        self.credentials = Some(credentials.into());
        self
    }

    /// Set the authentication mechanisms to try, in order
    pub fn authentication_mechanism(mut self, mechanism: Vec<Mechanism>) -> SmtpConnector {
        self.authentication_mechanism = Some(mechanism);
        self
    }

    /// Set the client settings used once connected
    pub fn client(mut self, client: SmtpClient) -> SmtpConnector {
        self.client = client;
        self
    }

    /// Set the bound on establishing a session
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> SmtpConnector {
        self.connect_timeout = connect_timeout;
        self
    }

    fn accepted_mechanisms(&self) -> &[Mechanism] {
        match self.authentication_mechanism {
            Some(ref mechanism) => mechanism,
            None => {
                if self.security.is_encrypted() {
                    DEFAULT_ENCRYPTED_MECHANISMS
                } else {
                    DEFAULT_UNENCRYPTED_MECHANISMS
                }
            }
        }
    }

    async fn establish(&self) -> Result<SmtpTransport<NetworkStream>, Error> {
        let stream = NetworkStream::connect(&self.host, self.port, None, &self.security).await?;
        let mut transport = SmtpTransport::new(self.client.clone(), stream).await?;

        if let Some(ref credentials) = self.credentials {
            transport
                .try_login(credentials, self.accepted_mechanisms())
                .await?;
        }

        Ok(transport)
    }
}

#[async_trait]
impl Connector for SmtpConnector {
    type Session = SmtpTransport<NetworkStream>;

    async fn connect(&self) -> Result<Self::Session, Error> {
        debug!("connecting to {}:{}", self.host, self.port);
        timeout(self.connect_timeout, self.establish()).await?
    }
}
