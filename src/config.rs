//! Endpoint configuration, read once at startup.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then the
//! environment. The environment uses the variables the relay has always used:
//!
//! | variable                  | key                  | default |
//! | ------------------------- | -------------------- | ------- |
//! | `SMTP_HOST`               | `host`               |         |
//! | `SMTP_PORT`               | `port`               | 465     |
//! | `SMTP_USER`               | `user`               |         |
//! | `SMTP_PASS`               | `pass`               |         |
//! | `SENDER_NAME`             | `sender_name`        | empty   |
//! | `SMTP_TLS`                | `tls`                | true    |
//! | `SMTP_CONNECT_TIMEOUT`    | `connect_timeout`    | 20      |
//! | `SMTP_COMMAND_TIMEOUT`    | `command_timeout`    | 60      |
//! | `SMTP_KEEPALIVE_INTERVAL` | `keepalive_interval` | 20      |
//! | `SMTP_HELLO_NAME`         | `hello_name`         | hostname |
//!
//! Host, user, password, sender name and hello name are taken verbatim, so a
//! password of `123456` or `true` stays a string. The other variables are parsed.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde_derive::Deserialize;

use crate::authentication::Credentials;
use crate::message::Mailbox;
use crate::EmailAddress;

/// Default submission over TLS port
pub const SUBMISSIONS_PORT: u16 = 465;

const DEFAULT_CONNECT_TIMEOUT: u64 = 20;
const DEFAULT_COMMAND_TIMEOUT: u64 = 60;
const DEFAULT_KEEPALIVE_INTERVAL: u64 = 20;

/// Variables read as plain text, and the key each one sets
const TEXT_VARS: &[(&str, &str)] = &[
    ("SMTP_HOST", "host"),
    ("SMTP_USER", "user"),
    ("SMTP_PASS", "pass"),
    ("SMTP_HELLO_NAME", "hello_name"),
    ("SENDER_NAME", "sender_name"),
];

/// Configuration could not be loaded
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Missing or malformed value
    #[error("config: {0}")]
    Figment(#[from] Box<figment::Error>),
    /// `user` is used as the sender address and must be one
    #[error("config: user {0:?} is not a usable sender address")]
    InvalidSender(String),
    /// A keep-alive interval of zero
    #[error("config: keepalive_interval must be at least one second")]
    ZeroInterval,
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}

/// The mail submission server and the account used on it
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ServerEndpoint {
    /// Server host name, also the name checked against its certificate
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name, also the sender address
    #[serde(rename = "user")]
    pub username: String,
    /// Login password
    #[serde(rename = "pass")]
    pub secret: String,
    /// Display name of the sender
    #[serde(rename = "sender_name", default)]
    pub display_name: String,
    /// Whether the connection is TLS-wrapped
    #[serde(default = "default_tls")]
    pub tls: bool,
    /// Bound on connecting and logging in, in seconds
    #[serde(rename = "connect_timeout", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Bound on each command exchange of a live session, in seconds
    #[serde(rename = "command_timeout", default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Period of the keep-alive probe, in seconds
    #[serde(rename = "keepalive_interval", default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Name sent in EHLO, defaults to the machine's hostname
    #[serde(default)]
    pub hello_name: Option<String>,
}

fn default_port() -> u16 {
    SUBMISSIONS_PORT
}

fn default_tls() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT
}

fn default_keepalive_interval() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL
}

impl fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("tls", &self.tls)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .field("keepalive_interval_secs", &self.keepalive_interval_secs)
            .field("hello_name", &self.hello_name)
            .finish()
    }
}

impl ServerEndpoint {
    /// An endpoint with default port, timeouts and TLS
    pub fn new<H, U, S>(host: H, username: U, secret: S) -> ServerEndpoint
    where
        H: Into<String>,
        U: Into<String>,
        S: Into<String>,
    {
        ServerEndpoint {
            host: host.into(),
            port: SUBMISSIONS_PORT,
            username: username.into(),
            secret: secret.into(),
            display_name: String::new(),
            tls: true,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL,
            hello_name: None,
        }
    }

    /// The providers consulted by [`ServerEndpoint::from_env`]
    pub fn figment() -> Figment {
        let typed = Env::prefixed("SMTP_").ignore(&["host", "user", "pass", "hello_name"]);
        TEXT_VARS
            .iter()
            .fold(Figment::new().merge(typed), |figment, &(var, key)| {
                match std::env::var(var) {
                    Ok(value) => figment.merge(Serialized::default(key, value)),
                    Err(_) => figment,
                }
            })
    }

    /// Loads the endpoint from the environment.
    pub fn from_env() -> Result<ServerEndpoint, ConfigError> {
        Self::extract(Self::figment())
    }

    /// Loads the endpoint from a TOML file, with the environment taking precedence.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ServerEndpoint, ConfigError> {
        Self::extract(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Self::figment()),
        )
    }

    fn extract(figment: Figment) -> Result<ServerEndpoint, ConfigError> {
        let endpoint: ServerEndpoint = figment.extract()?;
        if endpoint.keepalive_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        endpoint.sender()?;
        Ok(endpoint)
    }

    /// The `From` mailbox: display name and login address
    pub fn sender(&self) -> Result<Mailbox, ConfigError> {
        let address: EmailAddress = self
            .username
            .parse()
            .map_err(|_| ConfigError::InvalidSender(self.username.clone()))?;
        Ok(Mailbox::new(Some(self.display_name.clone()), address))
    }

    /// Login credentials
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.secret.clone())
    }

    /// Bound on connecting and logging in
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Bound on each command exchange of a live session
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Period of the keep-alive probe
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}
