//! A warm SMTP submission channel.
//!
//! [`KeepAlive`] holds one authenticated session to the mail server, probes it
//! between requests so silent disconnects are noticed early, and funnels every
//! send through it with one reconnect-and-retry on failure.
//!
//! ```rust,no_run
//! use keepalive_smtp::{KeepAlive, ServerEndpoint};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = ServerEndpoint::from_env()?;
//! let mailer = KeepAlive::new(&endpoint)?;
//! mailer.start().await?;
//!
//! let sent = mailer
//!     .send("user@example.com", "Your code", "<p>123456</p>")
//!     .await;
//!
//! mailer.stop().await;
//! # let _ = sent;
//! # Ok(())
//! # }
//! ```

#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    missing_debug_implementations,
    clippy::unwrap_used
)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod authentication;
mod codec;
pub mod commands;
pub mod config;
pub mod connector;
pub mod error;
pub mod extension;
pub mod keepalive;
pub mod message;
pub mod mock;
pub mod net;
pub mod response;
mod runtime;
pub mod session;
pub mod smtp_client;
pub mod stream;
mod types;

pub use types::*;

pub use crate::config::{ConfigError, ServerEndpoint};
pub use crate::connector::{Connector, SmtpConnector};
pub use crate::keepalive::{KeepAlive, KeepAliveError};
pub use crate::message::{Mailbox, OutboundMessage};
pub use crate::net::{ClientSecurity, ClientTlsParameters};
pub use crate::session::Session;
pub use crate::smtp_client::{SmtpClient, SmtpTransport};

/// Declares an async test on the tokio runtime.
#[doc(hidden)]
#[macro_export]
macro_rules! async_test {
    ($name:ident, $block:block) => {
        #[tokio::test]
        async fn $name() $block
    };
}
