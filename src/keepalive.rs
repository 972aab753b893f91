//! The keep-alive manager.
//!
//! [`KeepAlive`] owns at most one [`Session`] behind an async mutex. Callers of
//! [`KeepAlive::send`] take turns on it, a background task probes it with `NOOP`
//! between requests, and any error throws it away. A send is tried at most
//! [`MAX_ATTEMPTS`] times, reconnecting between attempts, and never fails loudly:
//! the caller only learns whether the message went out.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::{ConfigError, ServerEndpoint};
use crate::connector::{Connector, SmtpConnector};
use crate::error::Error;
use crate::message::{Mailbox, OutboundMessage};
use crate::response::Response;
use crate::session::Session;
use crate::SendableEmail;

/// Transmission attempts per [`KeepAlive::send`]
pub const MAX_ATTEMPTS: usize = 2;

/// Default period of the liveness probe
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(20);

/// Shortest keep-alive period accepted by [`KeepAlive::with_connector`]
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Longest keep-alive period accepted by [`KeepAlive::with_connector`]
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Why a session was lost or could not be had
#[derive(thiserror::Error, Debug)]
pub enum KeepAliveError {
    /// No session could be established
    #[error("connect: {0}")]
    Connect(#[source] Error),
    /// The liveness probe failed
    #[error("probe: {0}")]
    Probe(#[source] Error),
    /// The message could not be transmitted
    #[error("transmit: {0}")]
    Transmit(#[source] Error),
    /// The request could not be turned into a message
    #[error("message: {0}")]
    Message(#[source] Error),
}

struct Shared<C: Connector> {
    connector: C,
    session: Mutex<Option<C::Session>>,
    sender: Mailbox,
    interval: Duration,
}

struct Worker {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Keeps one session to the submission server warm and sends through it
pub struct KeepAlive<C: Connector = SmtpConnector> {
    shared: Arc<Shared<C>>,
    worker: Mutex<Option<Worker>>,
}

impl<C: Connector> fmt::Debug for KeepAlive<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("sender", &self.shared.sender)
            .field("interval", &self.shared.interval)
            .field(
                "connected",
                &self.shared.session.try_lock().ok().map(|s| s.is_some()),
            )
            .finish()
    }
}

impl KeepAlive<SmtpConnector> {
    /// A manager talking to `endpoint` through a real SMTP connection.
    ///
    /// Nothing is connected until [`KeepAlive::start`] or the first send.
    pub fn new(endpoint: &ServerEndpoint) -> Result<Self, ConfigError> {
        Ok(KeepAlive::with_connector(
            SmtpConnector::from_endpoint(endpoint),
            endpoint.sender()?,
            endpoint.keepalive_interval(),
        ))
    }
}

impl<C: Connector> KeepAlive<C> {
    /// A manager getting its sessions from `connector`, sending as `sender` and
    /// probing every `interval`.
    ///
    /// `interval` is clamped to [`MIN_INTERVAL`]..=[`MAX_INTERVAL`].
    pub fn with_connector(connector: C, sender: Mailbox, interval: Duration) -> Self {
        let clamped = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        if clamped != interval {
            warn!("keep-alive interval {:?} out of range, using {:?}", interval, clamped);
        }
        let interval = clamped;
        KeepAlive {
            shared: Arc::new(Shared {
                connector,
                session: Mutex::new(None),
                sender,
                interval,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Connects if needed, then starts the probe loop.
    ///
    /// Starting again while the loop runs leaves the running loop alone.
    pub async fn start(&self) -> Result<(), KeepAliveError> {
        {
            let mut slot = self.shared.session.lock().await;
            if slot.is_none() {
                *slot = Some(self.shared.open().await.map_err(KeepAliveError::Connect)?);
            }
        }

        let mut worker = self.worker.lock().await;
        if let Some(ref running) = *worker {
            if !running.handle.is_finished() {
                debug!("probe loop already running");
                return Ok(());
            }
        }

        let (cancel, cancelled) = watch::channel(false);
        let handle = tokio::spawn(probe_loop(self.shared.clone(), cancelled));
        *worker = Some(Worker { cancel, handle });
        info!("probing every {:?}", self.shared.interval);
        Ok(())
    }

    /// Stops the probe loop and closes the session.
    ///
    /// Waits for a probe or send in progress. Fine to call without `start`, or twice.
    pub async fn stop(&self) {
        if let Some(worker) = self.worker.lock().await.take() {
            // the loop may already be gone, nothing to tell it then
            let _ = worker.cancel.send(true);
            if let Err(err) = worker.handle.await {
                warn!("probe loop ended abnormally: {}", err);
            }
        }

        let mut slot = self.shared.session.lock().await;
        if let Some(session) = slot.take() {
            close_quietly(session).await;
            info!("session closed");
        }
    }

    /// Whether a session is currently held
    pub async fn is_connected(&self) -> bool {
        self.shared.session.lock().await.is_some()
    }

    /// Sends an HTML email to `recipient`, reconnecting once if needed.
    ///
    /// Returns whether the server accepted the message. Failures are logged.
    pub async fn send(&self, recipient: &str, subject: &str, html: &str) -> bool {
        let started = Instant::now();

        let message = OutboundMessage::new(recipient, subject, html);
        let email = match message.render(&self.shared.sender) {
            Ok(email) => email,
            Err(err) => {
                warn!("not sending to {:?}: {}", recipient, KeepAliveError::Message(err));
                return false;
            }
        };

        for attempt in 1..=MAX_ATTEMPTS {
            match self.shared.transmit(&email).await {
                Ok(response) => {
                    info!(
                        "{}: sent to <{}> in {:?} ({})",
                        email.message_id(),
                        recipient.trim(),
                        started.elapsed(),
                        response.first_line().unwrap_or("accepted")
                    );
                    return true;
                }
                Err(err) => warn!(
                    "{}: attempt {}/{} failed: {}",
                    email.message_id(),
                    attempt,
                    MAX_ATTEMPTS,
                    err
                ),
            }
        }

        error!(
            "{}: dropped after {} attempts in {:?}",
            email.message_id(),
            MAX_ATTEMPTS,
            started.elapsed()
        );
        false
    }
}

impl<C: Connector> Shared<C> {
    async fn open(&self) -> Result<C::Session, Error> {
        let started = Instant::now();
        let session = self.connector.connect().await?;
        info!("session established in {:?}", started.elapsed());
        Ok(session)
    }

    /// One attempt, holding the lock throughout.
    async fn transmit(&self, email: &SendableEmail) -> Result<Response, KeepAliveError> {
        let mut slot = self.session.lock().await;

        let mut session = match slot.take() {
            Some(session) => session,
            None => self.open().await.map_err(KeepAliveError::Connect)?,
        };

        match session.send(email).await {
            Ok(response) => {
                *slot = Some(session);
                Ok(response)
            }
            Err(err) => {
                close_quietly(session).await;
                Err(KeepAliveError::Transmit(err))
            }
        }
    }

    /// Probes the held session, replacing it if it does not answer.
    async fn probe(&self, slot: &mut Option<C::Session>) {
        let mut session = match slot.take() {
            Some(session) => session,
            None => {
                debug!("no session to probe");
                return;
            }
        };

        match session.noop().await {
            Ok(_) => {
                debug!("probe ok");
                *slot = Some(session);
            }
            Err(err) => {
                warn!("{}", KeepAliveError::Probe(err));
                close_quietly(session).await;
                match self.open().await {
                    Ok(session) => *slot = Some(session),
                    Err(err) => warn!(
                        "{}, next send will retry",
                        KeepAliveError::Connect(err)
                    ),
                }
            }
        }
    }
}

async fn probe_loop<C: Connector>(shared: Arc<Shared<C>>, mut cancelled: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + shared.interval, shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = cancelled.changed() => {
                // sender dropped along with the manager
                if changed.is_err() {
                    break;
                }
            }
        }
        if is_cancelled(&cancelled) {
            break;
        }

        let mut slot = shared.session.lock().await;
        if is_cancelled(&cancelled) {
            break;
        }
        shared.probe(&mut slot).await;
    }

    debug!("probe loop stopped");
}

fn is_cancelled(cancelled: &watch::Receiver<bool>) -> bool {
    *cancelled.borrow()
}

async fn close_quietly<S: Session>(session: S) {
    if let Err(err) = session.close().await {
        warn!("closing session: {}", err);
    }
}
