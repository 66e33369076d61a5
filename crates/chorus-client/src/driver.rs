//! Async driver.
//!
//! The session is pure; this is where its [`Action`]s meet the world. The
//! driver owns the transport and the external collaborators, executes action
//! lists in order, decodes inbound deliveries at the boundary, and feeds
//! housekeeping ticks. Failures follow the session's taxonomy: reliable
//! sends and directory lookups propagate, best-effort sends and playback
//! calls degrade to a log line.

use std::collections::VecDeque;

use async_trait::async_trait;
use chorus_core::Clock;
use chorus_proto::{Command, Delivery, ServerEvent};
use serde_json::Value;
use thiserror::Error;

use crate::{
    action::Action,
    error::NotReady,
    external::{CredentialProvider, Directory, PlaybackDriver},
    session::Session,
};

/// The persistent, bidirectional named-event channel.
///
/// Implementations surface the transport-level ack of an outbound `ping` as
/// an inbound `("pong", Null)` delivery. `recv` must be cancel-safe: the
/// driver races it against its housekeeping timer.
#[async_trait]
pub trait EventTransport: Send {
    /// Transport-level failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open the channel.
    async fn open(&mut self) -> Result<(), Self::Error>;

    /// Emit one named event. Best-effort sends may be dropped silently by
    /// the implementation when the channel is congested or down.
    async fn send(
        &mut self,
        name: &str,
        payload: Value,
        delivery: Delivery,
    ) -> Result<(), Self::Error>;

    /// Next inbound delivery: `(event name, payload)`. `None` once the
    /// channel is closed for good.
    async fn recv(&mut self) -> Option<(String, Value)>;

    /// Close the channel.
    async fn close(&mut self) -> Result<(), Self::Error>;
}

/// Driver-level failures.
#[derive(Error, Debug)]
pub enum DriverError<E: std::error::Error> {
    /// The session refused the operation; nothing was executed.
    #[error("session not ready: {0}")]
    NotReady(#[from] NotReady),

    /// A reliable send or the channel itself failed.
    #[error("transport failure: {0}")]
    Transport(E),
}

/// Executes session actions against the transport and collaborators.
pub struct SessionDriver<C, T, D, P, B>
where
    C: Clock,
    T: EventTransport,
    D: Directory,
    P: CredentialProvider,
    B: PlaybackDriver,
{
    session: Session<C>,
    transport: T,
    directory: D,
    credentials: P,
    playback: B,
    token: Option<String>,
    notifications: Vec<String>,
}

impl<C, T, D, P, B> SessionDriver<C, T, D, P, B>
where
    C: Clock,
    T: EventTransport,
    D: Directory,
    P: CredentialProvider,
    B: PlaybackDriver,
{
    /// Wire a session to its collaborators.
    pub fn new(session: Session<C>, transport: T, directory: D, credentials: P, playback: B) -> Self {
        Self {
            session,
            transport,
            directory,
            credentials,
            playback,
            token: None,
            notifications: Vec::new(),
        }
    }

    /// The underlying session, for operations and state inspection.
    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    /// Mutable session access: call an operation, then pass its actions to
    /// [`SessionDriver::execute`].
    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    /// The underlying transport (tests inspect what was sent).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Initialize the session: acquire credentials, fetch identity, open the
    /// channel, handshake.
    ///
    /// A missing bearer token means "not ready", not failure.
    pub async fn initialize(&mut self) -> Result<(), DriverError<T::Error>> {
        let Some(token) = self.credentials.bearer_token().await else {
            tracing::info!("no credentials available; initialization deferred");
            return Err(NotReady::MissingCredentials.into());
        };
        self.token = Some(token);

        let actions = self.session.initialize()?;
        self.execute(actions).await
    }

    /// Execute an ordered action list, including any follow-up actions the
    /// session produces while completing lookups.
    pub async fn execute(&mut self, actions: Vec<Action>) -> Result<(), DriverError<T::Error>> {
        let mut pending: VecDeque<Action> = actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                Action::Emit(command) => self.emit(command).await?,
                Action::FetchSelf => {
                    let token = self.token.clone().unwrap_or_default();
                    let result = self.directory.fetch_self(&token).await;
                    pending.extend(self.session.identity_fetched(result));
                },
                Action::FetchRoom { room_id } => {
                    let token = self.token.clone().unwrap_or_default();
                    let result = self.directory.fetch_room(&token, &room_id).await;
                    pending.extend(self.session.room_fetched(result));
                },
                Action::OpenChannel => {
                    self.transport.open().await.map_err(DriverError::Transport)?;
                    pending.extend(self.session.channel_opened());
                },
                Action::CloseChannel => {
                    if let Err(e) = self.transport.close().await {
                        tracing::warn!(error = %e, "channel close failed");
                    }
                },
                Action::Play { track, offset_ms } => self.play(&track, offset_ms).await,
                Action::Pause => self.pause().await,
                Action::Notify { message } => {
                    tracing::warn!(%message, "user notification");
                    self.notifications.push(message);
                },
            }
        }

        Ok(())
    }

    /// Decode and process one inbound delivery.
    ///
    /// Malformed payloads are logged and dropped; later events are
    /// unaffected.
    pub async fn dispatch(
        &mut self,
        name: &str,
        payload: &Value,
    ) -> Result<(), DriverError<T::Error>> {
        match ServerEvent::decode(name, payload) {
            Ok(event) => {
                let actions = self.session.handle(event);
                self.execute(actions).await
            },
            Err(e) => {
                tracing::warn!(error = %e, "undecodable delivery dropped");
                Ok(())
            },
        }
    }

    /// Drive the session until the channel closes.
    ///
    /// Inbound deliveries are processed in transport order; when the channel
    /// stays quiet for a tick interval, the session's housekeeping runs
    /// instead (guard timeouts, probe expiry).
    pub async fn run(&mut self) -> Result<(), DriverError<T::Error>> {
        let tick_interval = self.session.config().tick_interval;

        loop {
            match tokio::time::timeout(tick_interval, self.transport.recv()).await {
                Ok(Some((name, payload))) => self.dispatch(&name, &payload).await?,
                Ok(None) => return Ok(()),
                Err(_quiet) => {
                    let actions = self.session.tick();
                    self.execute(actions).await?;
                },
            }
        }
    }

    /// Drain notifications surfaced since the last call.
    pub fn take_notifications(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notifications)
    }

    async fn emit(&mut self, command: Command) -> Result<(), DriverError<T::Error>> {
        let name = command.name();
        let payload = match command.payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, event = name, "unencodable command dropped");
                return Ok(());
            },
        };

        match command.delivery() {
            Delivery::Reliable => self
                .transport
                .send(name, payload, Delivery::Reliable)
                .await
                .map_err(DriverError::Transport),
            Delivery::BestEffort => {
                if let Err(e) = self.transport.send(name, payload, Delivery::BestEffort).await {
                    tracing::debug!(error = %e, event = name, "best-effort send dropped");
                }
                Ok(())
            },
        }
    }

    /// Start playback, skipping (reported, not fatal) when no device is
    /// available.
    async fn play(&mut self, track: &str, offset_ms: u64) {
        let Some(device) = self.playback.first_available_device().await else {
            tracing::warn!("no playback device available; play skipped");
            self.notifications.push("No playback device available".into());
            return;
        };

        if let Err(e) = self.playback.play(&device, track, offset_ms).await {
            tracing::warn!(error = %e, "playback start failed");
        }
    }

    async fn pause(&mut self) {
        let Some(device) = self.playback.first_available_device().await else {
            tracing::debug!("no playback device available; pause skipped");
            return;
        };

        if let Err(e) = self.playback.pause(&device).await {
            tracing::warn!(error = %e, "playback pause failed");
        }
    }
}
