//! Session controller.
//!
//! Owns the single session of this process and the keep-alive task that
//! maintains it. The controller is an explicit object injected through
//! `AppState`, so tests build isolated instances around a mock adapter.
//!
//! # Serialization
//!
//! - `configure` holds the task slot for its whole run: it stops the running
//!   keep-alive task (waiting for an in-flight tick) before touching the
//!   session, and concurrent `configure` calls queue behind each other
//! - the body of `configure` runs in its own task, so a dropped caller (a
//!   request timeout or client disconnect) never leaves the slot empty or
//!   aborts an upstream call midway
//! - `tick` takes the tick guard with `try_lock`, so overlapping ticks are
//!   skipped rather than queued
//! - `status` only takes a short read lock and never performs network I/O

use crate::errors::PkError;
use crate::models::{ExternalIdentity, SessionSnapshot};
use crate::observability::metrics::{record_reconnect, set_session_connected};
use crate::services::upstream::PresenceAdapter;
use crate::tasks::keep_alive::KeepAliveHandle;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Instrument};

/// Controller tuning taken from service configuration.
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    /// Keep-alive tick interval.
    pub heartbeat_interval: Duration,

    /// Failed ticks tolerated before re-running the join sequence.
    pub max_retries: u32,
}

/// Mutable session record.
struct Session {
    credential: Option<SecretString>,
    room_id: Option<String>,
    identity: Option<ExternalIdentity>,
    connected: bool,
    last_heartbeat_at: Option<DateTime<Utc>>,
    last_report_at: Option<DateTime<Utc>>,
    retry_count: u32,
    started_at: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        Self {
            credential: None,
            room_id: None,
            identity: None,
            connected: false,
            last_heartbeat_at: None,
            last_report_at: None,
            retry_count: 0,
            started_at: Utc::now(),
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            is_connected: self.connected,
            last_heartbeat: self.last_heartbeat_at,
            last_report: self.last_report_at,
            room_id: self.room_id.clone(),
            user_id: self.identity.as_ref().map(|i| i.user_id.clone()),
            nickname: self.identity.as_ref().map(|i| i.display_name.clone()),
            retry_count: self.retry_count,
            start_time: self.started_at,
            uptime: (now - self.started_at).num_seconds().max(0),
        }
    }
}

/// Everything a tick needs, copied out of the session.
struct KeepAliveTarget {
    credential: SecretString,
    room_id: String,
    identity: ExternalIdentity,
    connected: bool,
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Credential, room or identity missing.
    NotConfigured,
    /// Another tick is still running.
    InFlight,
}

/// Result of one keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// Ping and report both succeeded.
    Healthy,
    /// Ping or report failed; retry budget not yet exhausted.
    Degraded { retry_count: u32 },
    Reconnected,
    ReconnectFailed,
}

impl TickOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::Skipped(_) => "skipped",
            TickOutcome::Healthy => "healthy",
            TickOutcome::Degraded { .. } => "degraded",
            TickOutcome::Reconnected => "reconnected",
            TickOutcome::ReconnectFailed => "reconnect_failed",
        }
    }
}

/// Session controller.
pub struct SessionController {
    adapter: Arc<dyn PresenceAdapter>,
    settings: ControllerSettings,
    session: RwLock<Session>,
    /// Held by a running tick, and by `configure` while it mutates the session.
    tick_guard: Mutex<()>,
    /// Running keep-alive task, if any. Held for the duration of `configure`.
    keep_alive: Mutex<Option<KeepAliveHandle>>,
    /// Parent of every keep-alive task token.
    shutdown_token: CancellationToken,
}

impl SessionController {
    pub fn new(adapter: Arc<dyn PresenceAdapter>, settings: ControllerSettings) -> Self {
        Self {
            adapter,
            settings,
            session: RwLock::new(Session::new()),
            tick_guard: Mutex::new(()),
            keep_alive: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Validate the credential, join `room_id`, and (re)start the keep-alive task.
    ///
    /// # Errors
    ///
    /// - `PkError::InvalidInput` if either input is blank; nothing changes
    /// - `PkError::Authentication` if the identity lookup fails; the session
    ///   is marked disconnected and otherwise left as it was
    /// - The join error if the bootstrap pipeline fails; the session keeps
    ///   the new credential and room but is marked disconnected
    /// - `PkError::Internal` if the configuration task panicked
    ///
    /// Dropping the returned future does not cancel the configuration.
    #[instrument(skip(self, credential), name = "pk.controller.configure")]
    pub async fn configure(
        self: &Arc<Self>,
        credential: SecretString,
        room_id: &str,
    ) -> Result<SessionSnapshot, PkError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(PkError::InvalidInput("roomId is required".to_string()));
        }
        let cookie = credential.expose_secret().trim();
        if cookie.is_empty() {
            return Err(PkError::InvalidInput("cookie is required".to_string()));
        }
        let credential = SecretString::from(cookie.to_string());

        let controller = Arc::clone(self);
        let room_id = room_id.to_string();
        tokio::spawn(
            async move { controller.apply_configuration(credential, &room_id).await }
                .in_current_span(),
        )
        .await
        .map_err(|e| {
            error!(target: "pk.controller", error = %e, "Configuration task failed");
            PkError::Internal
        })?
    }

    async fn apply_configuration(
        self: &Arc<Self>,
        credential: SecretString,
        room_id: &str,
    ) -> Result<SessionSnapshot, PkError> {
        let mut slot = self.keep_alive.lock().await;
        if let Some(handle) = slot.take() {
            info!(target: "pk.controller", "Stopping keep-alive task for reconfiguration");
            handle.stop().await;
        }

        let tick_guard = self.tick_guard.lock().await;

        let identity = match self.adapter.lookup_identity(&credential).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(target: "pk.controller", error = %e, "Identity lookup failed");
                self.session.write().await.connected = false;
                set_session_connected(false);
                return Err(PkError::Authentication(e.to_string()));
            }
        };

        info!(
            target: "pk.controller",
            user_id = %identity.user_id,
            room_id = %room_id,
            "Identity verified, joining room"
        );

        {
            let mut session = self.session.write().await;
            session.credential = Some(credential.clone());
            session.room_id = Some(room_id.to_string());
            session.identity = Some(identity.clone());
            session.connected = false;
            session.retry_count = 0;
        }

        let outcome = match self
            .adapter
            .join_room(room_id, &credential, &identity)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(target: "pk.controller", error = %e, "Join sequence failed");
                self.session.write().await.connected = false;
                set_session_connected(false);
                return Err(e);
            }
        };

        {
            let mut session = self.session.write().await;
            session.connected = true;
            session.retry_count = 0;
            if outcome.reported() {
                session.last_report_at = Some(Utc::now());
            }
        }
        set_session_connected(true);
        drop(tick_guard);

        *slot = Some(KeepAliveHandle::spawn(
            Arc::clone(self),
            self.settings.heartbeat_interval,
            self.shutdown_token.child_token(),
        ));

        info!(
            target: "pk.controller",
            room_id = %room_id,
            skipped_steps = ?outcome.failed_steps,
            "Session connected, keep-alive started"
        );

        Ok(self.status().await)
    }

    /// Snapshot of the session.
    pub async fn status(&self) -> SessionSnapshot {
        self.session.read().await.snapshot(Utc::now())
    }

    /// Room of the current session, if configured.
    pub async fn current_room_id(&self) -> Option<String> {
        self.session.read().await.room_id.clone()
    }

    /// Whether a keep-alive task is currently running.
    pub async fn keep_alive_running(&self) -> bool {
        self.keep_alive
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run one keep-alive tick: ping, report, and re-join once the retry
    /// budget is exhausted. Never returns an error; failures are recorded
    /// in the session.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            return TickOutcome::Skipped(SkipReason::InFlight);
        };

        let Some(target) = self.keep_alive_target().await else {
            return TickOutcome::Skipped(SkipReason::NotConfigured);
        };

        if !target.connected {
            return self.reconnect(&target).await;
        }

        let ping_ok = match self.adapter.ping(&target.room_id, &target.credential).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(target: "pk.controller", room_id = %target.room_id, "Ping reported expired session");
                false
            }
            Err(e) => {
                warn!(target: "pk.controller", error = %e, "Ping failed");
                false
            }
        };

        let report_ok = match self
            .adapter
            .report(&target.room_id, &target.identity.user_id)
            .await
        {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(target: "pk.controller", error = %e, "Presence report failed");
                false
            }
        };

        let retry_count = {
            let now = Utc::now();
            let mut session = self.session.write().await;
            if ping_ok {
                session.last_heartbeat_at = Some(now);
            }
            if report_ok {
                session.last_report_at = Some(now);
            }
            if ping_ok && report_ok {
                session.retry_count = 0;
            } else {
                session.retry_count = session.retry_count.saturating_add(1);
            }
            session.retry_count
        };

        if retry_count >= self.settings.max_retries {
            warn!(
                target: "pk.controller",
                retry_count,
                max_retries = self.settings.max_retries,
                "Retry budget exhausted, re-joining"
            );
            return self.reconnect(&target).await;
        }

        if ping_ok && report_ok {
            TickOutcome::Healthy
        } else {
            TickOutcome::Degraded { retry_count }
        }
    }

    /// Stop the keep-alive task. Used on process shutdown.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.keep_alive.lock().await.take() {
            handle.stop().await;
        }
    }

    async fn keep_alive_target(&self) -> Option<KeepAliveTarget> {
        let session = self.session.read().await;
        Some(KeepAliveTarget {
            credential: session.credential.clone()?,
            room_id: session.room_id.clone()?,
            identity: session.identity.clone()?,
            connected: session.connected,
        })
    }

    async fn reconnect(&self, target: &KeepAliveTarget) -> TickOutcome {
        let result = self
            .adapter
            .join_room(&target.room_id, &target.credential, &target.identity)
            .await;

        let mut session = self.session.write().await;
        match result {
            Ok(outcome) => {
                session.connected = true;
                session.retry_count = 0;
                if outcome.reported() {
                    session.last_report_at = Some(Utc::now());
                }
                record_reconnect(true);
                set_session_connected(true);
                TickOutcome::Reconnected
            }
            Err(e) => {
                warn!(target: "pk.controller", error = %e, "Re-join failed");
                session.connected = false;
                record_reconnect(false);
                set_session_connected(false);
                TickOutcome::ReconnectFailed
            }
        }
    }
}
