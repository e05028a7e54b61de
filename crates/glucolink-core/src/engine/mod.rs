//! Sync engine
//!
//! The SyncEngine is responsible for:
//! - Reacting to settings changes (endpoint URL, API key, enabled flag)
//! - Debouncing bursts of change notifications per key
//! - Re-verifying credentials before synchronization resumes
//! - Running the uploader once verification succeeds
//! - Presenting verification results on the user-initiated path
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ SettingsStore │─── SettingChange ───┐
//! └───────────────┘                     │
//!                                       ▼
//!                              ┌────────────────┐
//!                              │ ChangeDebouncer│
//!                              └────────────────┘
//!                                       │ accepted + configured
//!                                       ▼
//!                  ┌────────────── SyncEngine ──────────────┐
//!                  │  Idle ──▶ Verifying ──▶ Syncing ──▶ Idle │
//!                  └──────────────────────────────────────────┘
//!                       │               │               │
//!                       ▼               ▼               ▼
//!              ┌────────────────┐ ┌──────────┐  ┌─────────────┐
//!              │CredentialVerif.│ │ Uploader │  │  AlertSink  │
//!              └────────────────┘ └──────────┘  └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. `url` / `apiKey` / `enabled` change arrives
//! 2. Debouncer gate (default 200ms per key)
//! 3. Snapshot must be enabled, primary role, with URL and key
//! 4. `Idle → Verifying`, probe dispatched on a spawned task
//! 5. Success → `Syncing`, one upload; failure → alert (URL/key path only)
//! 6. Back to `Idle`
//!
//! `synchronize()` bypasses all of the above except the configuration check.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::debounce::ChangeDebouncer;
use crate::error::{Error, Result};
use crate::traits::{
    AlertSink, Collector, Credentials, ReadingSource, SettingChange, SettingKey, SettingsStore,
};
use crate::uploader::{UploadOutcome, Uploader};
use crate::verifier::{CredentialVerifier, VerificationResult};

/// Alert title after the collector accepted the credentials
pub const VERIFIED_TITLE: &str = "Collector connected";

/// Alert title after the collector rejected the credentials
pub const VERIFICATION_FAILED_TITLE: &str = "Collector verification failed";

/// Alert message when a failure carries no detail
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Verifying,
    Syncing,
}

/// What started a verification cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTrigger {
    /// The user edited the endpoint URL or API key; results are presented
    CredentialsChanged(SettingKey),
    /// Synchronization was switched on; failures stay silent
    Enabled,
}

impl VerificationTrigger {
    /// Whether results of this cycle go to the alert sink
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, VerificationTrigger::CredentialsChanged(_))
    }

    // A pending user-initiated cycle is never downgraded
    fn merge(self, newer: VerificationTrigger) -> VerificationTrigger {
        if self.is_user_initiated() && !newer.is_user_initiated() {
            self
        } else {
            newer
        }
    }
}

/// Why a settings change did not start a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Another accepted change for the same key was too recent
    Debounced,
    /// The enabled flag was switched off or cleared
    SwitchedOff,
    /// Disabled, follower role, or credentials missing
    NotConfigured,
    /// A cycle is in flight; the change re-runs verification after it
    Coalesced,
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Engine started
    Started,

    /// A relevant settings change did not start a verification
    ChangeIgnored { key: SettingKey, reason: IgnoreReason },

    /// Verification dispatched
    VerificationStarted { trigger: VerificationTrigger },

    /// Collector accepted the credentials
    VerificationSucceeded,

    /// Collector rejected the credentials or could not be reached
    VerificationFailed {
        detail: Option<String>,
        /// Whether the alert sink was called
        surfaced: bool,
    },

    /// Readings acknowledged by the collector
    UploadSucceeded {
        count: usize,
        watermark: DateTime<Utc>,
    },

    /// Upload not attempted (not configured or nothing pending)
    UploadSkipped { outcome: UploadOutcome },

    /// Upload attempt failed
    UploadFailed { error: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// Core sync engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`], or feed changes through
///    [`SyncEngine::handle_setting_change()`] from your own loop
/// 3. Call [`SyncEngine::synchronize()`] for manual syncs at any time
///
/// ## Threading
///
/// Change handling is sequential on the caller's task. Each verification
/// cycle runs on its own spawned task and re-enters the engine state when it
/// completes. Clones share the same state.
///
/// ## Mutable State
///
/// - Debounce records: owned by the engine, updated atomically per key
/// - Watermark: written only by the uploader
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    settings: Arc<dyn SettingsStore>,
    verifier: CredentialVerifier,
    uploader: Uploader,
    alerts: Arc<dyn AlertSink>,
    debouncer: ChangeDebouncer,
    debounce_window: Duration,
    sync_interval: Option<Duration>,
    state: watch::Sender<SyncState>,
    /// Trigger coalesced while a cycle was in flight; guards Idle transitions
    pending: Mutex<Option<VerificationTrigger>>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        readings: Arc<dyn ReadingSource>,
        collector: Arc<dyn Collector>,
        alerts: Arc<dyn AlertSink>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        let (state, _) = watch::channel(SyncState::Idle);

        let inner = EngineInner {
            uploader: Uploader::new(
                readings,
                Arc::clone(&settings),
                Arc::clone(&collector),
                &config.upload,
            ),
            verifier: CredentialVerifier::new(collector),
            settings,
            alerts,
            debouncer: ChangeDebouncer::new(),
            debounce_window: config.engine.debounce_window(),
            sync_interval: config.engine.sync_interval(),
            state,
            pending: Mutex::new(None),
            in_flight: Mutex::new(None),
            event_tx: tx,
        };

        Ok((
            Self {
                inner: Arc::new(inner),
            },
            rx,
        ))
    }

    /// Current orchestrator state
    pub fn state(&self) -> SyncState {
        *self.inner.state.borrow()
    }

    /// Watch orchestrator state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Run the engine
    ///
    /// Processes settings changes (and periodic syncs, when configured)
    /// until Ctrl-C is received.
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires (or Ctrl-C when `None`)
    ///
    /// For embedders and tests that need programmatic shutdown.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        // Subscribed before Started so no change after the event is missed
        let mut changes = self.inner.settings.watch();
        self.inner.emit_event(SyncEvent::Started);
        info!("Sync engine started");

        let mut ticker = self.inner.sync_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let shutdown = shutdown_signal(shutdown_rx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(change) = changes.next() => {
                    self.handle_setting_change(change).await;
                }

                _ = next_tick(&mut ticker) => {
                    debug!("Periodic sync");
                    if let Err(e) = self.synchronize().await {
                        error!("Periodic sync failed: {}", e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.inner.emit_event(SyncEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        // Dispatched cycles run to completion
        let in_flight = lock(&self.inner.in_flight).take();
        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                error!("Verification task failed: {}", e);
            }
        }

        self.inner.settings.flush().await?;
        info!("Settings flushed, engine stopped");

        Ok(())
    }

    /// React to one settings change
    ///
    /// Returns once the change has been gated; a resulting verification
    /// runs on its own task.
    pub async fn handle_setting_change(&self, change: SettingChange) {
        let trigger = match change.key {
            SettingKey::Url | SettingKey::ApiKey => {
                VerificationTrigger::CredentialsChanged(change.key)
            }
            SettingKey::Enabled => VerificationTrigger::Enabled,
            SettingKey::WatermarkTimestamp | SettingKey::PrimaryRole => return,
        };

        if !self
            .inner
            .debouncer
            .accept(change.key, self.inner.debounce_window)
        {
            debug!("Change to {} debounced", change.key);
            self.inner.ignore(change.key, IgnoreReason::Debounced);
            return;
        }

        if trigger == VerificationTrigger::Enabled
            && change.value.as_ref().and_then(|v| v.as_flag()) != Some(true)
        {
            debug!("Synchronization switched off");
            self.inner.ignore(change.key, IgnoreReason::SwitchedOff);
            return;
        }

        match self.inner.current_credentials().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.inner.ignore(change.key, IgnoreReason::NotConfigured);
                return;
            }
            Err(e) => {
                error!("Failed to read settings after change to {}: {}", change.key, e);
                return;
            }
        }

        self.dispatch(change.key, trigger);
    }

    /// Start a verification cycle, or coalesce into the running one
    fn dispatch(&self, key: SettingKey, trigger: VerificationTrigger) {
        let mut pending = lock(&self.inner.pending);

        let started = self.inner.state.send_if_modified(|state| {
            if *state == SyncState::Idle {
                *state = SyncState::Verifying;
                true
            } else {
                false
            }
        });

        if !started {
            debug!("Verification in flight, coalescing change to {}", key);
            *pending = Some(match pending.take() {
                Some(queued) => queued.merge(trigger),
                None => trigger,
            });
            drop(pending);
            self.inner.ignore(key, IgnoreReason::Coalesced);
            return;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.verify_loop(trigger).await });
        *lock(&self.inner.in_flight) = Some(handle);
    }

    /// Upload pending readings now, without re-verifying credentials
    ///
    /// Not gated by the state machine. Returns
    /// [`UploadOutcome::NotConfigured`] when synchronization is not set up.
    pub async fn synchronize(&self) -> Result<UploadOutcome> {
        let Some(credentials) = self.inner.current_credentials().await? else {
            self.inner.emit_event(SyncEvent::UploadSkipped {
                outcome: UploadOutcome::NotConfigured,
            });
            return Ok(UploadOutcome::NotConfigured);
        };

        self.inner.upload(&credentials).await
    }
}

impl EngineInner {
    /// Run cycles until no coalesced trigger is left, then go Idle
    async fn verify_loop(self: Arc<Self>, first: VerificationTrigger) {
        let mut trigger = first;
        loop {
            self.verify_then_sync(trigger).await;

            let mut pending = lock(&self.pending);
            match pending.take() {
                Some(next) => {
                    self.state.send_replace(SyncState::Verifying);
                    trigger = next;
                }
                None => {
                    self.state.send_replace(SyncState::Idle);
                    break;
                }
            }
        }
    }

    async fn verify_then_sync(&self, trigger: VerificationTrigger) {
        // Settings may have changed since the trigger was accepted
        let credentials = match self.current_credentials().await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                debug!("No longer configured, skipping verification");
                return;
            }
            Err(e) => {
                error!("Failed to read settings before verification: {}", e);
                return;
            }
        };

        self.emit_event(SyncEvent::VerificationStarted { trigger });
        info!("Verifying credentials for {}", credentials.endpoint);

        let result = self.verifier.verify_credentials(&credentials).await;
        if !result.success {
            self.report_failure(trigger, result);
            return;
        }

        info!("Credentials verified for {}", credentials.endpoint);
        self.emit_event(SyncEvent::VerificationSucceeded);
        if trigger.is_user_initiated() {
            self.alerts.present(
                VERIFIED_TITLE,
                &format!("Credentials accepted by {}", credentials.endpoint),
            );
        }

        self.state.send_replace(SyncState::Syncing);
        if let Err(e) = self.upload(&credentials).await {
            warn!("Upload after verification failed: {}", e);
        }
    }

    fn report_failure(&self, trigger: VerificationTrigger, result: VerificationResult) {
        let surfaced = trigger.is_user_initiated() && result.is_presentable();
        if surfaced {
            let message = result
                .failure_detail
                .as_deref()
                .unwrap_or(UNKNOWN_ERROR_MESSAGE);
            self.alerts.present(VERIFICATION_FAILED_TITLE, message);
        } else {
            debug!("Verification failure not presented ({:?})", trigger);
        }

        self.emit_event(SyncEvent::VerificationFailed {
            detail: result.failure_detail,
            surfaced,
        });
    }

    /// One upload attempt with event reporting
    async fn upload(&self, credentials: &Credentials) -> Result<UploadOutcome> {
        match self.uploader.upload(credentials).await {
            Ok(UploadOutcome::Uploaded { count, watermark }) => {
                self.emit_event(SyncEvent::UploadSucceeded { count, watermark });
                Ok(UploadOutcome::Uploaded { count, watermark })
            }
            Ok(outcome) => {
                self.emit_event(SyncEvent::UploadSkipped {
                    outcome: outcome.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                match &e {
                    Error::InvalidResponse(detail) => {
                        warn!("Upload response could not be read: {}", detail)
                    }
                    other => error!("Upload failed: {}", other),
                }
                self.emit_event(SyncEvent::UploadFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Credentials when fully configured, `None` otherwise
    async fn current_credentials(&self) -> Result<Option<Credentials>> {
        let snapshot = self.settings.snapshot().await?;
        match snapshot.credentials() {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) if e.is_not_configured() => {
                debug!("Synchronization not configured: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn ignore(&self, key: SettingKey, reason: IgnoreReason) {
        self.emit_event(SyncEvent::ChangeIgnored { key, reason });
    }

    /// Emit an engine event
    fn emit_event(&self, event: SyncEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("uploader", &self.inner.uploader)
            .field("verifier", &self.inner.verifier)
            .field("debounce_window", &self.inner.debounce_window)
            .field("sync_interval", &self.inner.sync_interval)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn shutdown_signal(shutdown_rx: Option<oneshot::Receiver<()>>) -> impl Future<Output = ()> {
    async move {
        match shutdown_rx {
            // A dropped sender also stops the engine
            Some(rx) => {
                let _ = rx.await;
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_initiated_trigger_not_downgraded() {
        let user = VerificationTrigger::CredentialsChanged(SettingKey::ApiKey);
        let enabled = VerificationTrigger::Enabled;

        assert_eq!(user.merge(enabled), user);
        assert_eq!(enabled.merge(user), user);
        assert_eq!(enabled.merge(enabled), enabled);

        let url = VerificationTrigger::CredentialsChanged(SettingKey::Url);
        assert_eq!(user.merge(url), url);
    }

    #[test]
    fn test_sync_event_clone_eq() {
        let event = SyncEvent::ChangeIgnored {
            key: SettingKey::Url,
            reason: IgnoreReason::Debounced,
        };
        assert_eq!(event.clone(), event);
    }
}
