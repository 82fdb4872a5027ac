//! # Sync Engine
//!
//! Keeps the local ledger eventually consistent with the remote document
//! store. One coordinator task owns every piece of engine state; network
//! calls run as spawned tasks and report back to it.
//!
//! ## Coordinator
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine coordinator                         │
//! │                                                                         │
//! │   settings tick (1s) ──► active? token changed? retry flag bumped?     │
//! │   ledger payload     ──► schedule debounce (1.5s)                      │
//! │   debounce deadline  ──► export                                        │
//! │   retry deadline     ──► export                                        │
//! │   meta poll (30s)    ──► marker changed? ──► import                    │
//! │   network_online()   ──► import + export                               │
//! │                                                                         │
//! │            ┌──────────────┐   ┌──────────────┐   ┌──────────────┐      │
//! │   spawn ─► │ import task  │   │ export task  │   │  poll task   │      │
//! │            └──────┬───────┘   └──────┬───────┘   └──────┬───────┘      │
//! │                   └──────────────────┼──────────────────┘              │
//! │                                      ▼                                  │
//! │                     Outcome ──► apply to ledger / status / timers       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Triggers
//! ```text
//! 1. activation        import, then replay the pending slot
//! 2. remote change     poll sees a new marker ──► import
//!                      (any answered poll before the first import ──► import)
//! 3. pending replay    pending slot differs from last export ──► export
//! 4. network online    import + export
//! 5. retry request     durable flag bumped ──► import + export
//! 6. local change      has imported, payload differs ──► debounce ──► export
//! ```
//!
//! Nothing fires while sync is inactive (disabled or no credential).
//! Errors never leave the engine: they end up in the status record.

use std::future::{pending, Future};
use std::sync::Arc;

use ironstock_core::LedgerSnapshot;
use ironstock_db::{LedgerStore, SharedStore};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::EngineSettings;
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteMarker, RemoteSnapshot, RemoteStore};
use crate::settings::{
    bump_retry_request, clear_pending_export, read_pending_export, read_retry_request,
    write_pending_export, SyncSettings,
};
use crate::status::{SyncStatus, SyncStatusPatch, SyncStatusStore};

// =============================================================================
// Handle
// =============================================================================

#[derive(Debug)]
enum Command {
    NetworkOnline,
    Shutdown,
}

/// Control surface of a running engine.
pub struct SyncEngineHandle {
    commands: mpsc::Sender<Command>,
    kv: SharedStore,
    status: SyncStatusStore,
    task: JoinHandle<()>,
}

impl SyncEngineHandle {
    /// Connectivity came back: import and export now.
    pub async fn network_online(&self) -> SyncResult<()> {
        self.commands
            .send(Command::NetworkOnline)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// Bumps the durable retry flag. Picked up on the next settings tick,
    /// by this engine or any other one sharing the store.
    pub async fn request_retry(&self) -> SyncResult<()> {
        let token = bump_retry_request(self.kv.as_ref()).await?;
        debug!(token = %token, "Retry requested");
        Ok(())
    }

    /// Persisted sync health.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        self.status.read().await
    }

    /// Stops the coordinator, cancels timers and in-flight requests.
    pub async fn shutdown(self) -> SyncResult<()> {
        // The task may already be gone; joining is what matters
        let _ = self.commands.send(Command::Shutdown).await;
        self.task
            .await
            .map_err(|e| SyncError::ChannelError(format!("sync engine task failed: {}", e)))
    }
}

// =============================================================================
// Engine
// =============================================================================

/// What a spawned network task hands back to the coordinator.
enum Outcome {
    Import(SyncResult<RemoteSnapshot>),
    Export {
        payload: Arc<str>,
        result: SyncResult<Option<RemoteMarker>>,
    },
    Poll(SyncResult<Option<RemoteMarker>>),
}

/// Coordinator state. Only the coordinator task touches it.
pub struct SyncEngine {
    config: EngineSettings,
    ledger: Arc<LedgerStore>,
    kv: SharedStore,
    remote: Arc<dyn RemoteStore>,
    status: SyncStatusStore,

    /// Last settings read from storage.
    settings: SyncSettings,

    /// Set by `start_import`, cleared by its outcome. Also gates polling.
    import_in_flight: bool,
    /// Set by `start_export`, cleared by its outcome. Also gates polling.
    export_in_flight: bool,
    poll_in_flight: bool,

    /// Set once any import answered. Local changes are only pushed after it.
    has_imported: bool,
    /// Payload the remote is known to hold. Written by import and export
    /// outcomes, compared against on every ledger change.
    last_exported: Option<Arc<str>>,
    /// Last remote marker seen by import, export or poll.
    last_marker: Option<RemoteMarker>,
    /// Mirrors `consecutiveFailures`; drives the backoff attempt.
    failures: u32,
    /// Last retry-request token acted on.
    last_retry_seen: Option<String>,

    debounce_at: Option<Instant>,
    retry_at: Option<Instant>,
}

impl SyncEngine {
    /// Starts the coordinator on the current runtime.
    pub fn spawn(
        config: &EngineSettings,
        ledger: Arc<LedgerStore>,
        kv: SharedStore,
        remote: Arc<dyn RemoteStore>,
    ) -> SyncEngineHandle {
        let (commands, command_rx) = mpsc::channel(16);
        let status = SyncStatusStore::new(kv.clone());

        let engine = SyncEngine {
            config: config.clone(),
            ledger,
            kv: kv.clone(),
            remote,
            status: status.clone(),
            settings: SyncSettings::default(),
            import_in_flight: false,
            export_in_flight: false,
            poll_in_flight: false,
            has_imported: false,
            last_exported: None,
            last_marker: None,
            failures: 0,
            last_retry_seen: None,
            debounce_at: None,
            retry_at: None,
        };
        let task = tokio::spawn(engine.run(command_rx));

        SyncEngineHandle {
            commands,
            kv,
            status,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Sync engine started");

        // Seed with the stored status and retry token so a restart does not
        // replay an old request
        if let Ok(status) = self.status.read().await {
            self.failures = status.consecutive_failures;
            self.last_marker = status.last_remote_updated_at;
        }
        match read_retry_request(self.kv.as_ref()).await {
            Ok(token) => self.last_retry_seen = token,
            Err(e) => warn!(error = %e, "Could not read retry flag"),
        }

        let mut payload_rx: watch::Receiver<Arc<str>> = self.ledger.subscribe();
        let mut tasks: JoinSet<Outcome> = JoinSet::new();

        let mut settings_tick = interval(self.config.settings_poll_interval());
        settings_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll_period = self.config.meta_poll_interval();
        let mut poll_tick = interval_at(Instant::now() + poll_period, poll_period);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::NetworkOnline) => {
                        info!("Network online");
                        self.start_import(&mut tasks);
                        self.start_export(&mut tasks);
                    }
                    Some(Command::Shutdown) | None => break,
                },

                _ = settings_tick.tick() => self.refresh_settings(&mut tasks).await,

                Ok(()) = payload_rx.changed() => {
                    let payload = payload_rx.borrow_and_update().clone();
                    self.on_ledger_change(payload);
                }

                _ = deadline(self.debounce_at) => {
                    self.debounce_at = None;
                    self.start_export(&mut tasks);
                }

                _ = deadline(self.retry_at) => {
                    self.retry_at = None;
                    debug!("Retry timer fired");
                    self.start_export(&mut tasks);
                }

                _ = poll_tick.tick() => self.start_poll(&mut tasks),

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.on_outcome(joined, &mut tasks).await;
                }
            }
        }

        // Abort whatever is still in flight
        tasks.shutdown().await;
        info!("Sync engine stopped");
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    async fn refresh_settings(&mut self, tasks: &mut JoinSet<Outcome>) {
        let next = match SyncSettings::read(self.kv.as_ref()).await {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Could not read sync settings");
                return;
            }
        };

        let was_active = self.settings.is_active();
        let token_changed = next.token != self.settings.token;
        self.settings = next;

        if !self.settings.is_active() {
            if was_active {
                info!("Sync paused");
            }
            self.debounce_at = None;
            self.retry_at = None;
            return;
        }

        if !was_active || token_changed {
            info!(resumed = was_active, "Sync active");
            self.start_import(tasks);
            self.replay_pending(tasks).await;
        }

        match read_retry_request(self.kv.as_ref()).await {
            Ok(Some(token)) if self.last_retry_seen.as_ref() != Some(&token) => {
                info!(token = %token, "Retry request picked up");
                self.last_retry_seen = Some(token);
                self.start_import(tasks);
                self.start_export(tasks);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read retry flag"),
        }
    }

    /// Exports when the pending slot holds something the remote lacks.
    async fn replay_pending(&mut self, tasks: &mut JoinSet<Outcome>) {
        let pending = match read_pending_export(self.kv.as_ref()).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Could not read pending export");
                return;
            }
        };
        if let Some(pending) = pending {
            if self.last_exported.as_deref() != Some(pending.as_str()) && !self.export_in_flight {
                info!("Replaying pending export");
                self.start_export(tasks);
            }
        }
    }

    fn on_ledger_change(&mut self, payload: Arc<str>) {
        if !self.settings.is_active() || !self.has_imported {
            return;
        }
        if self.last_exported.as_deref() == Some(&*payload) {
            // Changed back to what the remote holds
            self.debounce_at = None;
            return;
        }
        self.debounce_at = Some(Instant::now() + self.config.export_debounce());
    }

    fn start_import(&mut self, tasks: &mut JoinSet<Outcome>) {
        if !self.settings.is_active() || self.import_in_flight {
            return;
        }
        self.import_in_flight = true;

        let remote = self.remote.clone();
        let token = self.settings.token.clone();
        tasks.spawn(async move { Outcome::Import(remote.import(&token).await) });
    }

    fn start_export(&mut self, tasks: &mut JoinSet<Outcome>) {
        if !self.settings.is_active() || self.export_in_flight {
            return;
        }
        self.export_in_flight = true;

        let remote = self.remote.clone();
        let token = self.settings.token.clone();
        let payload = self.ledger.payload();
        tasks.spawn(async move {
            let result = remote.export(&token, &payload).await;
            Outcome::Export { payload, result }
        });
    }

    fn start_poll(&mut self, tasks: &mut JoinSet<Outcome>) {
        if !self.settings.is_active()
            || self.import_in_flight
            || self.export_in_flight
            || self.poll_in_flight
        {
            return;
        }
        self.poll_in_flight = true;

        let remote = self.remote.clone();
        let token = self.settings.token.clone();
        tasks.spawn(async move { Outcome::Poll(remote.meta(&token).await) });
    }

    // =========================================================================
    // Outcomes
    // =========================================================================

    async fn on_outcome(
        &mut self,
        joined: Result<Outcome, JoinError>,
        tasks: &mut JoinSet<Outcome>,
    ) {
        match joined {
            Ok(Outcome::Import(result)) => self.on_import(result).await,
            Ok(Outcome::Export { payload, result }) => self.on_export(payload, result).await,
            Ok(Outcome::Poll(result)) => self.on_poll(result, tasks).await,
            Err(e) => {
                error!(error = %e, "Sync task failed");
                self.import_in_flight = false;
                self.export_in_flight = false;
                self.poll_in_flight = false;
            }
        }
    }

    async fn on_import(&mut self, result: SyncResult<RemoteSnapshot>) {
        self.import_in_flight = false;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if matches!(e, SyncError::Rejected(_)) {
                    self.has_imported = true;
                }
                self.record_failure("import", &e).await;
                return;
            }
        };

        self.has_imported = true;
        self.last_marker = snapshot.marker.clone();

        let parsed = match snapshot.data {
            Some(data) => {
                LedgerSnapshot::from_remote(data).map_err(|e| SyncError::Rejected(e.to_string()))
            }
            None => Err(SyncError::Rejected("response has no data".into())),
        };
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                self.failures += 1;
                warn!(error = %e, failures = self.failures, "Remote snapshot not applied");
                let patch = SyncStatusPatch {
                    last_remote_updated_at: Some(snapshot.marker),
                    ..SyncStatusPatch::failure(e.to_string(), self.failures)
                };
                self.record(patch).await;
                return;
            }
        };

        match self.ledger.set_all(parsed).await {
            Ok(payload) => {
                self.last_exported = Some(payload);
                self.failures = 0;
                info!(marker = ?snapshot.marker, "Imported remote snapshot");
                self.record(SyncStatusPatch::imported(snapshot.marker)).await;
            }
            Err(e) => self.record_failure("import", &SyncError::from(e)).await,
        }
    }

    async fn on_export(&mut self, payload: Arc<str>, result: SyncResult<Option<RemoteMarker>>) {
        self.export_in_flight = false;

        match result {
            Ok(marker) => {
                self.last_marker = marker.clone();
                self.last_exported = Some(payload);
                self.failures = 0;
                self.retry_at = None;
                if let Err(e) = clear_pending_export(self.kv.as_ref()).await {
                    warn!(error = %e, "Could not clear pending export");
                }
                info!(marker = ?marker, "Exported local snapshot");
                self.record(SyncStatusPatch::exported(marker)).await;

                // Edits made while the request was out
                let current = self.ledger.payload();
                if self.has_imported
                    && self.debounce_at.is_none()
                    && self.last_exported.as_deref() != Some(&*current)
                {
                    self.on_ledger_change(current);
                }
            }
            Err(e) => {
                if let Err(e) = write_pending_export(self.kv.as_ref(), &payload).await {
                    warn!(error = %e, "Could not persist pending export");
                }
                self.record_failure("export", &e).await;

                if self.settings.is_active() {
                    let delay = self.config.backoff().delay(self.failures, e.retry_after());
                    info!(
                        attempt = self.failures,
                        delay_ms = delay.as_millis() as u64,
                        "Export retry scheduled"
                    );
                    self.retry_at = Some(Instant::now() + delay);
                }
            }
        }
    }

    async fn on_poll(
        &mut self,
        result: SyncResult<Option<RemoteMarker>>,
        tasks: &mut JoinSet<Outcome>,
    ) {
        self.poll_in_flight = false;

        match result {
            Err(e) => {
                debug!(error = %e, "Meta poll failed");
                self.record(SyncStatusPatch::error(e.to_string())).await;
            }
            Ok(marker) if !self.has_imported => {
                // No import has landed this session; the marker alone proves nothing
                if let Some(marker) = marker {
                    if self.last_marker.as_ref() != Some(&marker) {
                        self.last_marker = Some(marker.clone());
                        self.record(SyncStatusPatch::remote_marker(marker)).await;
                    }
                }
                debug!("Retrying initial import");
                self.start_import(tasks);
            }
            Ok(None) => {}
            Ok(Some(marker)) if self.last_marker.as_ref() == Some(&marker) => {}
            Ok(Some(marker)) => {
                info!(marker = %marker, "Remote changed");
                self.last_marker = Some(marker.clone());
                self.record(SyncStatusPatch::remote_marker(marker)).await;
                self.start_import(tasks);
            }
        }
    }

    async fn record_failure(&mut self, operation: &str, err: &SyncError) {
        self.failures += 1;
        warn!(
            operation,
            error = %err,
            failures = self.failures,
            retryable = err.is_retryable(),
            "Sync request failed"
        );
        self.record(SyncStatusPatch::failure(err.to_string(), self.failures))
            .await;
    }

    async fn record(&self, patch: SyncStatusPatch) {
        if let Err(e) = self.status.update(patch).await {
            warn!(error = %e, "Could not write sync status");
        }
    }
}

/// Resolves at `at`, or never.
fn deadline(at: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match at {
            Some(at) => sleep_until(at).await,
            None => pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use crate::settings::{write_settings, PENDING_EXPORT_KEY, SYNC_TOKEN_KEY};
    use ironstock_core::{CementProduct, Ledger, RodSize, StockAddition};
    use ironstock_db::{KeyValueStore, MemoryStore};
    use std::time::Duration;
    use tokio::time::sleep;

    const TOKEN: &str = "secret";

    struct Harness {
        kv: SharedStore,
        ledger: Arc<LedgerStore>,
        remote: Arc<MemoryRemote>,
        handle: SyncEngineHandle,
    }

    async fn start(kv: SharedStore, remote: Arc<MemoryRemote>) -> Harness {
        let ledger = Arc::new(LedgerStore::open(kv.clone()).await.unwrap());
        let handle = SyncEngine::spawn(
            &EngineSettings::default(),
            ledger.clone(),
            kv.clone(),
            remote.clone(),
        );
        Harness {
            kv,
            ledger,
            remote,
            handle,
        }
    }

    fn active_store() -> SharedStore {
        Arc::new(MemoryStore::with_entries([(SYNC_TOKEN_KEY, TOKEN)]))
    }

    fn sample_snapshot() -> LedgerSnapshot {
        let mut ledger = Ledger::default();
        ledger.add_stock(RodSize::Mm12, StockAddition::new(20.0, 95.0).with_bundles(2.0));
        ledger.add_stock(CementProduct::Opc, StockAddition::new(50.0, 480.0));
        ledger.snapshot()
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_imports_remote_snapshot() {
        let remote = Arc::new(MemoryRemote::new().seeded(&sample_snapshot()).unwrap());
        let h = start(active_store(), remote).await;

        sleep(Duration::from_millis(100)).await;

        assert_eq!(h.remote.import_count(), 1);
        assert_eq!(h.ledger.snapshot().await, sample_snapshot());
        let status = h.handle.status().await.unwrap();
        assert!(status.last_import_at.is_some());
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_remote_updated_at, h.remote.marker());

        // The import itself must not echo back
        sleep(Duration::from_secs(3)).await;
        assert_eq!(h.remote.export_count(), 0);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_engine_stays_quiet() {
        let kv: SharedStore = Arc::new(MemoryStore::new());
        let h = start(kv, Arc::new(MemoryRemote::new())).await;

        sleep(Duration::from_millis(100)).await;
        h.ledger
            .add_stock(RodSize::Mm8, StockAddition::new(5.0, 10.0))
            .await
            .unwrap();
        sleep(Duration::from_secs(40)).await;
        assert_eq!(h.remote.import_count(), 0);
        assert_eq!(h.remote.export_count(), 0);
        assert_eq!(h.remote.meta_count(), 0);

        // Enabling at runtime is picked up by the settings tick
        write_settings(h.kv.as_ref(), TOKEN, true).await.unwrap();
        sleep(Duration::from_millis(1100)).await;
        assert_eq!(h.remote.import_count(), 1);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_change_exported_after_debounce() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;

        h.ledger
            .add_stock(RodSize::Mm10, StockAddition::new(7.0, 60.0))
            .await
            .unwrap();
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.remote.export_count(), 0);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(h.remote.export_count(), 1);

        let exported = LedgerSnapshot::from_remote(h.remote.document().unwrap()).unwrap();
        assert_eq!(exported, h.ledger.snapshot().await);
        let status = h.handle.status().await.unwrap();
        assert!(status.last_export_at.is_some());
        assert_eq!(status.last_remote_updated_at, h.remote.marker());
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_bursts() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;

        for i in 1..=5 {
            h.ledger
                .add_stock(RodSize::Mm8, StockAddition::new(i as f64, 10.0))
                .await
                .unwrap();
            sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(h.remote.export_count(), 0);

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(h.remote.export_count(), 1);
        assert_eq!(h.ledger.ledger().await.item(RodSize::Mm8).quantity, 15.0);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_export_retries_after_hint() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;

        h.remote.fail_next_export(SyncError::from_status(
            429,
            "memory://export",
            None,
            Some(5.0),
        ));
        h.ledger
            .add_stock(RodSize::Mm8, StockAddition::new(3.0, 25.0))
            .await
            .unwrap();

        // Debounce fires at ~1.6s and the export is rejected
        sleep(Duration::from_millis(1600)).await;
        assert_eq!(h.remote.export_count(), 1);
        let status = h.handle.status().await.unwrap();
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(
            status.last_error.as_deref(),
            Some("Rate limited by remote store. Retrying…")
        );
        let pending = h.kv.get(PENDING_EXPORT_KEY).await.unwrap();
        assert_eq!(pending.as_deref(), Some(&*h.ledger.payload()));

        // Retry honours retry-after: 5s, not the 2s exponential step
        sleep(Duration::from_millis(4800)).await;
        assert_eq!(h.remote.export_count(), 1);
        sleep(Duration::from_millis(400)).await;
        assert_eq!(h.remote.export_count(), 2);

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_error, None);
        assert_eq!(h.kv.get(PENDING_EXPORT_KEY).await.unwrap(), None);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_then_import_round_trip() {
        let remote = Arc::new(MemoryRemote::new());

        let first = start(active_store(), remote.clone()).await;
        sleep(Duration::from_millis(100)).await;
        first
            .ledger
            .add_stock(CementProduct::Ppc, StockAddition::new(12.0, 510.0))
            .await
            .unwrap();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(remote.export_count(), 1);
        let expected = first.ledger.snapshot().await;
        first.handle.shutdown().await.unwrap();

        let second = start(active_store(), remote.clone()).await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(second.ledger.snapshot().await, expected);
        second.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_imports_remote_change() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.remote.import_count(), 1);

        let marker = h.remote.overwrite(&sample_snapshot()).unwrap();
        sleep(Duration::from_secs(30)).await;

        assert_eq!(h.remote.meta_count(), 1);
        assert_eq!(h.remote.import_count(), 2);
        assert_eq!(h.ledger.snapshot().await, sample_snapshot());
        let status = h.handle.status().await.unwrap();
        assert_eq!(status.last_remote_updated_at, Some(marker));

        // Unchanged marker: poll only
        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.remote.meta_count(), 2);
        assert_eq!(h.remote.import_count(), 2);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_remote_is_not_applied() {
        let remote = Arc::new(MemoryRemote::new());
        remote
            .export(TOKEN, r#"{"items":{"8mm":"lots"},"transactions":[]}"#)
            .await
            .unwrap();

        let kv = active_store();
        let h = start(kv, remote).await;
        h.ledger
            .add_stock(RodSize::Mm8, StockAddition::new(4.0, 30.0))
            .await
            .unwrap();
        let before = h.ledger.snapshot().await;

        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.ledger.snapshot().await, before);

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(status.last_import_at, None);
        assert!(status
            .last_error
            .unwrap()
            .starts_with("Remote payload rejected: "));

        // Local edits can still repair the remote copy
        h.ledger
            .add_stock(RodSize::Mm8, StockAddition::new(1.0, 30.0))
            .await
            .unwrap();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(h.remote.export_count(), 2);
        let repaired = LedgerSnapshot::from_remote(h.remote.document().unwrap()).unwrap();
        assert_eq!(repaired, h.ledger.snapshot().await);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_import_is_recorded() {
        let remote = Arc::new(MemoryRemote::with_token("other"));
        let h = start(active_store(), remote).await;
        sleep(Duration::from_millis(100)).await;

        let status = h.handle.status().await.unwrap();
        assert_eq!(status.last_error.as_deref(), Some("Unauthorized"));
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error_at.is_some());
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_export_replayed_on_start() {
        let mut local = Ledger::default();
        local.add_stock(RodSize::Mm12, StockAddition::new(9.0, 70.0));
        let payload = local.snapshot().to_payload().unwrap();
        let kv: SharedStore = Arc::new(MemoryStore::with_entries([
            (SYNC_TOKEN_KEY, TOKEN),
            (PENDING_EXPORT_KEY, payload.as_str()),
        ]));

        let h = start(kv, Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(h.remote.export_count(), 1);
        assert_eq!(h.kv.get(PENDING_EXPORT_KEY).await.unwrap(), None);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_online_runs_import_and_export() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;

        h.handle.network_online().await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.remote.import_count(), 2);
        assert_eq!(h.remote.export_count(), 1);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_request_runs_import_and_export() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;

        h.handle.request_retry().await.unwrap();
        sleep(Duration::from_millis(1100)).await;
        assert_eq!(h.remote.import_count(), 2);
        assert_eq!(h.remote.export_count(), 1);

        // Already handled: no repeat on later ticks
        sleep(Duration::from_secs(3)).await;
        assert_eq!(h.remote.import_count(), 2);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_drops_scheduled_export() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;

        h.ledger
            .add_stock(RodSize::Mm8, StockAddition::new(2.0, 10.0))
            .await
            .unwrap();
        write_settings(h.kv.as_ref(), TOKEN, false).await.unwrap();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.remote.export_count(), 0);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_startup_import_recovers_on_poll() {
        let remote = Arc::new(MemoryRemote::new().seeded(&sample_snapshot()).unwrap());
        let kv = active_store();
        // A previous run already saw the remote's current marker
        SyncStatusStore::new(kv.clone())
            .write(&SyncStatus {
                last_remote_updated_at: remote.marker(),
                ..SyncStatus::default()
            })
            .await
            .unwrap();
        remote.fail_next_import(SyncError::Network("offline".into()));

        let h = start(kv, remote).await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.remote.import_count(), 1);
        assert_eq!(h.handle.status().await.unwrap().consecutive_failures, 1);

        // Same marker as before, but nothing was imported yet
        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.remote.meta_count(), 1);
        assert_eq!(h.remote.import_count(), 2);
        assert_eq!(h.ledger.snapshot().await, sample_snapshot());
        let status = h.handle.status().await.unwrap();
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.last_error, None);

        // Local edits flow again
        h.ledger
            .add_stock(RodSize::Mm8, StockAddition::new(5.0, 10.0))
            .await
            .unwrap();
        sleep(Duration::from_secs(2)).await;
        assert_eq!(h.remote.export_count(), 1);
        let exported = LedgerSnapshot::from_remote(h.remote.document().unwrap()).unwrap();
        assert_eq!(exported, h.ledger.snapshot().await);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_export_failure_backs_off_further() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;

        for _ in 0..2 {
            h.remote
                .fail_next_export(SyncError::from_status(503, "memory://export", None, None));
        }
        h.ledger
            .add_stock(RodSize::Mm10, StockAddition::new(6.0, 55.0))
            .await
            .unwrap();

        // t≈1.6s: first failure, retry in 2.0-2.4s
        sleep(Duration::from_millis(1600)).await;
        assert_eq!(h.remote.export_count(), 1);
        assert_eq!(h.handle.status().await.unwrap().consecutive_failures, 1);

        // t≈4.1s: the retry fails too, next one in 4.0-4.8s
        sleep(Duration::from_millis(2400)).await;
        assert_eq!(h.remote.export_count(), 2);
        let status = h.handle.status().await.unwrap();
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.last_error.as_deref(), Some("Server error. Retrying…"));

        sleep(Duration::from_millis(3400)).await;
        assert_eq!(h.remote.export_count(), 2);
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.remote.export_count(), 3);
        let status = h.handle.status().await.unwrap();
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(h.kv.get(PENDING_EXPORT_KEY).await.unwrap(), None);

        // The replaced timer never fires
        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.remote.export_count(), 3);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_change_reimports_and_replays_pending() {
        let h = start(active_store(), Arc::new(MemoryRemote::new())).await;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.remote.import_count(), 1);
        assert_eq!(h.remote.export_count(), 0);

        let mut local = Ledger::default();
        local.add_stock(RodSize::Mm12, StockAddition::new(3.0, 80.0));
        let pending = local.snapshot().to_payload().unwrap();
        h.kv.set(PENDING_EXPORT_KEY, &pending).await.unwrap();
        write_settings(h.kv.as_ref(), "rotated", true).await.unwrap();

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(h.remote.import_count(), 2);
        assert_eq!(h.remote.export_count(), 1);
        assert_eq!(h.kv.get(PENDING_EXPORT_KEY).await.unwrap(), None);

        // Same token on later ticks: nothing new
        sleep(Duration::from_secs(3)).await;
        assert_eq!(h.remote.import_count(), 2);
        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_records_error_only() {
        let remote = Arc::new(MemoryRemote::new());
        remote.fail_next_import(SyncError::Network("offline".into()));
        remote.fail_next_meta(SyncError::from_status(502, "memory://meta", None, None));

        let h = start(active_store(), remote).await;
        sleep(Duration::from_millis(100)).await;
        let before = h.handle.status().await.unwrap();
        assert_eq!(before.consecutive_failures, 1);
        assert_eq!(before.last_error.as_deref(), Some("Network error: offline"));

        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.remote.meta_count(), 1);
        assert_eq!(h.remote.import_count(), 1);
        let status = h.handle.status().await.unwrap();
        assert_eq!(status.last_error.as_deref(), Some("Server error. Retrying…"));
        assert!(status.last_error_at.is_some());
        assert_eq!(status.consecutive_failures, 1);

        // The next answered poll brings the import back
        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.remote.import_count(), 2);
        assert_eq!(h.handle.status().await.unwrap().consecutive_failures, 0);
        h.handle.shutdown().await.unwrap();
    }
}
