use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use bienestar_core::documents::DocumentStore;
use bienestar_core::survey::RecordWriter;
use bienestar_core::sync::{
    CancelFlag, CollectionSynchronizer, MirrorOptions, MirrorReport, MirrorState, MirrorTrigger,
};
use bienestar_core::{Error, Result};

use crate::config::{MirrorConfig, DESTINATION_URI_ENV};
use crate::providers::open_store;

/// Mutable state of the mirror shared by manual triggers and the background loop.
#[derive(Debug)]
pub struct MirrorRuntimeState {
    pub background_task: Mutex<Option<JoinHandle<()>>>,
    /// Detached manual runs; finished handles are pruned on each new run.
    pub manual_runs: Mutex<Vec<JoinHandle<()>>>,
    pub last_report: RwLock<Option<MirrorReport>>,
    pub consecutive_failures: AtomicU32,
    pub cancel: CancelFlag,
    shutdown: watch::Sender<bool>,
}

impl Default for MirrorRuntimeState {
    fn default() -> Self {
        Self {
            background_task: Mutex::new(None),
            manual_runs: Mutex::new(Vec::new()),
            last_report: RwLock::new(None),
            consecutive_failures: AtomicU32::new(0),
            cancel: CancelFlag::new(),
            shutdown: watch::channel(false).0,
        }
    }
}

impl MirrorRuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub async fn record(&self, report: MirrorReport) {
        if report.is_success() {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        }
        *self.last_report.write().await = Some(report);
    }

    pub async fn last_report(&self) -> Option<MirrorReport> {
        self.last_report.read().await.clone()
    }

    pub async fn background_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Marks the mirror as shutting down and cancels the current run. Runs
    /// started afterwards see the cancel immediately.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
        self.cancel.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stop| *stop).await;
    }

    pub async fn track_manual_run(&self, handle: JoinHandle<()>) {
        let mut runs = self.manual_runs.lock().await;
        runs.retain(|run| !run.is_finished());
        runs.push(handle);
    }

    /// Takes every task handle so the caller can await or abort them.
    pub async fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut tasks: Vec<JoinHandle<()>> = self.manual_runs.lock().await.drain(..).collect();
        if let Some(handle) = self.background_task.lock().await.take() {
            tasks.push(handle);
        }
        tasks
    }

    /// Clears a leftover cancel before a run unless shutdown asked for it.
    fn arm_cancel(&self) {
        self.cancel.reset();
        if self.is_shutting_down() {
            self.cancel.cancel();
        }
    }
}

/// Long-lived store handles and the services built on them. Created once at
/// startup and shared behind an `Arc`.
pub struct ServiceContext {
    pub database: String,
    pub source_store: Arc<dyn DocumentStore>,
    pub destination_store: Option<Arc<dyn DocumentStore>>,
    pub record_writer: Arc<RecordWriter>,
    /// Present only when a destination store is configured.
    pub synchronizer: Option<Arc<CollectionSynchronizer>>,
    pub mirror_runtime: Arc<MirrorRuntimeState>,
}

impl ServiceContext {
    pub fn new(
        database: impl Into<String>,
        source_store: Arc<dyn DocumentStore>,
        destination_store: Option<Arc<dyn DocumentStore>>,
        options: MirrorOptions,
    ) -> Self {
        let record_writer = Arc::new(RecordWriter::new(Arc::clone(&source_store)));
        let synchronizer = destination_store.as_ref().map(|destination| {
            Arc::new(CollectionSynchronizer::new(
                Arc::clone(&source_store),
                Arc::clone(destination),
                options,
            ))
        });
        Self {
            database: database.into(),
            source_store,
            destination_store,
            record_writer,
            synchronizer,
            mirror_runtime: Arc::new(MirrorRuntimeState::new()),
        }
    }

    /// Opens the configured stores. The source store is required; without a
    /// destination the context serves intake only.
    pub async fn initialize(config: &MirrorConfig) -> Result<Self> {
        let retry = config.retry_policy();
        let source = open_store(config.require_source_uri()?, &config.database, &retry).await?;
        let destination = match config.destination_uri.as_deref() {
            Some(uri) => Some(open_store(uri, &config.database, &retry).await?),
            None => {
                warn!(
                    "[Context] {} is not set; mirroring is disabled",
                    DESTINATION_URI_ENV
                );
                None
            }
        };
        info!(
            "[Context] Stores ready for database '{}' (mode={})",
            config.database, config.mode
        );
        Ok(Self::new(
            config.database.clone(),
            source,
            destination,
            config.mirror_options(),
        ))
    }

    pub fn source_store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.source_store)
    }

    pub fn record_writer(&self) -> Arc<RecordWriter> {
        Arc::clone(&self.record_writer)
    }

    pub fn synchronizer(&self) -> Option<Arc<CollectionSynchronizer>> {
        self.synchronizer.clone()
    }

    pub fn mirror_runtime(&self) -> Arc<MirrorRuntimeState> {
        Arc::clone(&self.mirror_runtime)
    }

    pub fn mirror_state(&self) -> MirrorState {
        self.synchronizer
            .as_ref()
            .map(|s| s.state())
            .unwrap_or_default()
    }

    /// Runs the whole catalog once and records the report.
    pub async fn run_mirror(&self, trigger: MirrorTrigger) -> Result<MirrorReport> {
        let synchronizer = self.synchronizer.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "Mirroring requires {} to be set",
                DESTINATION_URI_ENV
            ))
        })?;
        let runtime = self.mirror_runtime();
        runtime.arm_cancel();
        let report = synchronizer
            .sync_all_with_cancel(trigger, &runtime.cancel)
            .await;
        runtime.record(report.clone()).await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bienestar_core::documents::{Document, Fields, MemoryStore};
    use bienestar_core::sync::{RetryPolicy, MIRROR_COLLECTIONS};

    fn options() -> MirrorOptions {
        MirrorOptions {
            retry: RetryPolicy::no_retry(),
            ..MirrorOptions::default()
        }
    }

    #[tokio::test]
    async fn intake_only_without_destination() {
        let context = ServiceContext::new("db", Arc::new(MemoryStore::new()), None, options());
        assert!(context.synchronizer().is_none());
        assert_eq!(context.mirror_state(), MirrorState::Idle);
        assert!(matches!(
            context.run_mirror(MirrorTrigger::Manual).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn run_mirror_records_report() {
        let source: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let destination: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        source
            .insert_one(MIRROR_COLLECTIONS[0], Document::new(Fields::new()))
            .await
            .expect("seed");

        let context = ServiceContext::new(
            "db",
            Arc::clone(&source),
            Some(Arc::clone(&destination)),
            options(),
        );
        let report = context
            .run_mirror(MirrorTrigger::Manual)
            .await
            .expect("run");

        assert!(report.is_success());
        assert_eq!(report.synced_documents(), 1);
        assert_eq!(context.mirror_state(), MirrorState::Completed);
        let runtime = context.mirror_runtime();
        assert_eq!(runtime.consecutive_failures(), 0);
        assert_eq!(runtime.last_report().await, Some(report));
        assert_eq!(
            destination.count(MIRROR_COLLECTIONS[0]).await.expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn runs_after_shutdown_are_cancelled_up_front() {
        let source: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let destination: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        source
            .insert_one(MIRROR_COLLECTIONS[0], Document::new(Fields::new()))
            .await
            .expect("seed");
        let context = ServiceContext::new(
            "db",
            Arc::clone(&source),
            Some(Arc::clone(&destination)),
            options(),
        );

        let runtime = context.mirror_runtime();
        runtime.request_shutdown();
        assert!(runtime.is_shutting_down());
        runtime.shutdown_requested().await;

        let report = context
            .run_mirror(MirrorTrigger::Manual)
            .await
            .expect("run");
        assert!(!report.is_success());
        assert_eq!(
            destination.count(MIRROR_COLLECTIONS[0]).await.expect("count"),
            0
        );
        assert!(runtime.cancel.is_cancelled());
        assert_ne!(context.mirror_state(), MirrorState::Running);
    }

    #[tokio::test]
    async fn take_tasks_collects_manual_and_background_handles() {
        let runtime = MirrorRuntimeState::new();
        runtime.track_manual_run(tokio::spawn(async {})).await;
        *runtime.background_task.lock().await = Some(tokio::spawn(async {}));

        let tasks = runtime.take_tasks().await;
        assert_eq!(tasks.len(), 2);
        assert!(!runtime.background_running().await);
        assert!(runtime.manual_runs.lock().await.is_empty());
        for task in tasks {
            task.await.expect("join");
        }
    }

    #[tokio::test]
    async fn initialize_opens_configured_stores() {
        let config = MirrorConfig {
            source_uri: Some("memory://".to_string()),
            destination_uri: Some("memory://".to_string()),
            max_attempts: 1,
            ..MirrorConfig::default()
        };
        let context = ServiceContext::initialize(&config).await.expect("context");
        assert_eq!(context.database, "cuestionario_bienestar");
        assert!(context.synchronizer().is_some());
        assert_eq!(context.source_store().backend(), "memory");
    }

    #[tokio::test]
    async fn initialize_requires_source() {
        let result = ServiceContext::initialize(&MirrorConfig::default()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
