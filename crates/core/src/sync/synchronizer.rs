//! Full-collection mirror from a source store to a destination store.
//!
//! Each run reads every catalog collection in full from the source, drops
//! the source identifiers and writes the batch to the same-named destination
//! collection. There is no checkpoint: a restart mirrors everything again.
//! In [`MirrorMode::Append`] this duplicates previously mirrored documents,
//! because nothing links a destination document back to its source.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use super::mirror_engine::{retry_with_backoff, CancelFlag, RetryPolicy};
use super::mirror_model::{
    CollectionOutcome, CollectionReport, MirrorMode, MirrorReport, MirrorState, MirrorTrigger,
    MIRROR_COLLECTIONS, ORIGIN_ID_FIELD,
};
use super::mirror_scheduler::MIRROR_COLLECTION_TIMEOUT_SECS;
use crate::documents::{timestamp_now, Document, DocumentStore};
use crate::errors::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOptions {
    pub mode: MirrorMode,
    pub retry: RetryPolicy,
    /// Deadline for one `sync_collection` call, retries included.
    pub collection_timeout: Duration,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            mode: MirrorMode::Append,
            retry: RetryPolicy::default(),
            collection_timeout: Duration::from_secs(MIRROR_COLLECTION_TIMEOUT_SECS),
        }
    }
}

pub struct CollectionSynchronizer {
    source: Arc<dyn DocumentStore>,
    destination: Arc<dyn DocumentStore>,
    collections: Vec<String>,
    options: MirrorOptions,
    state: Mutex<MirrorState>,
    run_lock: tokio::sync::Mutex<()>,
}

impl CollectionSynchronizer {
    pub fn new(
        source: Arc<dyn DocumentStore>,
        destination: Arc<dyn DocumentStore>,
        options: MirrorOptions,
    ) -> Self {
        Self {
            source,
            destination,
            collections: MIRROR_COLLECTIONS.iter().map(|c| c.to_string()).collect(),
            options,
            state: Mutex::new(MirrorState::Idle),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the default catalog.
    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    pub fn state(&self) -> MirrorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: MirrorState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Mirrors one collection. An empty source collection is a successful
    /// no-op ([`CollectionOutcome::Skipped`]). Waits for any catalog run in
    /// progress.
    pub async fn sync_collection(&self, name: &str) -> StoreResult<CollectionOutcome> {
        let _run_guard = self.run_lock.lock().await;
        let attempts = AtomicU32::new(0);
        self.sync_collection_with_deadline(name, &attempts).await
    }

    async fn sync_collection_with_deadline(
        &self,
        name: &str,
        attempts: &AtomicU32,
    ) -> StoreResult<CollectionOutcome> {
        let deadline = self.options.collection_timeout;
        match tokio::time::timeout(deadline, self.mirror_collection(name, attempts)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                collection: name.to_string(),
                seconds: deadline.as_secs(),
            }),
        }
    }

    async fn mirror_collection(
        &self,
        name: &str,
        attempts: &AtomicU32,
    ) -> StoreResult<CollectionOutcome> {
        let (read, read_attempts) = retry_with_backoff(
            &self.options.retry,
            &format!("Reading '{}'", name),
            false,
            || self.source.find_all(name),
        )
        .await;
        attempts.fetch_add(read_attempts, Ordering::SeqCst);
        let documents = read?;

        if documents.is_empty() {
            info!("[Mirror] No documents to mirror in '{}'", name);
            return Ok(CollectionOutcome::Skipped);
        }

        info!(
            "[Mirror] Mirroring {} documents of '{}' (mode={})",
            documents.len(),
            name,
            self.options.mode
        );

        let count = match self.options.mode {
            MirrorMode::Append => {
                let batch = documents
                    .into_iter()
                    .map(Document::without_id)
                    .collect::<Vec<_>>();
                attempts.fetch_add(1, Ordering::SeqCst);
                self.destination.insert_many(name, batch).await?.len()
            }
            MirrorMode::Upsert => {
                let batch = documents
                    .into_iter()
                    .map(tag_with_origin_id)
                    .collect::<StoreResult<Vec<_>>>()?;
                let (written, write_attempts) = retry_with_backoff(
                    &self.options.retry,
                    &format!("Upserting into '{}'", name),
                    true,
                    || {
                        self.destination
                            .upsert_many(name, ORIGIN_ID_FIELD, batch.clone())
                    },
                )
                .await;
                attempts.fetch_add(write_attempts, Ordering::SeqCst);
                let summary = written?;
                debug!(
                    "[Mirror] '{}' upserted inserted={} replaced={}",
                    name, summary.inserted, summary.replaced
                );
                summary.total()
            }
        };

        info!("[Mirror] '{}' mirrored ({} documents)", name, count);
        Ok(CollectionOutcome::Synced { count })
    }

    async fn check_stores(&self) -> StoreResult<()> {
        for (role, store) in [("source", &self.source), ("destination", &self.destination)] {
            let (result, _) = retry_with_backoff(
                &self.options.retry,
                &format!("Connecting to {} store ({})", role, store.backend()),
                false,
                || store.ping(),
            )
            .await;
            result?;
        }
        Ok(())
    }

    /// Mirrors the whole catalog in order. Each collection is an independent
    /// unit of work: a failure is recorded and the next collection still runs.
    pub async fn sync_all(&self, trigger: MirrorTrigger) -> MirrorReport {
        self.sync_all_with_cancel(trigger, &CancelFlag::new()).await
    }

    /// As [`Self::sync_all`], checking `cancel` before each collection.
    /// Collections not started when cancellation is observed are reported
    /// as [`CollectionOutcome::Cancelled`].
    pub async fn sync_all_with_cancel(
        &self,
        trigger: MirrorTrigger,
        cancel: &CancelFlag,
    ) -> MirrorReport {
        let _run_guard = self.run_lock.lock().await;
        self.set_state(MirrorState::Running);
        let _state_guard = RunStateGuard(&self.state);
        let started = Instant::now();
        let started_at = timestamp_now();
        info!(
            "[Mirror] Starting mirror of {} collections ({} -> {}, trigger={:?})",
            self.collections.len(),
            self.source.backend(),
            self.destination.backend(),
            trigger
        );

        let preflight = self.check_stores().await;
        if let Err(err) = &preflight {
            error!("[Mirror] Stores unreachable, run aborted: {}", err);
        }

        let mut reports = Vec::with_capacity(self.collections.len());
        for name in &self.collections {
            if cancel.is_cancelled() {
                reports.push(CollectionReport {
                    collection: name.clone(),
                    outcome: CollectionOutcome::Cancelled,
                    attempts: 0,
                    duration_ms: 0,
                });
                continue;
            }
            if let Err(err) = &preflight {
                reports.push(CollectionReport {
                    collection: name.clone(),
                    outcome: CollectionOutcome::Failed {
                        cause: err.to_string(),
                        retry_class: err.retry_class(),
                    },
                    attempts: 0,
                    duration_ms: 0,
                });
                continue;
            }

            let collection_started = Instant::now();
            let attempts = AtomicU32::new(0);
            let outcome = match self.sync_collection_with_deadline(name, &attempts).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!("[Mirror] '{}' failed: {}", name, err);
                    CollectionOutcome::Failed {
                        cause: err.to_string(),
                        retry_class: err.retry_class(),
                    }
                }
            };
            reports.push(CollectionReport {
                collection: name.clone(),
                outcome,
                attempts: attempts.load(Ordering::SeqCst),
                duration_ms: collection_started.elapsed().as_millis() as i64,
            });
        }

        let report = MirrorReport {
            trigger,
            mode: self.options.mode,
            started_at,
            finished_at: timestamp_now(),
            duration_ms: started.elapsed().as_millis() as i64,
            collections: reports,
        };
        self.set_state(report.final_state());

        if report.is_success() {
            info!(
                "[Mirror] Mirror complete: {} documents in {}ms",
                report.synced_documents(),
                report.duration_ms
            );
        } else {
            warn!(
                "[Mirror] Mirror finished with failures in {:?}",
                report.failed_collections()
            );
        }
        report
    }
}

/// Leaves `Failed` behind when a run is dropped before it sets its final state.
struct RunStateGuard<'a>(&'a Mutex<MirrorState>);

impl Drop for RunStateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if *state == MirrorState::Running {
            *state = MirrorState::Failed;
        }
    }
}

/// Moves the source identifier into [`ORIGIN_ID_FIELD`] so upserts can key on it.
fn tag_with_origin_id(document: Document) -> StoreResult<Document> {
    let origin = document
        .id
        .clone()
        .ok_or_else(|| StoreError::invalid_document("source document has no identifier"))?;
    let mut document = document.without_id();
    document.fields.insert(
        ORIGIN_ID_FIELD.to_string(),
        serde_json::Value::String(origin.to_string()),
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{DocumentId, Fields, MemoryStore, UpsertSummary};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;

    /// Memory store with injectable failures.
    #[derive(Default)]
    struct ScriptedStore {
        inner: MemoryStore,
        unreachable: bool,
        failing_reads: Vec<&'static str>,
        /// Collection whose bulk insert commits `n` documents then fails.
        partial_insert: Option<(&'static str, usize)>,
        slow_reads: Option<Duration>,
        cancel_on_read: Option<(&'static str, CancelFlag)>,
        read_calls: AtomicU32,
        reads_in_flight: AtomicU32,
        max_reads_in_flight: AtomicU32,
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        fn backend(&self) -> &'static str {
            "scripted"
        }

        async fn ping(&self) -> StoreResult<()> {
            if self.unreachable {
                return Err(StoreError::connection("connection refused"));
            }
            Ok(())
        }

        async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            let in_flight = self.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_reads_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            if let Some(delay) = self.slow_reads {
                tokio::time::sleep(delay).await;
            }
            self.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Some((target, flag)) = &self.cancel_on_read {
                if *target == collection {
                    flag.cancel();
                }
            }
            if self.failing_reads.iter().any(|c| *c == collection) {
                return Err(StoreError::read(collection, "cursor not found"));
            }
            self.inner.find_all(collection).await
        }

        async fn count(&self, collection: &str) -> StoreResult<u64> {
            self.inner.count(collection).await
        }

        async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<DocumentId> {
            self.inner.insert_one(collection, document).await
        }

        async fn insert_many(
            &self,
            collection: &str,
            documents: Vec<Document>,
        ) -> StoreResult<Vec<DocumentId>> {
            if let Some((target, committed)) = self.partial_insert {
                if target == collection {
                    let prefix = documents.into_iter().take(committed).collect();
                    self.inner.insert_many(collection, prefix).await?;
                    return Err(StoreError::write(
                        collection,
                        Some(committed),
                        "document exceeds maximum size",
                    ));
                }
            }
            self.inner.insert_many(collection, documents).await
        }

        async fn upsert_many(
            &self,
            collection: &str,
            key_field: &str,
            documents: Vec<Document>,
        ) -> StoreResult<UpsertSummary> {
            self.inner.upsert_many(collection, key_field, documents).await
        }
    }

    fn fast_options(mode: MirrorMode) -> MirrorOptions {
        MirrorOptions {
            mode,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            collection_timeout: Duration::from_secs(5),
        }
    }

    async fn seed(store: &dyn DocumentStore, collection: &str, n: usize) {
        let docs = (0..n)
            .map(|i| {
                let mut fields = Fields::new();
                fields.insert("pregunta1".to_string(), json!(i));
                Document::new(fields)
            })
            .collect();
        store.insert_many(collection, docs).await.expect("seed");
    }

    async fn ids_of(store: &dyn DocumentStore, collection: &str) -> HashSet<DocumentId> {
        store
            .find_all(collection)
            .await
            .expect("find")
            .into_iter()
            .filter_map(|d| d.id)
            .collect()
    }

    fn synchronizer(
        source: Arc<dyn DocumentStore>,
        destination: Arc<dyn DocumentStore>,
        mode: MirrorMode,
    ) -> CollectionSynchronizer {
        CollectionSynchronizer::new(source, destination, fast_options(mode))
    }

    #[tokio::test]
    async fn sync_collection_adds_exactly_source_count() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        seed(&*source, "Apoyo_Social", 4).await;
        seed(&*destination, "Apoyo_Social", 2).await;
        let sync = synchronizer(source.clone(), destination.clone(), MirrorMode::Append);

        let outcome = sync.sync_collection("Apoyo_Social").await.expect("sync");
        assert_eq!(outcome, CollectionOutcome::Synced { count: 4 });
        assert_eq!(destination.count("Apoyo_Social").await.expect("count"), 6);
        assert_eq!(source.count("Apoyo_Social").await.expect("count"), 4);
    }

    #[tokio::test]
    async fn running_twice_in_append_mode_doubles_destination() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        seed(&*source, "Estado_Emocional", 3).await;
        let sync = synchronizer(source, destination.clone(), MirrorMode::Append);

        sync.sync_collection("Estado_Emocional").await.expect("first");
        sync.sync_collection("Estado_Emocional").await.expect("second");
        assert_eq!(destination.count("Estado_Emocional").await.expect("count"), 6);
    }

    #[tokio::test]
    async fn source_ids_never_reach_destination() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        seed(&*source, "Resumen_Completo", 5).await;
        let sync = synchronizer(source.clone(), destination.clone(), MirrorMode::Append);

        sync.sync_collection("Resumen_Completo").await.expect("sync");
        let source_ids = ids_of(&*source, "Resumen_Completo").await;
        let destination_ids = ids_of(&*destination, "Resumen_Completo").await;
        assert_eq!(destination_ids.len(), 5);
        assert!(source_ids.is_disjoint(&destination_ids));
    }

    #[tokio::test]
    async fn empty_source_is_skipped_and_destination_unchanged() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        seed(&*destination, "Apoyo_Social", 2).await;
        let sync = synchronizer(source, destination.clone(), MirrorMode::Append);

        let outcome = sync.sync_collection("Apoyo_Social").await.expect("sync");
        assert_eq!(outcome, CollectionOutcome::Skipped);
        assert_eq!(destination.count("Apoyo_Social").await.expect("count"), 2);
    }

    #[tokio::test]
    async fn upsert_mode_does_not_duplicate_on_rerun() {
        let source = Arc::new(MemoryStore::new());
        let destination = Arc::new(MemoryStore::new());
        seed(&*source, "Evaluacion_General", 3).await;
        let sync = synchronizer(source.clone(), destination.clone(), MirrorMode::Upsert);

        sync.sync_collection("Evaluacion_General").await.expect("first");
        sync.sync_collection("Evaluacion_General").await.expect("second");
        assert_eq!(destination.count("Evaluacion_General").await.expect("count"), 3);

        let source_ids = ids_of(&*source, "Evaluacion_General")
            .await
            .into_iter()
            .map(|id| id.to_string())
            .collect::<HashSet<_>>();
        let docs = destination.find_all("Evaluacion_General").await.expect("find");
        for doc in docs {
            let origin = doc.get(ORIGIN_ID_FIELD).and_then(|v| v.as_str()).expect("origin");
            assert!(source_ids.contains(origin));
            assert!(!source_ids.contains(doc.id.expect("id").as_str()));
        }
    }

    #[tokio::test]
    async fn failing_collection_does_not_abort_catalog() {
        let source = Arc::new(ScriptedStore {
            failing_reads: vec!["Condiciones_de_Entorno"],
            ..Default::default()
        });
        for name in MIRROR_COLLECTIONS {
            seed(&*source, name, 1).await;
        }
        let destination = Arc::new(MemoryStore::new());
        let sync = synchronizer(source.clone(), destination.clone(), MirrorMode::Append);

        let report = sync.sync_all(MirrorTrigger::Manual).await;
        assert_eq!(report.collections.len(), 6);
        assert_eq!(report.failed_collections(), vec!["Condiciones_de_Entorno"]);
        assert_eq!(report.synced_documents(), 5);
        assert_eq!(sync.state(), MirrorState::Failed);

        let failed = &report.collections[1];
        assert_eq!(failed.attempts, 3);
        assert!(matches!(failed.outcome, CollectionOutcome::Failed { .. }));
        assert_eq!(destination.count("Resumen_Completo").await.expect("count"), 1);
    }

    #[tokio::test]
    async fn sync_all_reports_skipped_and_completes() {
        let source = Arc::new(MemoryStore::new());
        seed(&*source, "Apoyo_Social", 2).await;
        let destination = Arc::new(MemoryStore::new());
        let sync = synchronizer(source, destination, MirrorMode::Append);
        assert_eq!(sync.state(), MirrorState::Idle);

        let report = sync.sync_all(MirrorTrigger::Startup).await;
        assert!(report.is_success());
        assert_eq!(sync.state(), MirrorState::Completed);
        let names = report
            .collections
            .iter()
            .map(|c| c.collection.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, MIRROR_COLLECTIONS.to_vec());
        assert_eq!(report.collections[2].outcome, CollectionOutcome::Synced { count: 2 });
        assert_eq!(report.collections[0].outcome, CollectionOutcome::Skipped);
    }

    #[tokio::test]
    async fn partial_batch_failure_keeps_committed_prefix() {
        let source = Arc::new(MemoryStore::new());
        seed(&*source, "Apoyo_Social", 5).await;
        let destination = Arc::new(ScriptedStore {
            partial_insert: Some(("Apoyo_Social", 2)),
            ..Default::default()
        });
        let sync = synchronizer(source, destination.clone(), MirrorMode::Append);

        let err = sync
            .sync_collection("Apoyo_Social")
            .await
            .expect_err("insert must fail");
        match err {
            StoreError::Write { inserted, .. } => assert_eq!(inserted, Some(2)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(destination.count("Apoyo_Social").await.expect("count"), 2);
    }

    #[tokio::test]
    async fn unreachable_store_fails_every_collection_without_reading() {
        let source = Arc::new(ScriptedStore {
            unreachable: true,
            ..Default::default()
        });
        let destination = Arc::new(MemoryStore::new());
        let sync = synchronizer(source.clone(), destination, MirrorMode::Append);

        let report = sync.sync_all(MirrorTrigger::Periodic).await;
        assert_eq!(report.failed_collections().len(), 6);
        assert_eq!(source.read_calls.load(Ordering::SeqCst), 0);
        match &report.collections[0].outcome {
            CollectionOutcome::Failed { cause, .. } => assert!(cause.contains("refused")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_remaining_collections() {
        let cancel = CancelFlag::new();
        let source = Arc::new(ScriptedStore {
            cancel_on_read: Some(("Apoyo_Social", cancel.clone())),
            ..Default::default()
        });
        for name in MIRROR_COLLECTIONS {
            seed(&*source, name, 1).await;
        }
        let destination = Arc::new(MemoryStore::new());
        let sync = synchronizer(source, destination.clone(), MirrorMode::Append);

        let report = sync
            .sync_all_with_cancel(MirrorTrigger::Manual, &cancel)
            .await;
        let outcomes = report
            .collections
            .iter()
            .map(|c| c.outcome.clone())
            .collect::<Vec<_>>();
        assert_eq!(outcomes[2], CollectionOutcome::Synced { count: 1 });
        assert_eq!(outcomes[3], CollectionOutcome::Cancelled);
        assert_eq!(outcomes[5], CollectionOutcome::Cancelled);
        assert_eq!(destination.count("Balance_Vida_y_Trabajo").await.expect("count"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_read_hits_collection_deadline() {
        let source = Arc::new(ScriptedStore {
            slow_reads: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let destination = Arc::new(MemoryStore::new());
        let mut options = fast_options(MirrorMode::Append);
        options.collection_timeout = Duration::from_secs(1);
        let sync = CollectionSynchronizer::new(source, destination, options)
            .with_collections(["Apoyo_Social"]);

        let err = sync
            .sync_collection("Apoyo_Social")
            .await
            .expect_err("read must time out");
        assert!(matches!(err, StoreError::Timeout { seconds: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn sync_collection_waits_for_running_catalog() {
        let source = Arc::new(ScriptedStore {
            slow_reads: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        seed(&*source, "Apoyo_Social", 1).await;
        let destination = Arc::new(MemoryStore::new());
        let sync = Arc::new(synchronizer(
            source.clone(),
            destination.clone(),
            MirrorMode::Append,
        ));

        let catalog = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.sync_all(MirrorTrigger::Manual).await }
        });
        while source.read_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let outcome = sync.sync_collection("Apoyo_Social").await.expect("sync");
        assert_eq!(outcome, CollectionOutcome::Synced { count: 1 });
        assert!(catalog.is_finished());
        let report = catalog.await.expect("join");
        assert!(report.is_success());
        assert_eq!(source.max_reads_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(destination.count("Apoyo_Social").await.expect("count"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_run_does_not_stay_running() {
        let source = Arc::new(ScriptedStore {
            slow_reads: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let destination = Arc::new(MemoryStore::new());
        let sync = synchronizer(source.clone(), destination, MirrorMode::Append);

        let run = tokio::time::timeout(Duration::from_secs(1), sync.sync_all(MirrorTrigger::Manual));
        assert!(run.await.is_err());
        assert_eq!(source.read_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sync.state(), MirrorState::Failed);
    }
}
