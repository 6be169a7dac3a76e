//! Background mirror loop.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use bienestar_context::ServiceContext;
use bienestar_core::sync::{
    run_backoff_seconds, MirrorTrigger, MIRROR_INTERVAL_JITTER_SECS,
    MIRROR_MAX_CONSECUTIVE_FAILURES,
};

fn next_delay(interval_secs: u64, consecutive_failures: u32) -> Duration {
    let jitter_bound = MIRROR_INTERVAL_JITTER_SECS.saturating_mul(1000);
    let jitter_ms = if jitter_bound > 0 {
        rand::thread_rng().gen_range(0..jitter_bound)
    } else {
        0
    };
    let base_ms = run_backoff_seconds(interval_secs, consecutive_failures).saturating_mul(1000);
    Duration::from_millis(base_ms.saturating_add(jitter_ms))
}

/// Spawns the periodic mirror unless it is already running. The first run
/// starts right away.
pub async fn ensure_background_mirror_started(context: Arc<ServiceContext>, interval_secs: u64) {
    if context.synchronizer().is_none() {
        warn!("[Mirror] Background mirror requested but no destination store is configured");
        return;
    }

    let runtime = context.mirror_runtime();
    let mut guard = runtime.background_task.lock().await;
    if let Some(handle) = guard.as_ref() {
        if !handle.is_finished() {
            return;
        }
        guard.take();
    }

    info!(
        "[Mirror] Starting background mirror every {}s",
        interval_secs
    );
    let handle = tokio::spawn(async move {
        let runtime = context.mirror_runtime();
        let mut trigger = MirrorTrigger::Startup;
        loop {
            match context.run_mirror(trigger).await {
                Ok(report) => debug!(
                    "[Mirror] Background run finished success={} synced={} failed={:?}",
                    report.is_success(),
                    report.synced_documents(),
                    report.failed_collections()
                ),
                Err(err) => {
                    warn!("[Mirror] Background run could not start: {}", err);
                    break;
                }
            }
            if runtime.is_shutting_down() {
                info!("[Mirror] Background mirror cancelled");
                break;
            }

            let failures = runtime.consecutive_failures();
            if failures >= MIRROR_MAX_CONSECUTIVE_FAILURES {
                warn!(
                    "[Mirror] {} consecutive failed runs. Stopping background mirror.",
                    failures
                );
                break;
            }

            let delay = next_delay(interval_secs, failures);
            debug!("[Mirror] Next run in {}ms", delay.as_millis());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = runtime.shutdown_requested() => {
                    info!("[Mirror] Background mirror cancelled");
                    break;
                }
            }
            trigger = MirrorTrigger::Periodic;
        }
    });
    *guard = Some(handle);
}

/// Asks running mirrors to stop after their current collection and waits up
/// to `grace` for each of them. Tasks still running after that are aborted.
pub async fn ensure_background_mirror_stopped(context: Arc<ServiceContext>, grace: Duration) {
    let runtime = context.mirror_runtime();
    runtime.request_shutdown();
    for mut handle in runtime.take_tasks().await {
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("[Mirror] Mirror task ended abnormally: {}", err),
            Err(_) => {
                warn!(
                    "[Mirror] Mirror task still running after {}s, aborting",
                    grace.as_secs()
                );
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bienestar_core::documents::{Document, Fields};
    use bienestar_core::sync::{CollectionOutcome, MirrorState, MIRROR_COLLECTIONS};

    use crate::test_support::{mirror_state, slow_mirror_state};

    #[test]
    fn delay_includes_bounded_jitter() {
        let delay = next_delay(3600, 0);
        assert!(delay >= Duration::from_secs(3600));
        assert!(delay < Duration::from_secs(3600 + MIRROR_INTERVAL_JITTER_SECS));
    }

    #[test]
    fn delay_backs_off_after_failures() {
        let delay = next_delay(86_400, 2);
        assert!(delay >= Duration::from_secs(120));
        assert!(delay < Duration::from_secs(120 + MIRROR_INTERVAL_JITTER_SECS));
    }

    #[tokio::test]
    async fn background_loop_runs_once_at_startup_and_stops() {
        let (state, source, destination) = mirror_state();
        source
            .insert_one("Evaluacion_General", Document::new(Fields::new()))
            .await
            .expect("seed");
        let context = Arc::clone(&state.context);

        ensure_background_mirror_started(Arc::clone(&context), 3600).await;
        let runtime = context.mirror_runtime();
        for _ in 0..100 {
            if runtime.last_report().await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let report = runtime.last_report().await.expect("startup run");
        assert_eq!(report.trigger, MirrorTrigger::Startup);
        assert!(runtime.background_running().await);

        ensure_background_mirror_stopped(Arc::clone(&context), Duration::from_secs(5)).await;
        assert!(!runtime.background_running().await);
        assert_eq!(
            destination.count("Evaluacion_General").await.expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn stopping_mid_run_lets_the_current_collection_finish() {
        let (state, source, destination) = slow_mirror_state(Duration::from_millis(200));
        for name in MIRROR_COLLECTIONS {
            source
                .insert_one(name, Document::new(Fields::new()))
                .await
                .expect("seed");
        }
        let context = Arc::clone(&state.context);

        ensure_background_mirror_started(Arc::clone(&context), 3600).await;
        for _ in 0..100 {
            if context.mirror_state() == MirrorState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(context.mirror_state(), MirrorState::Running);

        ensure_background_mirror_stopped(Arc::clone(&context), Duration::from_secs(5)).await;

        let runtime = context.mirror_runtime();
        let report = runtime.last_report().await.expect("report of the stopped run");
        assert_eq!(report.collections.len(), MIRROR_COLLECTIONS.len());
        assert_eq!(report.collections[0].outcome, CollectionOutcome::Synced { count: 1 });
        assert_eq!(
            report.collections[MIRROR_COLLECTIONS.len() - 1].outcome,
            CollectionOutcome::Cancelled
        );
        assert_eq!(context.mirror_state(), MirrorState::Failed);
        assert!(!runtime.background_running().await);
        assert_eq!(
            destination.count(MIRROR_COLLECTIONS[0]).await.expect("count"),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_wakes_a_sleeping_loop() {
        let (state, _, _) = mirror_state();
        let context = Arc::clone(&state.context);

        ensure_background_mirror_started(Arc::clone(&context), 3600).await;
        let runtime = context.mirror_runtime();
        while runtime.last_report().await.is_none() {
            tokio::task::yield_now().await;
        }

        let stop = ensure_background_mirror_stopped(Arc::clone(&context), Duration::from_secs(5));
        tokio::time::timeout(Duration::from_secs(1), stop)
            .await
            .expect("loop stops without waiting for the next run");
        assert!(!runtime.background_running().await);
    }
}
