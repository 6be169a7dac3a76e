//! Mirror status and manual trigger.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};

use bienestar_core::sync::{MirrorMode, MirrorReport, MirrorState, MirrorTrigger};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MirrorStatusResponse {
    enabled: bool,
    state: MirrorState,
    mode: Option<MirrorMode>,
    background_running: bool,
    consecutive_failures: u32,
    last_report: Option<MirrorReport>,
}

async fn get_mirror_status(State(state): State<Arc<AppState>>) -> Json<MirrorStatusResponse> {
    let context = &state.context;
    let runtime = context.mirror_runtime();
    let synchronizer = context.synchronizer();
    Json(MirrorStatusResponse {
        enabled: synchronizer.is_some(),
        state: context.mirror_state(),
        mode: synchronizer.map(|s| s.options().mode),
        background_running: runtime.background_running().await,
        consecutive_failures: runtime.consecutive_failures(),
        last_report: runtime.last_report().await,
    })
}

/// Starts a full mirror run and returns immediately with 202 Accepted.
/// Progress and outcome are visible through the status endpoint.
async fn trigger_mirror_run(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    if state.context.synchronizer().is_none() {
        return Err(ApiError::MirrorUnavailable(
            "no hay almacén de destino configurado".to_string(),
        ));
    }
    let runtime = state.context.mirror_runtime();
    if runtime.is_shutting_down() {
        return Err(ApiError::MirrorUnavailable(
            "el servicio se está deteniendo".to_string(),
        ));
    }
    info!("[Mirror] Manual run requested");

    let context = Arc::clone(&state.context);
    let handle = tokio::spawn(async move {
        match context.run_mirror(MirrorTrigger::Manual).await {
            Ok(report) if report.is_success() => {
                info!(
                    "[Mirror] Manual run completed ({} documents)",
                    report.synced_documents()
                );
            }
            Ok(report) => {
                error!(
                    "[Mirror] Manual run finished with failures: {:?}",
                    report.failed_collections()
                );
            }
            Err(err) => error!("[Mirror] Manual run failed: {}", err),
        }
    });
    runtime.track_manual_run(handle).await;

    Ok(StatusCode::ACCEPTED)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mirror/status", get(get_mirror_status))
        .route("/mirror/run", post(trigger_mirror_run))
}
