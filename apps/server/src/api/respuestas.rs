//! Survey intake endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use bienestar_core::survey::{payload_from_json, question_catalog, Question, SubmissionReceipt};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

const RECEIVED_MESSAGE: &str = "Respuestas recibidas correctamente";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionResponse {
    mensaje: &'static str,
    receipt: SubmissionReceipt,
}

async fn list_questions() -> Json<Vec<Question>> {
    Json(question_catalog())
}

/// Stores one submission. The body is parsed by hand so that every malformed
/// payload gets the same 400 response shape.
async fn submit_answers(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Json<SubmissionResponse>> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::MalformedPayload(e.to_string()))?;
    let payload = payload_from_json(value)?;
    info!("[Survey] Received submission with {} answers", payload.len());

    let receipt = state.context.record_writer().submit(&payload).await;
    if !receipt.is_complete() {
        let written: Vec<String> = receipt
            .written_collections()
            .into_iter()
            .map(String::from)
            .collect();
        let failed: Vec<String> = receipt
            .failed_collections()
            .into_iter()
            .map(String::from)
            .collect();
        warn!(
            "[Survey] Submission partially stored written={:?} failed={:?}",
            written, failed
        );
        return Err(ApiError::PartialWrite { written, failed });
    }

    Ok(Json(SubmissionResponse {
        mensaje: RECEIVED_MESSAGE,
        receipt,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/preguntas", get(list_questions))
        .route("/respuestas", post(submit_answers))
}
