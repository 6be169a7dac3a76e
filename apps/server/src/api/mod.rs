//! HTTP endpoints: survey intake and mirror control.

mod mirror;
mod respuestas;

use std::sync::Arc;

use axum::{response::Html, Router};

use crate::form::render_form;
use crate::main_lib::AppState;

pub async fn form_page() -> Html<String> {
    Html(render_form())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(respuestas::router())
        .merge(mirror::router())
}
