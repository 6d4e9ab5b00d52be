use std::sync::Arc;

use axum::{Extension, Json};
use serde::Serialize;
use tutor_core::EngineState;

use crate::store::SessionStore;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `None` when the engine is disabled by configuration
    pub engine: Option<EngineState>,
    /// A search is in progress; health never waits for it
    pub engine_busy: bool,
    pub sessions: usize,
}

pub async fn health_check(Extension(store): Extension<Arc<SessionStore>>) -> Json<HealthResponse> {
    let (engine, engine_busy) = match store.engine().map(|e| e.try_state()) {
        None => (None, false),
        Some(Some(state)) => (Some(state), false),
        // Only a running engine is ever taken out for a search
        Some(None) => (Some(EngineState::Running), true),
    };

    Json(HealthResponse {
        status: "ok",
        engine,
        engine_busy,
        sessions: store.len().await,
    })
}
