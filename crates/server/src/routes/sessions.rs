use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use tutor_core::{
    Analysis, GameStatus, MoveOutcome, PromotionPiece, SessionView, TutorReply, UndoOutcome,
};

use crate::error::AppError;
use crate::store::SessionStore;

#[derive(Serialize)]
pub struct SessionResponse {
    pub id: u64,
    #[serde(flatten)]
    pub view: SessionView,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub fen: String,
    pub status: GameStatus,
    pub status_text: String,
    pub move_list: String,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub from: String,
    pub to: String,
    /// "q", "r", "b" or "n"; omitted means queen when promoting
    pub promotion: Option<String>,
}

#[derive(Deserialize)]
pub struct AskRequest {
    pub message: String,
}

pub async fn create_session(
    Extension(store): Extension<Arc<SessionStore>>,
) -> (StatusCode, Json<SessionResponse>) {
    let (id, session) = store.create().await;
    let view = session.lock().await.snapshot();
    (StatusCode::CREATED, Json(SessionResponse { id, view }))
}

pub async fn get_session(
    Extension(store): Extension<Arc<SessionStore>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = store.get(id).await?;
    let view = session.lock().await.snapshot();
    Ok(Json(SessionResponse { id, view }))
}

pub async fn delete_session(
    Extension(store): Extension<Arc<SessionStore>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    store.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn new_game(
    Extension(store): Extension<Arc<SessionStore>>,
    Path(id): Path<u64>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = store.get(id).await?;
    let view = session.lock().await.new_game();
    Ok(Json(SessionResponse { id, view }))
}

pub async fn make_move(
    Extension(store): Extension<Arc<SessionStore>>,
    Path(id): Path<u64>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MoveOutcome>, AppError> {
    let promotion = req
        .promotion
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse::<PromotionPiece>)
        .transpose()?;

    let session = store.get(id).await?;
    let mut session = session.lock().await;
    let outcome = session.apply_move(&req.from, &req.to, promotion).await?;
    Ok(Json(outcome))
}

pub async fn undo(
    Extension(store): Extension<Arc<SessionStore>>,
    Path(id): Path<u64>,
) -> Result<Json<UndoOutcome>, AppError> {
    let session = store.get(id).await?;
    let outcome = session.lock().await.undo()?;
    Ok(Json(outcome))
}

pub async fn get_status(
    Extension(store): Extension<Arc<SessionStore>>,
    Path(id): Path<u64>,
) -> Result<Json<StatusResponse>, AppError> {
    let session = store.get(id).await?;
    let session = session.lock().await;
    let status = session.status();
    Ok(Json(StatusResponse {
        fen: session.board().fen(),
        status,
        status_text: status.describe(),
        move_list: session.board().move_list(),
    }))
}

pub async fn get_analysis(
    Extension(store): Extension<Arc<SessionStore>>,
    Path(id): Path<u64>,
) -> Result<Json<Analysis>, AppError> {
    let session = store.get(id).await?;
    let analysis = session.lock().await.get_analysis().await;
    Ok(Json(analysis))
}

pub async fn ask_tutor(
    Extension(store): Extension<Arc<SessionStore>>,
    Path(id): Path<u64>,
    Json(req): Json<AskRequest>,
) -> Result<Json<TutorReply>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".into()));
    }

    let session = store.get(id).await?;
    let reply = session.lock().await.ask_tutor(message).await;
    Ok(Json(reply))
}
