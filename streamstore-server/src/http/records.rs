use axum::{
    Json,
    extract::{FromRequest, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use streamstore::{RecordId, StreamState, WriteBatch};

use super::error::{AppError, AppResult};
use crate::{
    api::{CreateRecordRequest, ReadFileRequest, WriteFileRequest},
    state::AppState,
};

/// JSON extractor that reports rejections as [`AppError`]s.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

fn record_id(id: &str) -> AppResult<RecordId> {
    Ok(id.parse()?)
}

pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<StreamState>)> {
    let record = record_id(&id)?;
    let initial = if body.is_empty() {
        None
    } else {
        let req: CreateRecordRequest =
            serde_json::from_slice(&body).map_err(AppError::bad_request)?;
        Some(req.into())
    };
    let state = state.store.create(record, initial).await?;
    Ok((StatusCode::CREATED, Json(state)))
}

pub async fn stat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<StreamState>> {
    let record = record_id(&id)?;
    Ok(Json(state.store.stat(record).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let record = record_id(&id)?;
    state.store.delete(record).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn write(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(req): AppJson<WriteFileRequest>,
) -> AppResult<Json<StreamState>> {
    let record = record_id(&id)?;
    let mut batch = WriteBatch::new(record, req.version).force(req.force);
    for (i, op) in req.operations.into_iter().enumerate() {
        let pos = op.pos;
        let op = op
            .into_operation()
            .ok_or_else(|| AppError::bad_request(format!("operation {i}: invalid pos {pos}")))?;
        batch = batch.with(op);
    }
    Ok(Json(state.store.write(batch).await?))
}

pub async fn read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(req): AppJson<ReadFileRequest>,
) -> AppResult<impl IntoResponse> {
    let record = record_id(&id)?;
    let data = state.store.read(record, req.range).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}
