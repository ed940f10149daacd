// src/handlers.rs
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::auth::{self, Caller};
use crate::error::AppError;
use crate::models::{
    AuthRequest, CreatePollRequest, DeletePollRequest, PollView, UpdateStatusRequest, VoteRequest,
};
use crate::poll;
use crate::state::AppState;

/// Decodes a JSON body, treating an empty body as `{}`.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) { b"{}".as_slice() } else { body };
    serde_json::from_slice(body).map_err(|_| AppError::bad_request("Invalid JSON body"))
}

/// `send_code` / `verify_code`, selected by the `action` field.
pub async fn authenticate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let store = state.store()?;
    let req: AuthRequest = parse_body(&body)?;

    match req.action.as_deref() {
        Some("send_code") => {
            let identifier = auth::parse_identifier(req.email.as_deref(), req.phone.as_deref())?;
            let name = req.name.as_deref();
            let issued = auth::send_code(store, &identifier, name, Utc::now()).await?;
            Ok(Json(json!({
                "success": true,
                "code": issued.code,
                "message": format!("Code sent to {identifier}"),
            })))
        }
        Some("verify_code") => {
            let code = req.code.as_deref().map(str::trim).unwrap_or_default();
            let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
            let phone = req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
            if code.is_empty() || (email.is_none() && phone.is_none()) {
                let msg = match (email, phone) {
                    (None, Some(_)) => "Phone and code required",
                    _ => "Email and code required",
                };
                return Err(AppError::bad_request(msg));
            }
            let identifier = auth::parse_identifier(email, phone)?;
            let session = auth::verify_code(store, &identifier, code, Utc::now()).await?;
            Ok(Json(json!({
                "success": true,
                "token": session.token,
                "user": session.user,
            })))
        }
        _ => Err(AppError::bad_request("Invalid action")),
    }
}

pub async fn list_polls(State(state): State<AppState>) -> Result<Json<Vec<PollView>>, AppError> {
    let polls = poll::list_polls(state.store()?).await?;
    Ok(Json(polls))
}

pub async fn vote(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, AppError> {
    let store = state.store()?;
    let req: VoteRequest = parse_body(&body)?;
    poll::cast_vote(store, req).await?;
    Ok(Json(json!({ "success": true, "message": "Vote recorded successfully" })))
}

pub async fn create_poll(
    State(state): State<AppState>,
    caller: Caller,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let store = state.store()?;
    let req: CreatePollRequest = parse_body(&body)?;
    let created = poll::create_poll(store, &caller, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "poll_id": created.id,
            "poll": created,
            "message": "Poll created successfully",
        })),
    ))
}

pub async fn update_poll_status(
    State(state): State<AppState>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let store = state.store()?;
    let req: UpdateStatusRequest = parse_body(&body)?;
    let (poll_id, status) = poll::change_status(store, &caller, req).await?;
    Ok(Json(json!({
        "success": true,
        "poll_id": poll_id,
        "message": format!("Poll status changed to {status}"),
    })))
}

pub async fn delete_poll(
    State(state): State<AppState>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let store = state.store()?;
    let req: DeletePollRequest = parse_body(&body)?;
    let poll_id = poll::delete_poll(store, &caller, req).await?;
    Ok(Json(json!({
        "success": true,
        "poll_id": poll_id,
        "message": "Poll deleted successfully",
    })))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

pub async fn not_found() -> AppError {
    AppError::NotFound("Not found".into())
}
