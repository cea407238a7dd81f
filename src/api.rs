//! HTTP API for the poll core.
//!
//! Thin transport layer: handlers resolve the caller, stamp the request
//! with the server clock and delegate to the state engines. Errors map to
//! structured `{code, message}` responses via `CoreError`.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::state::{AppState, CommentOutcome, ResultsPayload, RoomUpdate};
use crate::types::*;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub host_id: UserId,
    #[serde(flatten)]
    pub config: RoomConfig,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoomRequest {
    pub user_id: UserId,
    #[serde(flatten)]
    pub update: RoomUpdate,
}

#[derive(Debug, Serialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: Room,
    pub phase: Phase,
    pub server_now: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AddOptionRequest {
    pub user_id: UserId,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub user_id: UserId,
    pub content: String,
    #[serde(default)]
    pub related_option_id: Option<OptionId>,
    #[serde(default)]
    pub is_pro: bool,
    #[serde(default)]
    pub is_con: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommentVoteRequest {
    pub user_id: UserId,
    pub direction: CommentVoteDirection,
}

#[derive(Debug, Deserialize)]
pub struct BallotRequest {
    pub user_id: UserId,
    pub option_ids: Vec<OptionId>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub user_id: UserId,
}

/// Caller id for GET/DELETE requests, which carry no body
fn user_from_headers(headers: &HeaderMap) -> CoreResult<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::UnknownUser("missing X-User-Id header".into()))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{id}", get(get_room).patch(update_room))
        .route(
            "/api/rooms/{id}/options",
            get(list_options).post(add_option),
        )
        .route(
            "/api/rooms/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .route("/api/rooms/{id}/votes", post(submit_vote))
        .route("/api/rooms/{id}/results", get(get_results))
        .route("/api/options/{id}", delete(remove_option))
        .route("/api/options/{id}/approve", post(approve_option))
        .route("/api/comments/{id}", delete(delete_comment))
        .route("/api/comments/{id}/vote", post(vote_on_comment))
        .route("/api/comments/{id}/approve", post(approve_comment))
        .route("/api/votes/{id}", put(edit_vote).delete(delete_vote))
        .with_state(state)
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRoomRequest>,
) -> CoreResult<Json<Room>> {
    let room = state
        .create_room(&req.host_id, req.config, Utc::now())
        .await?;
    Ok(Json(room))
}

async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> CoreResult<Json<RoomView>> {
    let now = Utc::now();
    let room = state.get_room(&id).await?;
    Ok(Json(RoomView {
        phase: crate::phase::phase(&room, now),
        room,
        server_now: now,
    }))
}

async fn update_room(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoomRequest>,
) -> CoreResult<Json<Room>> {
    let room = state
        .update_room(&id, &req.user_id, req.update, Utc::now())
        .await?;
    Ok(Json(room))
}

async fn list_options(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> CoreResult<Json<Vec<PollOption>>> {
    state.get_room(&id).await?;
    let include_watchlisted = match user_from_headers(&headers) {
        Ok(user_id) => state.requester(&user_id).await?.is_admin,
        Err(_) => false,
    };
    Ok(Json(state.list_options(&id, include_watchlisted).await))
}

async fn add_option(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddOptionRequest>,
) -> CoreResult<Json<PollOption>> {
    let option = state
        .add_option(&id, &req.user_id, req.text, Utc::now())
        .await?;
    Ok(Json(option))
}

async fn remove_option(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> CoreResult<Json<serde_json::Value>> {
    let user_id = user_from_headers(&headers)?;
    state.remove_option(&id, &user_id).await?;
    Ok(Json(serde_json::json!({ "removed": id })))
}

async fn approve_option(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> CoreResult<Json<PollOption>> {
    let option = state.approve_option(&id, &req.user_id).await?;
    Ok(Json(option))
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> CoreResult<Json<Vec<Comment>>> {
    state.get_room(&id).await?;
    let include_watchlisted = match user_from_headers(&headers) {
        Ok(user_id) => state.requester(&user_id).await?.is_admin,
        Err(_) => false,
    };
    Ok(Json(state.list_comments(&id, include_watchlisted).await))
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddCommentRequest>,
) -> CoreResult<Json<CommentOutcome>> {
    let outcome = state
        .add_comment(
            &id,
            &req.user_id,
            req.content,
            req.related_option_id,
            req.is_pro,
            req.is_con,
            Utc::now(),
        )
        .await?;
    Ok(Json(outcome))
}

async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> CoreResult<Json<serde_json::Value>> {
    let user_id = user_from_headers(&headers)?;
    state.delete_comment(&id, &user_id).await?;
    Ok(Json(serde_json::json!({ "removed": id })))
}

async fn vote_on_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CommentVoteRequest>,
) -> CoreResult<Json<Comment>> {
    let comment = state
        .vote_on_comment(&id, &req.user_id, req.direction)
        .await?;
    Ok(Json(comment))
}

async fn approve_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> CoreResult<Json<Comment>> {
    let comment = state.approve_comment(&id, &req.user_id).await?;
    Ok(Json(comment))
}

async fn submit_vote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<BallotRequest>,
) -> CoreResult<Json<Vote>> {
    let vote = state
        .submit_vote(&id, &req.user_id, req.option_ids, Utc::now())
        .await?;
    Ok(Json(vote))
}

async fn edit_vote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<BallotRequest>,
) -> CoreResult<Json<Vote>> {
    let vote = state
        .edit_vote(&id, &req.user_id, req.option_ids, Utc::now())
        .await?;
    Ok(Json(vote))
}

async fn delete_vote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> CoreResult<Json<serde_json::Value>> {
    let user_id = user_from_headers(&headers)?;
    state.delete_vote(&id, &user_id, Utc::now()).await?;
    Ok(Json(serde_json::json!({ "removed": id })))
}

async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> CoreResult<Json<ResultsPayload>> {
    let user_id = user_from_headers(&headers)?;
    let results = state.get_results(&id, &user_id, Utc::now()).await?;
    Ok(Json(results))
}
