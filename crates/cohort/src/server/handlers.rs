//! Request handlers for the REST API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::extract::{Json, Query};
use super::AppState;
use crate::error::Result;
use crate::model::{
    CoachingResource, Course, DiagnosticDomain, Formation, FormationPatch, NewParticipant,
    Notification, Participant, ParticipantPatch, Progress, Project, Session, SessionLink,
    SessionPatch,
};
use crate::registry::Upsert;
use crate::storage::{ParticipantQuery, StorageStats};

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// Always `"ok"` when the handler answers.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Stored participants.
    pub participants: i64,
    /// Seconds since the server started.
    pub uptime_seconds: u64,
}

#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> Result<Json<Health>> {
    Ok(Json(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        participants: state.registry.count()?,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Result<Json<StorageStats>> {
    Ok(Json(state.registry.stats()?))
}

// === Participants ===

#[instrument(skip(state))]
pub async fn list_participants(
    State(state): State<AppState>,
    Query(query): Query<ParticipantQuery>,
) -> Result<Json<Vec<Participant>>> {
    Ok(Json(state.registry.list(&query)?))
}

#[instrument(skip(state, body))]
pub async fn create_participant(
    State(state): State<AppState>,
    Json(body): Json<NewParticipant>,
) -> Result<impl IntoResponse> {
    let participant = state.registry.create(body)?;
    Ok((StatusCode::CREATED, Json(participant)))
}

#[instrument(skip(state))]
pub async fn get_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Participant>> {
    Ok(Json(state.registry.get(&id)?))
}

#[instrument(skip(state, body))]
pub async fn put_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Participant>,
) -> Result<impl IntoResponse> {
    let (participant, outcome) = state.registry.upsert(&id, body)?;
    let status = match outcome {
        Upsert::Created => StatusCode::CREATED,
        Upsert::Replaced => StatusCode::OK,
    };
    Ok((status, Json(participant)))
}

#[instrument(skip(state, body))]
pub async fn patch_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ParticipantPatch>,
) -> Result<Json<Participant>> {
    Ok(Json(state.registry.patch(&id, body)?))
}

#[instrument(skip(state))]
pub async fn delete_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.registry.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn participant_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Progress>> {
    Ok(Json(state.registry.progress(&id)?))
}

// === Nested collections ===

#[instrument(skip(state, body))]
pub async fn add_formation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Formation>,
) -> Result<impl IntoResponse> {
    let formation = state
        .registry
        .edit(&id, |p| p.add_formation(body).cloned())?;
    Ok((StatusCode::CREATED, Json(formation)))
}

#[instrument(skip(state, body))]
pub async fn update_formation(
    State(state): State<AppState>,
    Path((id, fid)): Path<(String, String)>,
    Json(body): Json<FormationPatch>,
) -> Result<Json<Formation>> {
    let formation = state
        .registry
        .edit(&id, |p| p.update_formation(&fid, body).cloned())?;
    Ok(Json(formation))
}

#[instrument(skip(state))]
pub async fn delete_formation(
    State(state): State<AppState>,
    Path((id, fid)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.registry.edit(&id, |p| p.remove_formation(&fid))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn add_course(
    State(state): State<AppState>,
    Path((id, fid)): Path<(String, String)>,
    Json(body): Json<Course>,
) -> Result<impl IntoResponse> {
    let course = state
        .registry
        .edit(&id, |p| p.add_course(&fid, body).cloned())?;
    Ok((StatusCode::CREATED, Json(course)))
}

#[instrument(skip(state))]
pub async fn delete_course(
    State(state): State<AppState>,
    Path((id, fid, cid)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    state.registry.edit(&id, |p| p.remove_course(&fid, &cid))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn add_session(
    State(state): State<AppState>,
    Path((id, fid, cid)): Path<(String, String, String)>,
    Json(body): Json<Session>,
) -> Result<impl IntoResponse> {
    let session = state
        .registry
        .edit(&id, |p| p.add_session(&fid, &cid, body).cloned())?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(skip(state, body))]
pub async fn update_session(
    State(state): State<AppState>,
    Path((id, fid, cid, sid)): Path<(String, String, String, String)>,
    Json(body): Json<SessionPatch>,
) -> Result<Json<Session>> {
    let session = state
        .registry
        .edit(&id, |p| p.update_session(&fid, &cid, &sid, body).cloned())?;
    Ok(Json(session))
}

#[instrument(skip(state))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path((id, fid, cid, sid)): Path<(String, String, String, String)>,
) -> Result<StatusCode> {
    state
        .registry
        .edit(&id, |p| p.remove_session(&fid, &cid, &sid))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn add_link(
    State(state): State<AppState>,
    Path((id, fid, cid, sid)): Path<(String, String, String, String)>,
    Json(body): Json<SessionLink>,
) -> Result<impl IntoResponse> {
    let link = state
        .registry
        .edit(&id, |p| p.add_link(&fid, &cid, &sid, body).cloned())?;
    Ok((StatusCode::CREATED, Json(link)))
}

#[instrument(skip(state))]
pub async fn delete_link(
    State(state): State<AppState>,
    Path((id, fid, cid, sid, lid)): Path<(String, String, String, String, String)>,
) -> Result<StatusCode> {
    state
        .registry
        .edit(&id, |p| p.remove_link(&fid, &cid, &sid, &lid))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn add_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Project>,
) -> Result<impl IntoResponse> {
    let project = state.registry.edit(&id, |p| p.add_project(body).cloned())?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[instrument(skip(state))]
pub async fn delete_project(
    State(state): State<AppState>,
    Path((id, pid)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.registry.edit(&id, |p| p.remove_project(&pid))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn add_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CoachingResource>,
) -> Result<impl IntoResponse> {
    let resource = state.registry.edit(&id, |p| p.add_resource(body).cloned())?;
    Ok((StatusCode::CREATED, Json(resource)))
}

#[instrument(skip(state))]
pub async fn delete_resource(
    State(state): State<AppState>,
    Path((id, rid)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.registry.edit(&id, |p| p.remove_resource(&rid))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, body))]
pub async fn push_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Notification>,
) -> Result<impl IntoResponse> {
    let notification = state
        .registry
        .edit(&id, |p| p.push_notification(body).cloned())?;
    Ok((StatusCode::CREATED, Json(notification)))
}

#[instrument(skip(state))]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path((id, nid)): Path<(String, String)>,
) -> Result<Json<Notification>> {
    let notification = state
        .registry
        .edit(&id, |p| p.mark_notification_read(&nid).cloned())?;
    Ok(Json(notification))
}

#[instrument(skip(state))]
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let changed = state
        .registry
        .edit(&id, |p| Ok(p.mark_all_notifications_read()))?;
    Ok(Json(serde_json::json!({ "marked": changed })))
}

// === Diagnostic domains ===

#[instrument(skip(state))]
pub async fn list_domains(State(state): State<AppState>) -> Result<Json<Vec<DiagnosticDomain>>> {
    Ok(Json(state.registry.domains()?))
}

#[instrument(skip(state, body))]
pub async fn create_domain(
    State(state): State<AppState>,
    Json(body): Json<DiagnosticDomain>,
) -> Result<impl IntoResponse> {
    let domain = state.registry.create_domain(body)?;
    Ok((StatusCode::CREATED, Json(domain)))
}

#[instrument(skip(state))]
pub async fn delete_domain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.registry.delete_domain(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
