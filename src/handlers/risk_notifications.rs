//! Risk notification handlers

use axum::{extract::{Path, Query, State}, Json};
use uuid::Uuid;
use validator::Validate;

use crate::{AppResult, AppState};
use crate::escalation::SweepReport;
use crate::models::{
    DismissRequest, Page, RiskNotification, RiskNotificationFilter, RiskNotificationSummary,
};

/// List risk notifications, newest first
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<RiskNotificationFilter>,
) -> AppResult<Json<Page<RiskNotificationSummary>>> {
    filter.validate()?;
    Ok(Json(state.orchestrator.list(&filter).await?))
}

/// Records still waiting on the guard
pub async fn pending(State(state): State<AppState>) -> AppResult<Json<Vec<RiskNotification>>> {
    Ok(Json(state.orchestrator.pending().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RiskNotification>> {
    Ok(Json(state.orchestrator.get(id).await?))
}

pub async fn dismiss(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DismissRequest>,
) -> AppResult<Json<RiskNotification>> {
    req.validate()?;
    Ok(Json(state.orchestrator.dismiss(id, req).await?))
}

/// Dismiss from the link in a guard message
pub async fn dismiss_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(req): Query<DismissRequest>,
) -> AppResult<Json<RiskNotification>> {
    req.validate()?;
    Ok(Json(state.orchestrator.dismiss(id, req).await?))
}

/// Escalate to the whole team now
pub async fn propagate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RiskNotification>> {
    Ok(Json(state.orchestrator.propagate(id).await?))
}

pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RiskNotification>> {
    Ok(Json(state.orchestrator.resolve(id).await?))
}

/// Run a risk sweep outside the schedule
pub async fn check_now(State(state): State<AppState>) -> AppResult<Json<SweepReport>> {
    Ok(Json(state.orchestrator.check_and_notify_risks().await?))
}
