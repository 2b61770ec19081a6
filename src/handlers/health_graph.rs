//! Route health graph handlers

use axum::{extract::{Query, State}, Json};
use validator::Validate;

use crate::{AppResult, AppState};
use crate::models::{HealthGraph, HealthGraphQuery};

pub async fn get_graph(
    State(state): State<AppState>,
    Query(query): Query<HealthGraphQuery>,
) -> AppResult<Json<HealthGraph>> {
    query.validate()?;
    Ok(Json(state.predictions.health_graph(&query).await?))
}

/// Only routes that are not ok
pub async fn critical_routes(
    State(state): State<AppState>,
    Query(query): Query<HealthGraphQuery>,
) -> AppResult<Json<HealthGraph>> {
    let query = HealthGraphQuery {
        only_issues: true,
        ..query
    };
    query.validate()?;
    Ok(Json(state.predictions.health_graph(&query).await?))
}
