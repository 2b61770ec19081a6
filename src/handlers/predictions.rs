//! Failure prediction handlers

use axum::{extract::{Path, Query, State}, Json};
use validator::Validate;

use crate::{AppError, AppResult, AppState};
use crate::models::{
    Dashboard, EntityType, PredictionQuery, PredictionRequest, PredictionSummary, Top3Summary,
    TopQuery, TopRiskyEntity,
};

/// Score the current window
pub async fn get_predictions(
    State(state): State<AppState>,
    Query(query): Query<PredictionQuery>,
) -> AppResult<Json<PredictionSummary>> {
    query.validate()?;
    let summary = state.predictions.get_predictions(&query, None).await?;
    Ok(Json(summary))
}

/// Same as `get_predictions` with a partial scoring config override
pub async fn post_predictions(
    State(state): State<AppState>,
    Json(req): Json<PredictionRequest>,
) -> AppResult<Json<PredictionSummary>> {
    req.query.validate()?;
    let summary = state
        .predictions
        .get_predictions(&req.query, req.config.as_ref())
        .await?;
    Ok(Json(summary))
}

pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<Dashboard>> {
    Ok(Json(state.predictions.dashboard().await?))
}

pub async fn merchants_at_risk(
    state: State<AppState>,
    query: Query<PredictionQuery>,
) -> AppResult<Json<PredictionSummary>> {
    at_risk(state, query, EntityType::Merchant).await
}

pub async fn providers_at_risk(
    state: State<AppState>,
    query: Query<PredictionQuery>,
) -> AppResult<Json<PredictionSummary>> {
    at_risk(state, query, EntityType::Provider).await
}

async fn at_risk(
    State(state): State<AppState>,
    Query(query): Query<PredictionQuery>,
    entity_type: EntityType,
) -> AppResult<Json<PredictionSummary>> {
    let query = PredictionQuery {
        entity_type: Some(entity_type),
        ..query
    };
    query.validate()?;
    Ok(Json(state.predictions.get_predictions(&query, None).await?))
}

/// Top 3 per dimension plus overall
pub async fn top3(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> AppResult<Json<Top3Summary>> {
    query.validate()?;
    Ok(Json(state.predictions.top3_summary(query.time_window_minutes).await?))
}

/// Top 3 of one scope: merchants, providers, methods or overall
pub async fn top3_scope(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    Query(query): Query<TopQuery>,
) -> AppResult<Json<Vec<TopRiskyEntity>>> {
    query.validate()?;
    let window = query.time_window_minutes;

    let top = match scope.as_str() {
        "overall" => state.predictions.overall_top3(window).await?,
        other => {
            let entity_type = match other.parse::<EntityType>() {
                Ok(et @ (EntityType::Merchant | EntityType::Provider | EntityType::Method)) => et,
                _ => {
                    return Err(AppError::ValidationError(format!(
                        "unknown scope '{}', expected merchants, providers, methods or overall",
                        other
                    )))
                }
            };
            state.predictions.top3_by_entity(entity_type, window).await?
        }
    };

    Ok(Json(top))
}
