//! Incidents handlers

use axum::{extract::{State, Path, Query}, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, AppResult, AppError};
use crate::models::Incident;
use crate::middleware::auth::UserContext;

#[derive(Debug, Deserialize, Default)]
pub struct IncidentFilter {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List all security incidents
pub async fn list(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<IncidentFilter>,
) -> AppResult<Json<Vec<Incident>>> {
    let incidents = Incident::list(
        &state.pool,
        filter.limit.unwrap_or(50),
        filter.offset.unwrap_or(0),
    ).await?;
    Ok(Json(incidents))
}

/// Get details of a specific security incident
pub async fn get(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Incident>> {
    let incident = Incident::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Incident not found".to_string()))?;

    Ok(Json(incident))
}
