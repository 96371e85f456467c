//! Threat intake and triage handlers

use axum::{extract::{State, Path}, Json, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::{AppState, AppError, AppResult};
use crate::detect::{self, Observation};
use crate::models::{
    AnalysisJob, AnalyzeResponse, Incident, ResponseAction, Threat, ThreatData,
    threat::status,
};
use crate::middleware::auth::UserContext;

fn observe(data: &ThreatData) -> Observation<'_> {
    Observation {
        payload: data.payload.as_deref(),
        behavior: data.behavior.as_deref(),
        protocol: data.protocol.as_deref(),
    }
}

/// Analyze a single threat submission and persist the record
pub async fn analyze(
    State(state): State<AppState>,
    Json(data): Json<ThreatData>,
) -> AppResult<Json<AnalyzeResponse>> {
    if data.source_ip.trim().is_empty() {
        return Err(AppError::ValidationError("source_ip is required".to_string()));
    }

    tracing::info!("Analyzing threat from {}", data.source_ip);

    let verdict = detect::analyze(&observe(&data));
    let threat = Threat::create(&state.pool, &data, &verdict).await?;

    tracing::info!(
        "Threat analysis result: {} with {:.2} confidence",
        verdict.severity, verdict.confidence
    );

    Ok(Json(AnalyzeResponse {
        id: threat.id,
        severity: verdict.severity.as_str().to_string(),
        confidence: verdict.confidence,
        techniques: verdict.techniques,
        recommendation: verdict.recommendation.to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct BatchAnalyzeResponse {
    pub job_id: Uuid,
    pub message: String,
    pub status_endpoint: String,
}

/// Submit multiple threats for background analysis
pub async fn batch_analyze(
    State(state): State<AppState>,
    Json(threats): Json<Vec<ThreatData>>,
) -> AppResult<(StatusCode, Json<BatchAnalyzeResponse>)> {
    let job_id = Uuid::new_v4();
    AnalysisJob::create(&state.pool, job_id, threats.len() as i32).await?;

    let count = threats.len();
    tokio::spawn(process_batch(state.clone(), job_id, threats));

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchAnalyzeResponse {
            job_id,
            message: format!("Batch job started with {} threats", count),
            status_endpoint: format!("/api/v1/threats/status/{}", job_id),
        }),
    ))
}

/// Background worker for a batch analysis job
async fn process_batch(state: AppState, job_id: Uuid, threats: Vec<ThreatData>) {
    if let Err(e) = AnalysisJob::mark_processing(&state.pool, job_id).await {
        tracing::error!("Failed to start batch job {}: {}", job_id, e);
        return;
    }

    let mut results: Vec<serde_json::Value> = Vec::with_capacity(threats.len());

    for (i, data) in threats.iter().enumerate() {
        let verdict = detect::analyze(&observe(data));

        let result = match Threat::create(&state.pool, data, &verdict).await {
            Ok(threat) => json!({
                "id": threat.id,
                "source_ip": data.source_ip,
                "severity": verdict.severity.as_str(),
                "confidence": verdict.confidence,
                "techniques": verdict.techniques,
                "recommendation": verdict.recommendation,
            }),
            Err(e) => {
                tracing::error!("Error processing threat in batch {}: {}", job_id, e);
                json!({
                    "source_ip": data.source_ip,
                    "error": e.to_string(),
                    "severity": "UNKNOWN",
                    "confidence": 0.0,
                    "techniques": [],
                    "recommendation": "Failed to analyze",
                })
            }
        };
        results.push(result);

        let snapshot = json!(results);
        if let Err(e) = AnalysisJob::update_progress(
            &state.pool, job_id, (i + 1) as i32, &snapshot,
        ).await {
            tracing::error!("Failed to update batch job {}: {}", job_id, e);
            let _ = AnalysisJob::mark_failed(&state.pool, job_id, &e.to_string()).await;
            return;
        }
    }

    let final_results = json!(results);
    if let Err(e) = AnalysisJob::mark_completed(&state.pool, job_id, &final_results).await {
        tracing::error!("Failed to complete batch job {}: {}", job_id, e);
        return;
    }

    tracing::info!("Batch analysis job {} completed successfully", job_id);
}

/// Check the status of a batch analysis job
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<AnalysisJob>> {
    let job = AnalysisJob::find_by_id(&state.pool, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job ID {} not found", job_id)))?;

    Ok(Json(job))
}

/// Get recently analyzed threats
pub async fn recent(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Threat>>> {
    let threats = Threat::recent(&state.pool, state.config.max_recent_threats).await?;
    Ok(Json(threats))
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub message: String,
    pub threat: Threat,
}

/// Mark a threat as resolved after investigation
pub async fn resolve(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ActionResponse>> {
    let threat = Threat::set_status(&state.pool, id, status::RESOLVED, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Threat with ID {} not found", id)))?;

    ResponseAction::record(
        &state.pool, id, "resolve",
        json!({ "resolved_by": user.email }),
        user.user_id,
    ).await?;

    tracing::info!("Threat {} resolved by {}", id, user.email);

    Ok(Json(ActionResponse {
        message: format!("Threat {} marked as resolved", id),
        threat,
    }))
}

/// Block the source IP of a threat
pub async fn block(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ActionResponse>> {
    let existing = Threat::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Threat with ID {} not found", id)))?;

    if existing.source_ip.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Threat doesn't have a source IP to block".to_string()
        ));
    }

    let threat = Threat::set_status(&state.pool, id, status::BLOCKED, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Threat with ID {} not found", id)))?;

    ResponseAction::record(
        &state.pool, id, "block",
        json!({ "blocked_ip": threat.source_ip, "blocked_by": user.email }),
        user.user_id,
    ).await?;

    // Firewall/IPS integration would go here; the block is recorded only.
    tracing::info!(
        "Source IP {} from threat {} blocked by {}",
        threat.source_ip, id, user.email
    );

    Ok(Json(ActionResponse {
        message: format!("Source IP {} from threat {} has been blocked", threat.source_ip, id),
        threat,
    }))
}

/// Escalate a threat to an incident for further investigation
pub async fn escalate(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ActionResponse>> {
    let threat = Threat::set_status(&state.pool, id, status::ESCALATED, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Threat with ID {} not found", id)))?;

    let title = format!(
        "{} from {}",
        threat.behavior.as_deref().unwrap_or("unknown activity"),
        threat.source_ip
    );
    let incident = Incident::create_from_threat(
        &state.pool,
        id,
        &title,
        &threat.severity,
        threat.recommendation.as_deref(),
    ).await?;

    ResponseAction::record(
        &state.pool, id, "escalate",
        json!({ "incident_id": incident.id, "escalated_by": user.email }),
        user.user_id,
    ).await?;

    tracing::info!("Threat {} escalated to incident {} by {}", id, incident.id, user.email);

    Ok(Json(ActionResponse {
        message: format!("Threat {} escalated to incident", id),
        threat,
    }))
}
