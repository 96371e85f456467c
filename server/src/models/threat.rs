//! Threat record model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::detect::Verdict;

/// Persisted threat record: the normalized alert plus analysis outcome.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Threat {
    pub id: Uuid,
    pub source_ip: String,
    pub destination_ip: Option<String>,
    pub protocol: Option<String>,
    pub payload: Option<String>,
    pub behavior: Option<String>,
    pub event_time: Option<String>,
    pub additional_data: Option<serde_json::Value>,
    pub severity: String,
    pub confidence: f32,
    pub techniques: serde_json::Value,
    pub recommendation: Option<String>,
    pub status: String,
    pub acted_by: Option<Uuid>,
    pub acted_at: Option<DateTime<Utc>>,
    pub analyzed_at: DateTime<Utc>,
}

/// Inbound threat submission (connector, simulator, or manual report).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreatData {
    pub source_ip: String,
    pub destination_ip: Option<String>,
    pub protocol: Option<String>,
    pub payload: Option<String>,
    pub behavior: Option<String>,
    pub timestamp: Option<String>,
    pub additional_data: Option<serde_json::Value>,
}

/// Analysis response returned to the submitter.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub id: Uuid,
    pub severity: String,
    pub confidence: f32,
    pub techniques: Vec<String>,
    pub recommendation: String,
}

/// Threat status values used by the triage actions.
pub mod status {
    pub const OPEN: &str = "OPEN";
    pub const RESOLVED: &str = "RESOLVED";
    pub const BLOCKED: &str = "BLOCKED";
    pub const ESCALATED: &str = "ESCALATED";
}

impl Threat {
    /// Persist a submitted threat together with its verdict.
    pub async fn create(
        pool: &PgPool,
        data: &ThreatData,
        verdict: &Verdict,
    ) -> Result<Self, sqlx::Error> {
        let techniques = serde_json::to_value(&verdict.techniques)
            .unwrap_or_else(|_| serde_json::Value::Array(vec![]));

        sqlx::query_as::<_, Threat>(
            r#"
            INSERT INTO threats
                (id, source_ip, destination_ip, protocol, payload, behavior,
                 event_time, additional_data, severity, confidence, techniques,
                 recommendation)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#
        )
        .bind(Uuid::new_v4())
        .bind(&data.source_ip)
        .bind(&data.destination_ip)
        .bind(&data.protocol)
        .bind(&data.payload)
        .bind(&data.behavior)
        .bind(&data.timestamp)
        .bind(&data.additional_data)
        .bind(verdict.severity.as_str())
        .bind(verdict.confidence)
        .bind(&techniques)
        .bind(verdict.recommendation)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Threat>("SELECT * FROM threats WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Most recently analyzed threats, newest first.
    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Threat>(
            "SELECT * FROM threats ORDER BY analyzed_at DESC LIMIT $1"
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Apply a triage action, recording who acted and when.
    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        new_status: &str,
        actor: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Threat>(
            r#"
            UPDATE threats
            SET status = $2, acted_by = $3, acted_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(new_status)
        .bind(actor)
        .fetch_optional(pool)
        .await
    }

    pub async fn count_by_severity(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT severity, COUNT(*) as count FROM threats GROUP BY severity"
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|r| {
            (r.get::<String, _>("severity"), r.get::<i64, _>("count"))
        }).collect())
    }

    pub async fn count_by_behavior(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT COALESCE(behavior, 'unknown') as behavior, COUNT(*) as count
            FROM threats
            GROUP BY behavior
            ORDER BY count DESC
            "#
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|r| {
            (r.get::<String, _>("behavior"), r.get::<i64, _>("count"))
        }).collect())
    }
}
