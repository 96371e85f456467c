//! Incident model
//!
//! Incidents are threats escalated by an analyst for investigation.

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Incident {
    pub id: Uuid,
    pub threat_id: Option<Uuid>,
    pub title: String,
    pub severity: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    /// Create an incident from an escalated threat.
    pub async fn create_from_threat(
        pool: &PgPool,
        threat_id: Uuid,
        title: &str,
        severity: &str,
        description: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Incident>(
            r#"
            INSERT INTO incidents (threat_id, title, severity, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#
        )
        .bind(threat_id)
        .bind(title)
        .bind(severity)
        .bind(description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Incident>("SELECT * FROM incidents WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Incident>(
            "SELECT * FROM incidents ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}
