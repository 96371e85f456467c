//! Batch analysis job model
//!
//! Job state lives in Postgres so progress survives restarts.

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub status: String,
    pub total: i32,
    pub completed: i32,
    pub results: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub async fn create(pool: &PgPool, id: Uuid, total: i32) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AnalysisJob>(
            r#"
            INSERT INTO analysis_jobs (id, status, total)
            VALUES ($1, 'PENDING', $2)
            RETURNING *
            "#
        )
        .bind(id)
        .bind(total)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AnalysisJob>("SELECT * FROM analysis_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn mark_processing(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE analysis_jobs SET status = 'PROCESSING' WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record per-item progress and the accumulated results so far.
    pub async fn update_progress(
        pool: &PgPool,
        id: Uuid,
        completed: i32,
        results: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE analysis_jobs SET completed = $2, results = $3 WHERE id = $1"
        )
        .bind(id)
        .bind(completed)
        .bind(results)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_completed(
        pool: &PgPool,
        id: Uuid,
        results: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = 'COMPLETED', results = $2, finished_at = NOW()
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(results)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = 'FAILED', error = $2, finished_at = NOW()
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
