//! Response action audit trail

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ResponseAction {
    pub id: i64,
    pub threat_id: Option<Uuid>,
    pub action_type: String,
    pub details: Option<serde_json::Value>,
    pub performer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ResponseAction {
    /// Record a triage action taken against a threat.
    pub async fn record(
        pool: &PgPool,
        threat_id: Uuid,
        action_type: &str,
        details: serde_json::Value,
        performer_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO response_actions (threat_id, action_type, details, performer_id)
            VALUES ($1, $2, $3, $4)
            "#
        )
        .bind(threat_id)
        .bind(action_type)
        .bind(details)
        .bind(performer_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
