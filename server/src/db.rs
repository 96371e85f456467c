//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create tables if not exist. raw_sql runs the whole multi-statement
    // script in one round trip.
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Users (analysts)
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    email VARCHAR(255) NOT NULL UNIQUE,
    password_hash VARCHAR(255) NOT NULL,
    full_name VARCHAR(255) NOT NULL,
    is_active BOOLEAN DEFAULT true,
    last_login TIMESTAMPTZ,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

-- Threat records (normalized alerts plus analysis outcome)
CREATE TABLE IF NOT EXISTS threats (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    source_ip VARCHAR(45) NOT NULL,
    destination_ip VARCHAR(45),
    protocol VARCHAR(20),
    payload TEXT,
    behavior VARCHAR(100),
    event_time VARCHAR(100),
    additional_data JSONB,
    severity VARCHAR(20) NOT NULL,
    confidence REAL NOT NULL,
    techniques JSONB NOT NULL,
    recommendation TEXT,
    status VARCHAR(20) DEFAULT 'OPEN',
    acted_by UUID REFERENCES users(id),
    acted_at TIMESTAMPTZ,
    analyzed_at TIMESTAMPTZ DEFAULT NOW()
);

-- Response actions (audit trail of triage)
CREATE TABLE IF NOT EXISTS response_actions (
    id BIGSERIAL PRIMARY KEY,
    threat_id UUID REFERENCES threats(id) ON DELETE CASCADE,
    action_type VARCHAR(50) NOT NULL,
    details JSONB,
    performer_id UUID REFERENCES users(id),
    created_at TIMESTAMPTZ DEFAULT NOW()
);

-- Batch analysis jobs
CREATE TABLE IF NOT EXISTS analysis_jobs (
    id UUID PRIMARY KEY,
    status VARCHAR(20) NOT NULL DEFAULT 'PENDING',
    total INT NOT NULL,
    completed INT NOT NULL DEFAULT 0,
    results JSONB,
    error TEXT,
    started_at TIMESTAMPTZ DEFAULT NOW(),
    finished_at TIMESTAMPTZ
);

-- Incidents (threats escalated for investigation)
CREATE TABLE IF NOT EXISTS incidents (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    threat_id UUID REFERENCES threats(id) ON DELETE CASCADE,
    title VARCHAR(500) NOT NULL,
    severity VARCHAR(20) NOT NULL,
    description TEXT,
    status VARCHAR(20) DEFAULT 'OPEN',
    created_at TIMESTAMPTZ DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_threats_severity ON threats(severity);
CREATE INDEX IF NOT EXISTS idx_threats_status ON threats(status);
CREATE INDEX IF NOT EXISTS idx_threats_analyzed ON threats(analyzed_at);
CREATE INDEX IF NOT EXISTS idx_threats_source ON threats(source_ip);
CREATE INDEX IF NOT EXISTS idx_actions_threat ON response_actions(threat_id);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON analysis_jobs(status);
CREATE INDEX IF NOT EXISTS idx_incidents_threat ON incidents(threat_id);
"#;
