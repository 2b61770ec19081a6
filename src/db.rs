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
    // Multiple statements, so no prepared statement
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Route dimensions
CREATE TABLE IF NOT EXISTS merchants (
    id VARCHAR(64) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS providers (
    id VARCHAR(64) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS payment_methods (
    id VARCHAR(64) PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS countries (
    code CHAR(2) PRIMARY KEY,
    name VARCHAR(255) NOT NULL
);

-- Transactions (read-only for the risk engine)
CREATE TABLE IF NOT EXISTS transactions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    merchant_id VARCHAR(64) NOT NULL,
    provider_id VARCHAR(64) NOT NULL,
    method_id VARCHAR(64) NOT NULL,
    country_code CHAR(2) NOT NULL,
    status VARCHAR(20) NOT NULL,
    latency_ms INT,
    amount NUMERIC(18, 2),
    date TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Users (YUNO = internal staff)
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255),
    phone VARCHAR(32),
    slack_id VARCHAR(64),
    user_type VARCHAR(20) NOT NULL DEFAULT 'YUNO',
    active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

-- On-call rota
CREATE TABLE IF NOT EXISTS on_call_schedule (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    priority INT NOT NULL DEFAULT 1,
    active BOOLEAN NOT NULL DEFAULT true,
    start_at TIMESTAMPTZ,
    end_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Alerts
CREATE TABLE IF NOT EXISTS alerts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    severity VARCHAR(20) NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'open',
    title VARCHAR(500) NOT NULL,
    explanation TEXT,
    merchant_id VARCHAR(64),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Notification deliveries
CREATE TABLE IF NOT EXISTS notifications (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    alert_id UUID NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    channel VARCHAR(20) NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Risk notifications (escalation records)
CREATE TABLE IF NOT EXISTS risk_notifications (
    id UUID PRIMARY KEY,
    entity_type VARCHAR(20) NOT NULL,
    entity_id VARCHAR(255) NOT NULL,
    entity_name VARCHAR(500) NOT NULL,
    risk_level VARCHAR(20) NOT NULL,
    probability DOUBLE PRECISION NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'guard_notified',
    guard_attempts INT NOT NULL DEFAULT 0,
    last_guard_notification TIMESTAMPTZ,
    guard_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
    escalated_to_all BOOLEAN NOT NULL DEFAULT false,
    escalated_at TIMESTAMPTZ,
    dismissed_by_guard BOOLEAN NOT NULL DEFAULT false,
    dismissed_by_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
    dismissed_at TIMESTAMPTZ,
    dismissal_reason TEXT,
    resolved BOOLEAN NOT NULL DEFAULT false,
    resolved_at TIMESTAMPTZ,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
CREATE INDEX IF NOT EXISTS idx_transactions_merchant_date ON transactions(merchant_id, date);
CREATE INDEX IF NOT EXISTS idx_transactions_provider_date ON transactions(provider_id, date);
CREATE INDEX IF NOT EXISTS idx_on_call_priority ON on_call_schedule(priority) WHERE active = true;
CREATE INDEX IF NOT EXISTS idx_notifications_alert ON notifications(alert_id);
CREATE INDEX IF NOT EXISTS idx_risk_notifications_entity ON risk_notifications(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_risk_notifications_status ON risk_notifications(status, created_at);
CREATE INDEX IF NOT EXISTS idx_risk_notifications_resolved ON risk_notifications(resolved_at) WHERE resolved = true;

-- At most one record awaiting the guard per entity
CREATE UNIQUE INDEX IF NOT EXISTS uq_risk_notifications_open
    ON risk_notifications(entity_type, entity_id)
    WHERE status = 'guard_notified' AND resolved = false;
"#;
