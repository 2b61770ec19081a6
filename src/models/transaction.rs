//! Transaction model

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Approved,
    Declined,
    Error,
    Timeout,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    /// Errors and timeouts both count as failures
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Timeout)
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "declined" => Ok(Self::Declined),
            "error" => Ok(Self::Error),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// The slice of a transaction the risk engine needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionFact {
    pub status: TxStatus,
    pub latency_ms: Option<i64>,
    pub merchant_id: String,
    pub provider_id: String,
    pub method_id: String,
    pub country_code: String,
    pub date: DateTime<Utc>,
}

/// Optional route dimensions narrowing a window fetch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub merchant_id: Option<String>,
    pub provider_id: Option<String>,
    pub method_id: Option<String>,
    pub country_code: Option<String>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &TransactionFact) -> bool {
        fn check(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }

        check(&self.merchant_id, &tx.merchant_id)
            && check(&self.provider_id, &tx.provider_id)
            && check(&self.method_id, &tx.method_id)
            && check(&self.country_code, &tx.country_code)
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    status: String,
    latency_ms: Option<i32>,
    merchant_id: String,
    provider_id: String,
    method_id: String,
    country_code: String,
    date: DateTime<Utc>,
}

impl TransactionFact {
    /// Transactions with `start <= date < end`, narrowed by the filter
    pub async fn find_in_range(
        pool: &PgPool,
        filter: &TransactionFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT status, latency_ms, merchant_id, provider_id, method_id, country_code, date
            FROM transactions
            WHERE date >= $1 AND date < $2
              AND ($3::TEXT IS NULL OR merchant_id = $3)
              AND ($4::TEXT IS NULL OR provider_id = $4)
              AND ($5::TEXT IS NULL OR method_id = $5)
              AND ($6::TEXT IS NULL OR country_code = $6)
            "#
        )
        .bind(start)
        .bind(end)
        .bind(&filter.merchant_id)
        .bind(&filter.provider_id)
        .bind(&filter.method_id)
        .bind(&filter.country_code)
        .fetch_all(pool)
        .await?;

        let mut facts = Vec::with_capacity(rows.len());
        for row in rows {
            let status = match row.status.parse::<TxStatus>() {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("Skipping transaction row: {}", e);
                    continue;
                }
            };
            facts.push(TransactionFact {
                status,
                latency_ms: row.latency_ms.map(i64::from),
                merchant_id: row.merchant_id,
                provider_id: row.provider_id,
                method_id: row.method_id,
                country_code: row.country_code,
                date: row.date,
            });
        }

        Ok(facts)
    }
}
