//! Entity model - the dimensions a payment route is made of

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;

use super::TransactionFact;

/// Aggregation key for risk scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Merchant,
    Provider,
    Method,
    Country,
    Route,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Merchant,
        EntityType::Provider,
        EntityType::Method,
        EntityType::Country,
        EntityType::Route,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merchant => "merchant",
            Self::Provider => "provider",
            Self::Method => "method",
            Self::Country => "country",
            Self::Route => "route",
        }
    }

    /// Grouping key of a transaction for this entity type
    pub fn key_of(&self, tx: &TransactionFact) -> String {
        match self {
            Self::Merchant => tx.merchant_id.clone(),
            Self::Provider => tx.provider_id.clone(),
            Self::Method => tx.method_id.clone(),
            Self::Country => tx.country_code.clone(),
            Self::Route => RouteKey::of(tx).to_string(),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merchant" | "merchants" => Ok(Self::Merchant),
            "provider" | "providers" => Ok(Self::Provider),
            "method" | "methods" => Ok(Self::Method),
            "country" | "countries" => Ok(Self::Country),
            "route" | "routes" => Ok(Self::Route),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

/// merchant|provider|method|country tuple identifying one payment path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub merchant_id: String,
    pub provider_id: String,
    pub method_id: String,
    pub country_code: String,
}

impl RouteKey {
    pub fn of(tx: &TransactionFact) -> Self {
        Self {
            merchant_id: tx.merchant_id.clone(),
            provider_id: tx.provider_id.clone(),
            method_id: tx.method_id.clone(),
            country_code: tx.country_code.clone(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('|');
        let key = Self {
            merchant_id: parts.next()?.to_string(),
            provider_id: parts.next()?.to_string(),
            method_id: parts.next()?.to_string(),
            country_code: parts.next()?.to_string(),
        };
        if parts.next().is_some() {
            return None;
        }
        Some(key)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.merchant_id, self.provider_id, self.method_id, self.country_code
        )
    }
}

/// Merchant id attached to alerts when derivable from the entity
pub fn merchant_of(entity_type: EntityType, entity_id: &str) -> Option<String> {
    match entity_type {
        EntityType::Merchant => Some(entity_id.to_string()),
        EntityType::Route => entity_id.split('|').next().map(str::to_string),
        _ => None,
    }
}

/// Look up display names for a set of ids of one dimension.
pub async fn find_names(
    pool: &PgPool,
    entity_type: EntityType,
    ids: &[String],
) -> Result<HashMap<String, String>, sqlx::Error> {
    let sql = match entity_type {
        EntityType::Merchant => "SELECT id, name FROM merchants WHERE id = ANY($1)",
        EntityType::Provider => "SELECT id, name FROM providers WHERE id = ANY($1)",
        EntityType::Method => "SELECT id, name FROM payment_methods WHERE id = ANY($1)",
        EntityType::Country => "SELECT code AS id, name FROM countries WHERE code = ANY($1)",
        EntityType::Route => return Ok(HashMap::new()),
    };

    let rows: Vec<(String, String)> = sqlx::query_as(sql)
        .bind(ids)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().collect())
}
