//! Prediction model - scoring outputs and query parameters

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

use super::{EntityType, TransactionFilter};
use crate::prediction::config::PredictionConfigOverride;

pub const DEFAULT_TIME_WINDOW_MINUTES: u32 = 60;
pub const DEFAULT_BASELINE_WINDOW_HOURS: u32 = 168;
pub const DEFAULT_MIN_SAMPLE_SIZE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn is_high_or_critical(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ErrorRate,
    Latency,
    ApprovalRate,
    Trend,
}

/// One weighted input to the failure probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: SignalKind,
    pub value: f64,
    /// 0-1
    pub normalized_value: f64,
    pub weight: f64,
    /// normalized_value * weight
    pub contribution: f64,
}

impl Signal {
    pub fn new(name: SignalKind, value: f64, normalized_value: f64, weight: f64) -> Self {
        Self {
            name,
            value,
            normalized_value,
            weight,
            contribution: normalized_value * weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub current_error_rate: f64,
    pub baseline_error_rate: f64,
    pub deviation_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Degrading => "degrading",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Error rate change, labelled per hour
    pub rate_of_change: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureProbability {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub probability: f64,
    pub risk_level: RiskLevel,
    pub signals: Vec<Signal>,
    pub confidence: f64,
    pub sample_size: usize,
    pub baseline_comparison: BaselineComparison,
    pub trend: Trend,
    pub recommended_actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl FailureProbability {
    pub fn signal(&self, kind: SignalKind) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub total_entities_analyzed: usize,
    pub critical_count: usize,
    /// critical + high
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub low_risk_count: usize,
    pub predictions: Vec<FailureProbability>,
    /// 0-100, 100 = healthy
    pub global_health_score: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopRiskyEntity {
    pub rank: usize,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub entity_name: String,
    pub probability: f64,
    pub risk_level: RiskLevel,
    pub error_rate: f64,
    pub approval_rate: f64,
    pub latency: f64,
    pub trend: TrendDirection,
    pub sample_size: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Top3Summary {
    pub top_merchants: Vec<TopRiskyEntity>,
    pub top_providers: Vec<TopRiskyEntity>,
    pub top_methods: Vec<TopRiskyEntity>,
    pub overall_top_3: Vec<TopRiskyEntity>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub merchants: PredictionSummary,
    pub providers: PredictionSummary,
    pub methods: PredictionSummary,
    pub global_health: i64,
}

/// Query parameters for a prediction run
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PredictionQuery {
    #[validate(length(min = 1, max = 64))]
    pub merchant_id: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub provider_id: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub method_id: Option<String>,

    #[validate(length(equal = 2))]
    pub country_code: Option<String>,

    /// Recent window length (default 60)
    #[validate(range(min = 1, max = 43200))]
    pub time_window_minutes: Option<u32>,

    /// Baseline window length (default 168)
    #[validate(range(min = 1, max = 8760))]
    pub baseline_window_hours: Option<u32>,

    /// Groups smaller than this are excluded (default 1)
    #[validate(range(min = 1, max = 1000000))]
    pub min_sample_size: Option<u32>,

    #[serde(default)]
    pub include_low_risk: bool,

    /// Unset means full route
    pub entity_type: Option<EntityType>,
}

impl PredictionQuery {
    pub fn for_entity(entity_type: EntityType) -> Self {
        Self {
            entity_type: Some(entity_type),
            ..Default::default()
        }
    }

    pub fn time_window_minutes(&self) -> u32 {
        self.time_window_minutes.unwrap_or(DEFAULT_TIME_WINDOW_MINUTES)
    }

    pub fn baseline_window_hours(&self) -> u32 {
        self.baseline_window_hours.unwrap_or(DEFAULT_BASELINE_WINDOW_HOURS)
    }

    pub fn min_sample_size(&self) -> usize {
        self.min_sample_size.unwrap_or(DEFAULT_MIN_SAMPLE_SIZE) as usize
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type.unwrap_or(EntityType::Route)
    }

    pub fn filter(&self) -> TransactionFilter {
        TransactionFilter {
            merchant_id: self.merchant_id.clone(),
            provider_id: self.provider_id.clone(),
            method_id: self.method_id.clone(),
            country_code: self.country_code.clone(),
        }
    }
}

/// Body of the configurable prediction call
#[derive(Debug, Default, Deserialize)]
pub struct PredictionRequest {
    #[serde(default)]
    pub query: PredictionQuery,
    pub config: Option<PredictionConfigOverride>,
}

/// Query parameters of the top-3 endpoints
#[derive(Debug, Default, Deserialize, Validate)]
pub struct TopQuery {
    #[validate(range(min = 1, max = 43200))]
    pub time_window_minutes: Option<u32>,
}
