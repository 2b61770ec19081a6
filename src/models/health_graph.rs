//! Health graph model - per-route node/edge status for the topology view

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{EntityType, TransactionFilter, DEFAULT_TIME_WINDOW_MINUTES};

/// Ordered by severity so the worst of several statuses is their max
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub approval_rate: f64,
    pub error_rate: f64,
    pub p95_latency: f64,
    pub sample_size: usize,
    /// Baseline approval minus current approval; positive means approvals were lost
    pub approval_loss_rate: f64,
    pub baseline_approval_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// `<type>-<entity id>`
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: EntityType,
    pub status: HealthStatus,
    pub metrics: NodeMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub status: HealthStatus,
    pub label: String,
    pub metrics: NodeMetrics,
}

/// merchant → provider → method → country with the three edges between them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRoute {
    pub route_id: String,
    pub merchant: GraphNode,
    pub provider: GraphNode,
    pub method: GraphNode,
    pub country: GraphNode,
    pub overall_status: HealthStatus,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthGraphSummary {
    pub total_routes: usize,
    pub critical_routes: usize,
    pub warning_routes: usize,
    pub ok_routes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthGraph {
    pub routes: Vec<PaymentRoute>,
    pub summary: HealthGraphSummary,
    pub timestamp: DateTime<Utc>,
}

/// Classification limits. Rates at or past a critical/warning limit set that status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub critical_error_rate: f64,
    pub warning_error_rate: f64,
    pub critical_approval_rate: f64,
    pub warning_approval_rate: f64,
    pub critical_approval_loss_rate: f64,
    pub warning_approval_loss_rate: f64,
    /// Groups smaller than this are critical
    pub min_sample_size: usize,
    /// p95 above this is a warning
    pub warning_p95_latency: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_error_rate: 0.3,
            warning_error_rate: 0.15,
            critical_approval_rate: 0.5,
            warning_approval_rate: 0.7,
            critical_approval_loss_rate: 0.2,
            warning_approval_loss_rate: 0.1,
            min_sample_size: 10,
            warning_p95_latency: 5000.0,
        }
    }
}

/// Query parameters of the health graph endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct HealthGraphQuery {
    #[validate(length(min = 1, max = 64))]
    pub merchant_id: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub provider_id: Option<String>,

    #[validate(length(min = 1, max = 64))]
    pub method_id: Option<String>,

    #[validate(length(equal = 2))]
    pub country_code: Option<String>,

    /// Current window length; the baseline is the same length right before it (default 60)
    #[validate(range(min = 1, max = 43200))]
    pub time_window_minutes: Option<u32>,

    /// Drop routes whose overall status is ok
    #[serde(default)]
    pub only_issues: bool,

    #[validate(range(min = 0.0, max = 1.0))]
    pub critical_error_rate: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub warning_error_rate: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub critical_approval_rate: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub warning_approval_rate: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub critical_approval_loss_rate: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub warning_approval_loss_rate: Option<f64>,
}

impl HealthGraphQuery {
    pub fn time_window_minutes(&self) -> u32 {
        self.time_window_minutes.unwrap_or(DEFAULT_TIME_WINDOW_MINUTES)
    }

    pub fn thresholds(&self) -> HealthThresholds {
        let d = HealthThresholds::default();
        HealthThresholds {
            critical_error_rate: self.critical_error_rate.unwrap_or(d.critical_error_rate),
            warning_error_rate: self.warning_error_rate.unwrap_or(d.warning_error_rate),
            critical_approval_rate: self.critical_approval_rate.unwrap_or(d.critical_approval_rate),
            warning_approval_rate: self.warning_approval_rate.unwrap_or(d.warning_approval_rate),
            critical_approval_loss_rate: self
                .critical_approval_loss_rate
                .unwrap_or(d.critical_approval_loss_rate),
            warning_approval_loss_rate: self
                .warning_approval_loss_rate
                .unwrap_or(d.warning_approval_loss_rate),
            ..d
        }
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
