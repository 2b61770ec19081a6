//! Scoring configuration and partial overrides

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub error_rate: f64,
    pub latency: f64,
    pub approval_rate: f64,
    pub trend: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            error_rate: 0.35,
            latency: 0.25,
            approval_rate: 0.25,
            trend: 0.15,
        }
    }
}

/// Probability cut-offs for each risk level, checked from the top
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            critical: 0.75,
            high: 0.50,
            medium: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Error rate that maps to a fully saturated signal
    pub max_error_rate: f64,
    /// p95 latency (ms) that maps to a fully saturated signal
    pub max_latency: f64,
    /// Approval rate below which the approval signal starts rising
    pub min_approval_rate: f64,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            max_error_rate: 0.5,
            max_latency: 10_000.0,
            min_approval_rate: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionConfig {
    pub weights: SignalWeights,
    pub thresholds: RiskThresholds,
    pub normalization: Normalization,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WeightsOverride {
    pub error_rate: Option<f64>,
    pub latency: Option<f64>,
    pub approval_rate: Option<f64>,
    pub trend: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThresholdsOverride {
    pub critical: Option<f64>,
    pub high: Option<f64>,
    pub medium: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NormalizationOverride {
    pub max_error_rate: Option<f64>,
    pub max_latency: Option<f64>,
    pub min_approval_rate: Option<f64>,
}

/// Caller-supplied partial config; any missing field keeps its base value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PredictionConfigOverride {
    #[serde(default)]
    pub weights: WeightsOverride,
    #[serde(default)]
    pub thresholds: ThresholdsOverride,
    #[serde(default)]
    pub normalization: NormalizationOverride,
}

impl PredictionConfig {
    /// Layer an override over this config, returning a new value
    pub fn merged(&self, o: &PredictionConfigOverride) -> PredictionConfig {
        PredictionConfig {
            weights: SignalWeights {
                error_rate: o.weights.error_rate.unwrap_or(self.weights.error_rate),
                latency: o.weights.latency.unwrap_or(self.weights.latency),
                approval_rate: o.weights.approval_rate.unwrap_or(self.weights.approval_rate),
                trend: o.weights.trend.unwrap_or(self.weights.trend),
            },
            thresholds: RiskThresholds {
                critical: o.thresholds.critical.unwrap_or(self.thresholds.critical),
                high: o.thresholds.high.unwrap_or(self.thresholds.high),
                medium: o.thresholds.medium.unwrap_or(self.thresholds.medium),
            },
            normalization: Normalization {
                max_error_rate: o
                    .normalization
                    .max_error_rate
                    .unwrap_or(self.normalization.max_error_rate),
                max_latency: o
                    .normalization
                    .max_latency
                    .unwrap_or(self.normalization.max_latency),
                min_approval_rate: o
                    .normalization
                    .min_approval_rate
                    .unwrap_or(self.normalization.min_approval_rate),
            },
        }
    }

    /// Default config with an optional override applied
    pub fn resolve(o: Option<&PredictionConfigOverride>) -> PredictionConfig {
        let base = PredictionConfig::default();
        match o {
            Some(o) => base.merged(o),
            None => base,
        }
    }
}
