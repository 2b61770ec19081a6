//! Metrics -> signals -> failure probability

use chrono::{DateTime, Utc};

use super::config::PredictionConfig;
use super::metrics::EntityMetrics;
use crate::models::{
    BaselineComparison, EntityType, FailureProbability, RiskLevel, Signal, SignalKind, Trend,
    TrendDirection,
};

/// Slope of the logistic remap around the 0.5 midpoint
const LOGISTIC_SLOPE: f64 = 10.0;

/// Error-rate change beyond which a trend counts as moving
const TREND_DEAD_BAND: f64 = 0.05;

/// Samples needed for full confidence
const FULL_CONFIDENCE_SAMPLES: f64 = 100.0;

pub fn logistic(raw: f64) -> f64 {
    1.0 / (1.0 + (-LOGISTIC_SLOPE * (raw - 0.5)).exp())
}

pub fn classify(probability: f64, config: &PredictionConfig) -> RiskLevel {
    let t = &config.thresholds;
    if probability >= t.critical {
        RiskLevel::Critical
    } else if probability >= t.high {
        RiskLevel::High
    } else if probability >= t.medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn ratio(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        value / max
    } else if value > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn signals(metrics: &EntityMetrics, config: &PredictionConfig) -> Vec<Signal> {
    let w = &config.weights;
    let n = &config.normalization;

    let error_norm = ratio(metrics.error_rate, n.max_error_rate).min(1.0);
    let latency_norm = ratio(metrics.p95_latency, n.max_latency).min(1.0);

    let approval_gap = (n.min_approval_rate - metrics.approval_rate).max(0.0);
    let approval_norm = ratio(approval_gap, 1.0 - n.min_approval_rate).clamp(0.0, 1.0);

    let error_trend = metrics.recent_error_rate - metrics.baseline_error_rate;
    let trend_norm = ratio(error_trend, n.max_error_rate).clamp(0.0, 1.0);

    vec![
        Signal::new(SignalKind::ErrorRate, metrics.error_rate, error_norm, w.error_rate),
        Signal::new(SignalKind::Latency, metrics.p95_latency, latency_norm, w.latency),
        Signal::new(SignalKind::ApprovalRate, metrics.approval_rate, approval_norm, w.approval_rate),
        Signal::new(SignalKind::Trend, error_trend, trend_norm, w.trend),
    ]
}

fn trend_direction(error_trend: f64) -> TrendDirection {
    if error_trend > TREND_DEAD_BAND {
        TrendDirection::Degrading
    } else if error_trend < -TREND_DEAD_BAND {
        TrendDirection::Improving
    } else {
        TrendDirection::Stable
    }
}

/// Remediation steps keyed on the dominant signal. The first signal with
/// the largest contribution wins ties.
pub fn recommendations(signals: &[Signal], level: RiskLevel, entity_type: EntityType) -> Vec<String> {
    let mut actions: Vec<&str> = Vec::new();

    match level {
        RiskLevel::High | RiskLevel::Critical => {
            let dominant = signals.iter().fold(None::<&Signal>, |best, s| match best {
                Some(b) if b.contribution >= s.contribution => Some(b),
                _ => Some(s),
            });

            match dominant.map(|s| s.name) {
                Some(SignalKind::ErrorRate) => {
                    actions.push("Review error logs to identify the failure pattern");
                    actions.push("Verify connectivity with the payment provider");
                    if entity_type == EntityType::Provider {
                        actions.push("Consider activating a backup provider");
                    }
                }
                Some(SignalKind::Latency) => {
                    actions.push("Investigate performance degradation");
                    actions.push("Review timeout configuration");
                    actions.push("Verify system load");
                }
                Some(SignalKind::ApprovalRate) => {
                    actions.push("Analyze transaction decline reasons");
                    actions.push("Review business rule configuration");
                    if entity_type == EntityType::Method {
                        actions.push("Evaluate an alternative payment method for this segment");
                    }
                }
                Some(SignalKind::Trend) => {
                    actions.push("Monitor closely - degradation trend detected");
                    actions.push("Prepare a contingency plan");
                }
                None => {}
            }

            if level == RiskLevel::Critical {
                actions.insert(0, "IMMEDIATE ACTION REQUIRED");
                if entity_type == EntityType::Provider {
                    actions.push("Consider automatic failover");
                }
            }
        }
        RiskLevel::Medium => {
            actions.push("Keep under observation");
            actions.push("Increase monitoring frequency");
        }
        RiskLevel::Low => {}
    }

    actions.into_iter().map(String::from).collect()
}

pub fn score(
    entity_type: EntityType,
    entity_id: &str,
    entity_name: &str,
    metrics: &EntityMetrics,
    config: &PredictionConfig,
    now: DateTime<Utc>,
) -> FailureProbability {
    let signals = signals(metrics, config);
    let raw: f64 = signals.iter().map(|s| s.contribution).sum();
    let probability = logistic(raw);
    let risk_level = classify(probability, config);

    let error_trend = metrics.recent_error_rate - metrics.baseline_error_rate;
    let deviation_percentage = if metrics.baseline_error_rate > 0.0 {
        error_trend / metrics.baseline_error_rate * 100.0
    } else {
        0.0
    };

    let recommended_actions = recommendations(&signals, risk_level, entity_type);

    FailureProbability {
        entity_type,
        entity_id: entity_id.to_string(),
        entity_name: entity_name.to_string(),
        probability,
        risk_level,
        signals,
        confidence: (metrics.sample_size as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0),
        sample_size: metrics.sample_size,
        baseline_comparison: BaselineComparison {
            current_error_rate: metrics.recent_error_rate,
            baseline_error_rate: metrics.baseline_error_rate,
            deviation_percentage,
        },
        trend: Trend {
            direction: trend_direction(error_trend),
            rate_of_change: error_trend,
        },
        recommended_actions,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(error_rate: f64, approval_rate: f64, p95: f64, baseline: f64, n: usize) -> EntityMetrics {
        EntityMetrics {
            error_rate,
            approval_rate,
            p95_latency: p95,
            sample_size: n,
            recent_error_rate: error_rate,
            baseline_error_rate: baseline,
        }
    }

    fn run(m: &EntityMetrics) -> FailureProbability {
        score(EntityType::Provider, "p1", "Acme", m, &PredictionConfig::default(), Utc::now())
    }

    #[test]
    fn test_probability_in_unit_range() {
        let cases = [
            metrics(0.0, 1.0, 0.0, 0.0, 0),
            metrics(1.0, 0.0, 1e9, 0.0, 500),
            metrics(0.3, 0.5, 2_000.0, 0.9, 20),
            metrics(0.5, 0.2, 10_000.0, 0.0, 100),
        ];
        for m in &cases {
            let p = run(m).probability;
            assert!((0.0..=1.0).contains(&p), "probability {} out of range", p);
        }
    }

    #[test]
    fn test_monotonic_in_error_rate() {
        let mut last = 0.0;
        for step in 0..=10 {
            let e = step as f64 * 0.05;
            let p = run(&metrics(e, 0.6, 1_500.0, 0.05, 80)).probability;
            assert!(p >= last, "probability dropped at error_rate {}", e);
            last = p;
        }
    }

    #[test]
    fn test_healthy_entity_is_low() {
        let p = run(&metrics(0.01, 0.95, 300.0, 0.01, 200));
        assert_eq!(p.risk_level, RiskLevel::Low);
        assert!(p.recommended_actions.is_empty());
        assert_eq!(p.trend.direction, TrendDirection::Stable);
        assert_eq!(p.confidence, 1.0);
    }

    #[test]
    fn test_failing_provider_is_critical() {
        let p = run(&metrics(0.6, 0.1, 12_000.0, 0.05, 40));
        assert_eq!(p.risk_level, RiskLevel::Critical);
        assert_eq!(p.recommended_actions[0], "IMMEDIATE ACTION REQUIRED");
        assert_eq!(
            p.recommended_actions.last().map(String::as_str),
            Some("Consider automatic failover")
        );
        assert!(p
            .recommended_actions
            .iter()
            .any(|a| a == "Consider activating a backup provider"));
        assert_eq!(p.trend.direction, TrendDirection::Degrading);
        assert!((p.confidence - 0.4).abs() < 1e-9);
        assert!((p.baseline_comparison.deviation_percentage - 1_100.0).abs() < 1e-6);
    }

    #[test]
    fn test_signal_normalization() {
        let p = run(&metrics(0.25, 0.15, 5_000.0, 0.35, 10));
        let error = p.signal(SignalKind::ErrorRate).unwrap();
        assert!((error.normalized_value - 0.5).abs() < 1e-9);
        assert!((error.contribution - 0.175).abs() < 1e-9);

        let latency = p.signal(SignalKind::Latency).unwrap();
        assert!((latency.normalized_value - 0.5).abs() < 1e-9);

        let approval = p.signal(SignalKind::ApprovalRate).unwrap();
        assert!((approval.normalized_value - 0.15 / 0.7).abs() < 1e-9);

        let trend = p.signal(SignalKind::Trend).unwrap();
        assert_eq!(trend.normalized_value, 0.0);
        assert_eq!(p.trend.direction, TrendDirection::Improving);
        assert!((p.trend.rate_of_change + 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_logistic_midpoint() {
        assert!((logistic(0.5) - 0.5).abs() < 1e-12);
        assert!(logistic(0.0) < 0.01);
        assert!(logistic(1.0) > 0.99);
    }

    #[test]
    fn test_medium_recommendations() {
        let signals = vec![Signal::new(SignalKind::Latency, 1.0, 1.0, 0.25)];
        let actions = recommendations(&signals, RiskLevel::Medium, EntityType::Merchant);
        assert_eq!(actions, vec!["Keep under observation", "Increase monitoring frequency"]);
    }

    #[test]
    fn test_method_approval_recommendation() {
        let signals = vec![
            Signal::new(SignalKind::ErrorRate, 0.0, 0.0, 0.35),
            Signal::new(SignalKind::ApprovalRate, 0.0, 1.0, 0.25),
        ];
        let actions = recommendations(&signals, RiskLevel::High, EntityType::Method);
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[2], "Evaluate an alternative payment method for this segment");
    }
}
