//! Ranking, counts and health scores over a set of predictions

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{
    FailureProbability, PredictionSummary, RiskLevel, RouteKey, SignalKind, TopRiskyEntity,
};

pub const TOP_N: usize = 3;

pub const UNKNOWN_NAME: &str = "Unknown";

fn by_probability_desc(a: &FailureProbability, b: &FailureProbability) -> Ordering {
    b.probability
        .partial_cmp(&a.probability)
        .unwrap_or(Ordering::Equal)
}

pub fn sort_by_risk(predictions: &mut [FailureProbability]) {
    predictions.sort_by(by_probability_desc);
}

/// 0-100 score, 100 when nothing was scored
pub fn health_score(predictions: &[FailureProbability]) -> i64 {
    if predictions.is_empty() {
        return 100;
    }
    let mean = predictions.iter().map(|p| p.probability).sum::<f64>() / predictions.len() as f64;
    ((1.0 - mean) * 100.0).round() as i64
}

pub fn build(
    mut predictions: Vec<FailureProbability>,
    include_low_risk: bool,
    now: DateTime<Utc>,
) -> PredictionSummary {
    if !include_low_risk {
        predictions.retain(|p| p.risk_level != RiskLevel::Low);
    }
    sort_by_risk(&mut predictions);

    let count = |level: RiskLevel| predictions.iter().filter(|p| p.risk_level == level).count();
    let critical = count(RiskLevel::Critical);
    let high = count(RiskLevel::High);

    PredictionSummary {
        total_entities_analyzed: predictions.len(),
        critical_count: critical,
        high_risk_count: critical + high,
        medium_risk_count: count(RiskLevel::Medium),
        low_risk_count: count(RiskLevel::Low),
        global_health_score: health_score(&predictions),
        predictions,
        timestamp: now,
    }
}

/// `Merchant → Provider → Method (CC)`
pub fn route_name(
    key: &RouteKey,
    merchants: &HashMap<String, String>,
    providers: &HashMap<String, String>,
    methods: &HashMap<String, String>,
) -> String {
    let name = |names: &HashMap<String, String>, id: &str| {
        names.get(id).cloned().unwrap_or_else(|| UNKNOWN_NAME.to_string())
    };
    format!(
        "{} → {} → {} ({})",
        name(merchants, &key.merchant_id),
        name(providers, &key.provider_id),
        name(methods, &key.method_id),
        key.country_code
    )
}

pub fn to_top_entity(rank: usize, p: &FailureProbability) -> TopRiskyEntity {
    let value = |kind: SignalKind| p.signal(kind).map_or(0.0, |s| s.value);

    TopRiskyEntity {
        rank,
        entity_type: p.entity_type,
        entity_id: p.entity_id.clone(),
        entity_name: p.entity_name.clone(),
        probability: p.probability,
        risk_level: p.risk_level,
        error_rate: value(SignalKind::ErrorRate),
        approval_rate: value(SignalKind::ApprovalRate),
        latency: value(SignalKind::Latency),
        trend: p.trend.direction,
        sample_size: p.sample_size,
        timestamp: p.timestamp,
    }
}

/// Highest-probability entries, ranked from 1
pub fn top_n(predictions: &[FailureProbability], n: usize) -> Vec<TopRiskyEntity> {
    let mut ranked: Vec<&FailureProbability> = predictions.iter().collect();
    ranked.sort_by(|a, b| by_probability_desc(a, b));
    ranked
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, p)| to_top_entity(i + 1, p))
        .collect()
}

/// Weighted across dimensions: merchants 0.4, providers 0.4, methods 0.2
pub fn dashboard_health(merchants: i64, providers: i64, methods: i64) -> i64 {
    (0.4 * merchants as f64 + 0.4 * providers as f64 + 0.2 * methods as f64).round() as i64
}
