//! Route health graph
//!
//! Every route seen in the current window becomes a merchant → provider →
//! method → country chain. Nodes carry the metrics of their whole dimension,
//! edges the metrics of the adjacent pair, and each is classified against
//! [`HealthThresholds`]. Approval loss compares against a baseline of the same
//! length immediately before the current window.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::grouping::{self, EntityGroup};
use super::metrics;
use super::summary::UNKNOWN_NAME;
use crate::models::{
    EntityType, GraphEdge, GraphNode, HealthGraph, HealthGraphSummary, HealthStatus,
    HealthThresholds, NodeMetrics, PaymentRoute, RouteKey, TransactionFact,
};

/// Approval loss above this is called out in edge labels
const NOTABLE_APPROVAL_LOSS: f64 = 0.05;

/// Display names per dimension, keyed by entity id
#[derive(Debug, Default)]
pub struct RouteNames {
    pub merchants: HashMap<String, String>,
    pub providers: HashMap<String, String>,
    pub methods: HashMap<String, String>,
    pub countries: HashMap<String, String>,
}

impl RouteNames {
    fn get(&self, entity_type: EntityType, id: &str) -> String {
        let names = match entity_type {
            EntityType::Merchant => &self.merchants,
            EntityType::Provider => &self.providers,
            EntityType::Method => &self.methods,
            _ => &self.countries,
        };
        names.get(id).cloned().unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }
}

pub fn node_metrics(group: &EntityGroup<'_>) -> NodeMetrics {
    let m = metrics::calculate(&group.recent, &group.baseline);

    // no baseline traffic means nothing to lose against
    let (baseline_approval_rate, approval_loss_rate) = if group.baseline.is_empty() {
        (0.0, 0.0)
    } else {
        let base = metrics::approval_rate(&group.baseline);
        (base, base - m.approval_rate)
    };

    NodeMetrics {
        approval_rate: m.approval_rate,
        error_rate: m.error_rate,
        p95_latency: m.p95_latency,
        sample_size: m.sample_size,
        approval_loss_rate,
        baseline_approval_rate,
    }
}

/// Critical checks win over warning checks; approval loss is checked first at each level
pub fn classify(m: &NodeMetrics, t: &HealthThresholds) -> HealthStatus {
    if m.approval_loss_rate >= t.critical_approval_loss_rate
        || m.error_rate >= t.critical_error_rate
        || m.approval_rate <= t.critical_approval_rate
        || m.sample_size < t.min_sample_size
    {
        return HealthStatus::Critical;
    }

    if m.approval_loss_rate >= t.warning_approval_loss_rate
        || m.error_rate >= t.warning_error_rate
        || m.approval_rate <= t.warning_approval_rate
        || m.p95_latency > t.warning_p95_latency
    {
        return HealthStatus::Warning;
    }

    HealthStatus::Ok
}

pub fn edge_label(status: HealthStatus, m: &NodeMetrics) -> String {
    if m.approval_loss_rate > NOTABLE_APPROVAL_LOSS {
        return format!("Approval loss: -{:.1}%", m.approval_loss_rate * 100.0);
    }

    match status {
        HealthStatus::Critical => format!("Consistent failures (error: {:.1}%)", m.error_rate * 100.0),
        HealthStatus::Warning => format!("Degraded signal ({} txs)", m.sample_size),
        HealthStatus::Ok => format!("OK (approval: {:.1}%)", m.approval_rate * 100.0),
    }
}

/// Metrics of every group produced by one key
struct Dimension {
    metrics: HashMap<String, NodeMetrics>,
}

impl Dimension {
    fn by<F>(recent: &[TransactionFact], baseline: &[TransactionFact], key: F) -> Self
    where
        F: Fn(&TransactionFact) -> String,
    {
        let metrics = grouping::group_by(recent, baseline, key)
            .iter()
            .map(|(id, group)| (id.clone(), node_metrics(group)))
            .collect();
        Self { metrics }
    }

    fn of(recent: &[TransactionFact], baseline: &[TransactionFact], entity_type: EntityType) -> Self {
        Self::by(recent, baseline, |tx| entity_type.key_of(tx))
    }

    fn get(&self, key: &str, fallback: NodeMetrics) -> NodeMetrics {
        self.metrics.get(key).copied().unwrap_or(fallback)
    }
}

fn pair(a: &str, b: &str) -> String {
    format!("{}|{}", a, b)
}

pub fn build(
    recent: &[TransactionFact],
    baseline: &[TransactionFact],
    names: &RouteNames,
    thresholds: &HealthThresholds,
    only_issues: bool,
    now: DateTime<Utc>,
) -> HealthGraph {
    let merchants = Dimension::of(recent, baseline, EntityType::Merchant);
    let providers = Dimension::of(recent, baseline, EntityType::Provider);
    let methods = Dimension::of(recent, baseline, EntityType::Method);
    let countries = Dimension::of(recent, baseline, EntityType::Country);

    let merchant_provider = Dimension::by(recent, baseline, |tx| pair(&tx.merchant_id, &tx.provider_id));
    let provider_method = Dimension::by(recent, baseline, |tx| pair(&tx.provider_id, &tx.method_id));
    let method_country = Dimension::by(recent, baseline, |tx| pair(&tx.method_id, &tx.country_code));

    let node = |entity_type: EntityType, id: &str, m: NodeMetrics| GraphNode {
        id: format!("{}-{}", entity_type, id),
        label: names.get(entity_type, id),
        node_type: entity_type,
        status: classify(&m, thresholds),
        metrics: m,
    };

    let edge = |from: &GraphNode, to: &GraphNode, m: NodeMetrics| {
        let status = classify(&m, thresholds);
        GraphEdge {
            from: from.id.clone(),
            to: to.id.clone(),
            status,
            label: edge_label(status, &m),
            metrics: m,
        }
    };

    let mut routes: Vec<PaymentRoute> = grouping::group(EntityType::Route, recent, baseline)
        .iter()
        .filter_map(|(id, group)| RouteKey::parse(id).map(|key| (id, key, node_metrics(group))))
        .map(|(id, key, route)| {
            let merchant = node(EntityType::Merchant, &key.merchant_id, merchants.get(&key.merchant_id, route));
            let provider = node(EntityType::Provider, &key.provider_id, providers.get(&key.provider_id, route));
            let method = node(EntityType::Method, &key.method_id, methods.get(&key.method_id, route));
            let country = node(EntityType::Country, &key.country_code, countries.get(&key.country_code, route));

            let edges = vec![
                edge(&merchant, &provider, merchant_provider.get(&pair(&key.merchant_id, &key.provider_id), route)),
                edge(&provider, &method, provider_method.get(&pair(&key.provider_id, &key.method_id), route)),
                edge(&method, &country, method_country.get(&pair(&key.method_id, &key.country_code), route)),
            ];

            PaymentRoute {
                route_id: id.clone(),
                merchant,
                provider,
                method,
                country,
                overall_status: classify(&route, thresholds),
                edges,
            }
        })
        .collect();

    if only_issues {
        routes.retain(|r| r.overall_status != HealthStatus::Ok);
    }
    routes.sort_by(|a, b| {
        (Reverse(a.overall_status), &a.route_id).cmp(&(Reverse(b.overall_status), &b.route_id))
    });

    let count = |status: HealthStatus| routes.iter().filter(|r| r.overall_status == status).count();
    let summary = HealthGraphSummary {
        total_routes: routes.len(),
        critical_routes: count(HealthStatus::Critical),
        warning_routes: count(HealthStatus::Warning),
        ok_routes: count(HealthStatus::Ok),
    };

    HealthGraph { routes, summary, timestamp: now }
}
