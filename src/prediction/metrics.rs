//! Reduce a transaction group to scoring metrics

use crate::models::{TransactionFact, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityMetrics {
    pub error_rate: f64,
    pub approval_rate: f64,
    pub p95_latency: f64,
    pub sample_size: usize,
    pub recent_error_rate: f64,
    pub baseline_error_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Rates {
    error_rate: f64,
    approval_rate: f64,
}

fn rates(txs: &[&TransactionFact]) -> Rates {
    let total = txs.len();
    if total == 0 {
        return Rates::default();
    }

    let failures = txs.iter().filter(|tx| tx.status.is_failure()).count();
    let approved = txs
        .iter()
        .filter(|tx| tx.status == TxStatus::Approved)
        .count();

    Rates {
        error_rate: failures as f64 / total as f64,
        approval_rate: approved as f64 / total as f64,
    }
}

pub fn approval_rate(txs: &[&TransactionFact]) -> f64 {
    rates(txs).approval_rate
}

/// 95th percentile at index `ceil(0.95 * n) - 1`; 0 for an empty set
pub fn p95(latencies: &mut [i64]) -> f64 {
    if latencies.is_empty() {
        return 0.0;
    }
    latencies.sort_unstable();

    // ceil(0.95 * n) in integers; the float product overshoots for n = 20
    let rank = (95 * latencies.len() + 99) / 100;
    let index = rank.saturating_sub(1).min(latencies.len() - 1);
    latencies[index] as f64
}

pub fn calculate(recent: &[&TransactionFact], baseline: &[&TransactionFact]) -> EntityMetrics {
    let current = rates(recent);
    let base = rates(baseline);

    // missing latency counts as 0
    let mut latencies: Vec<i64> = recent.iter().map(|tx| tx.latency_ms.unwrap_or(0)).collect();

    EntityMetrics {
        error_rate: current.error_rate,
        approval_rate: current.approval_rate,
        p95_latency: p95(&mut latencies),
        sample_size: recent.len(),
        recent_error_rate: current.error_rate,
        baseline_error_rate: base.error_rate,
    }
}
