//! Prediction service - windows, grouping, scoring and auto-alerts

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::config::{PredictionConfig, PredictionConfigOverride};
use super::grouping::{self, EntityGroup};
use super::health_graph::{self, RouteNames};
use super::summary::{self, TOP_N, UNKNOWN_NAME};
use super::{metrics, scorer, window};
use crate::clock::Clock;
use crate::error::AppResult;
use crate::models::{
    merchant_of, AlertSeverity, Dashboard, EntityType, FailureProbability, HealthGraph,
    HealthGraphQuery, NewAlert, PredictionQuery, PredictionSummary, RouteKey, Top3Summary, TopRiskyEntity, TransactionFact,
};
use crate::store::Stores;

pub struct PredictionService {
    stores: Stores,
    clock: Arc<dyn Clock>,
}

impl PredictionService {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>) -> Self {
        Self { stores, clock }
    }

    /// Score every entity of the requested type and build the summary.
    /// High and critical predictions raise an alert each.
    pub async fn get_predictions(
        &self,
        query: &PredictionQuery,
        config: Option<&PredictionConfigOverride>,
    ) -> AppResult<PredictionSummary> {
        let config = PredictionConfig::resolve(config);
        let now = self.clock.now();
        let entity_type = query.entity_type();

        let windows = window::Windows::resolve(
            now,
            query.time_window_minutes(),
            query.baseline_window_hours(),
        );
        let data = window::fetch(self.stores.transactions.as_ref(), &query.filter(), &windows).await?;

        let groups = grouping::group(entity_type, &data.recent, &data.baseline);
        tracing::debug!(
            "Analyzing {} {} entities (min sample size {})",
            groups.len(),
            entity_type,
            query.min_sample_size()
        );

        let names = self
            .resolve_names(entity_type, groups.keys().cloned().collect())
            .await;
        let predictions = score_groups(
            entity_type,
            &groups,
            &names,
            query.min_sample_size(),
            &config,
            now,
        );

        self.raise_alerts(&predictions).await;

        Ok(summary::build(predictions, query.include_low_risk, now))
    }

    pub async fn top3_by_entity(
        &self,
        entity_type: EntityType,
        time_window_minutes: Option<u32>,
    ) -> AppResult<Vec<TopRiskyEntity>> {
        let summary = self.get_predictions(&top_query(entity_type, time_window_minutes), None).await?;
        Ok(summary::top_n(&summary.predictions, TOP_N))
    }

    /// Top 3 across merchants, providers and methods combined
    pub async fn overall_top3(&self, time_window_minutes: Option<u32>) -> AppResult<Vec<TopRiskyEntity>> {
        Ok(self.top3_summary(time_window_minutes).await?.overall_top_3)
    }

    pub async fn top3_summary(&self, time_window_minutes: Option<u32>) -> AppResult<Top3Summary> {
        let merchants = self
            .get_predictions(&top_query(EntityType::Merchant, time_window_minutes), None)
            .await?;
        let providers = self
            .get_predictions(&top_query(EntityType::Provider, time_window_minutes), None)
            .await?;
        let methods = self
            .get_predictions(&top_query(EntityType::Method, time_window_minutes), None)
            .await?;

        let combined: Vec<FailureProbability> = merchants
            .predictions
            .iter()
            .chain(&providers.predictions)
            .chain(&methods.predictions)
            .cloned()
            .collect();

        Ok(Top3Summary {
            top_merchants: summary::top_n(&merchants.predictions, TOP_N),
            top_providers: summary::top_n(&providers.predictions, TOP_N),
            top_methods: summary::top_n(&methods.predictions, TOP_N),
            overall_top_3: summary::top_n(&combined, TOP_N),
            timestamp: self.clock.now(),
        })
    }

    pub async fn dashboard(&self) -> AppResult<Dashboard> {
        let merchants = self
            .get_predictions(&PredictionQuery::for_entity(EntityType::Merchant), None)
            .await?;
        let providers = self
            .get_predictions(&PredictionQuery::for_entity(EntityType::Provider), None)
            .await?;
        let methods = self
            .get_predictions(&PredictionQuery::for_entity(EntityType::Method), None)
            .await?;

        let global_health = summary::dashboard_health(
            merchants.global_health_score,
            providers.global_health_score,
            methods.global_health_score,
        );

        Ok(Dashboard {
            merchants,
            providers,
            methods,
            global_health,
        })
    }

    /// Route topology with node and edge status. Read only: raises no alerts.
    pub async fn health_graph(&self, query: &HealthGraphQuery) -> AppResult<HealthGraph> {
        let now = self.clock.now();
        let windows = window::Windows::trailing(now, query.time_window_minutes());
        let data = window::fetch(self.stores.transactions.as_ref(), &query.filter(), &windows).await?;

        let ids = |field: fn(&TransactionFact) -> &String| -> Vec<String> {
            data.recent
                .iter()
                .map(|tx| field(tx).clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        let names = RouteNames {
            merchants: self.lookup(EntityType::Merchant, &ids(|tx| &tx.merchant_id)).await,
            providers: self.lookup(EntityType::Provider, &ids(|tx| &tx.provider_id)).await,
            methods: self.lookup(EntityType::Method, &ids(|tx| &tx.method_id)).await,
            countries: self.lookup(EntityType::Country, &ids(|tx| &tx.country_code)).await,
        };

        let graph = health_graph::build(
            &data.recent,
            &data.baseline,
            &names,
            &query.thresholds(),
            query.only_issues,
            now,
        );
        tracing::debug!(
            "Health graph: {} routes, {} critical, {} warning",
            graph.summary.total_routes,
            graph.summary.critical_routes,
            graph.summary.warning_routes
        );
        Ok(graph)
    }

    /// Display names per entity id. Lookup failures fall back to "Unknown".
    async fn resolve_names(&self, entity_type: EntityType, ids: Vec<String>) -> HashMap<String, String> {
        if entity_type != EntityType::Route {
            return self.lookup(entity_type, &ids).await;
        }

        let keys: Vec<(String, RouteKey)> = ids
            .into_iter()
            .filter_map(|id| RouteKey::parse(&id).map(|key| (id, key)))
            .collect();

        let merchants = self
            .lookup(EntityType::Merchant, &distinct(&keys, |k| &k.merchant_id))
            .await;
        let providers = self
            .lookup(EntityType::Provider, &distinct(&keys, |k| &k.provider_id))
            .await;
        let methods = self
            .lookup(EntityType::Method, &distinct(&keys, |k| &k.method_id))
            .await;

        keys.iter()
            .map(|(id, key)| {
                (
                    id.clone(),
                    summary::route_name(key, &merchants, &providers, &methods),
                )
            })
            .collect()
    }

    async fn lookup(&self, entity_type: EntityType, ids: &[String]) -> HashMap<String, String> {
        match self.stores.directory.names(entity_type, ids).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("Failed to load {} names: {}", entity_type, e);
                HashMap::new()
            }
        }
    }

    async fn raise_alerts(&self, predictions: &[FailureProbability]) {
        let mut raised = 0;

        for p in predictions.iter().filter(|p| p.risk_level.is_high_or_critical()) {
            let alert = NewAlert {
                severity: AlertSeverity::from_risk(p.risk_level),
                title: format!(
                    "{} failure risk detected",
                    p.risk_level.as_str().to_uppercase()
                ),
                explanation: format!(
                    "{}: {}\nFailure probability: {:.1}%\nCurrent error rate: {:.1}%\nTrend: {}\n\nRecommended actions:\n{}",
                    p.entity_type,
                    p.entity_name,
                    p.probability * 100.0,
                    p.baseline_comparison.current_error_rate * 100.0,
                    p.trend.direction.as_str(),
                    p.recommended_actions.join("\n")
                ),
                merchant_id: merchant_of(p.entity_type, &p.entity_id),
            };

            match self.stores.alerts.create_alert(alert).await {
                Ok(_) => raised += 1,
                Err(e) => tracing::error!(
                    "Failed to create alert for {} {}: {}",
                    p.entity_type,
                    p.entity_id,
                    e
                ),
            }
        }

        if raised > 0 {
            tracing::warn!("Generated {} auto-alerts for high-risk predictions", raised);
        }
    }
}

fn top_query(entity_type: EntityType, time_window_minutes: Option<u32>) -> PredictionQuery {
    PredictionQuery {
        time_window_minutes,
        ..PredictionQuery::for_entity(entity_type)
    }
}

fn distinct(keys: &[(String, RouteKey)], field: fn(&RouteKey) -> &String) -> Vec<String> {
    keys.iter()
        .map(|(_, key)| field(key).clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn score_groups(
    entity_type: EntityType,
    groups: &HashMap<String, EntityGroup<'_>>,
    names: &HashMap<String, String>,
    min_sample_size: usize,
    config: &PredictionConfig,
    now: DateTime<Utc>,
) -> Vec<FailureProbability> {
    let mut predictions = Vec::with_capacity(groups.len());
    let mut skipped = 0;

    for (id, group) in groups {
        if group.recent.len() < min_sample_size {
            tracing::debug!(
                "Skipping {} {}: insufficient samples {} < {}",
                entity_type,
                id,
                group.recent.len(),
                min_sample_size
            );
            skipped += 1;
            continue;
        }

        let m = metrics::calculate(&group.recent, &group.baseline);
        let name = names.get(id).map(String::as_str).unwrap_or(UNKNOWN_NAME);
        predictions.push(scorer::score(entity_type, id, name, &m, config, now));
    }

    if skipped > 0 {
        tracing::warn!(
            "Skipped {} {} entities below the minimum sample size",
            skipped,
            entity_type
        );
    }

    predictions
}
