//! The JSON document written at the end of an evaluation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use statistics::StatisticsStore;
use uuid::Uuid;
use verify_common::{Feature, TimeWindow};

/// Statistics of one pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatistics {
    pub feature: Feature,
    pub time_window: TimeWindow,
    pub statistics: StatisticsStore,
}

/// Every pool's statistics, by feature in declaration order and then by
/// time window.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutput {
    pub evaluation_id: Uuid,
    pub project_id: i64,
    pub measurement_unit: String,
    pub completed_at: DateTime<Utc>,
    pub pools: Vec<PoolStatistics>,
}

impl EvaluationOutput {
    /// All statistics merged into one store, in pool order.
    pub fn combined(&self) -> StatisticsStore {
        self.pools
            .iter()
            .fold(StatisticsStore::new(), |acc, pool| acc.combine(pool.statistics.clone()))
    }

    pub fn statistic_count(&self) -> usize {
        self.pools.iter().map(|p| p.statistics.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
