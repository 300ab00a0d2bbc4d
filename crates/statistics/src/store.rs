//! Pending and finished collections of statistics.

use crate::error::Result;
use crate::statistic::{
    BoxplotStatistic, DiagramStatistic, DoubleScoreStatistic, DurationDiagramStatistic,
    DurationScoreStatistic, PairsStatistic, Statistic,
};
use futures::executor::block_on;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use verify_common::StatisticType;

/// A finished collection of statistics, grouped by statistic type.
///
/// Within a type, statistics keep the order in which they were produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsStore {
    statistics: BTreeMap<StatisticType, Vec<Statistic>>,
}

impl StatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_statistics(statistics: impl IntoIterator<Item = Statistic>) -> Self {
        let mut store = Self::new();
        for statistic in statistics {
            store.push(statistic);
        }
        store
    }

    pub fn push(&mut self, statistic: Statistic) {
        self.statistics
            .entry(statistic.statistic_type())
            .or_default()
            .push(statistic);
    }

    /// Concatenate another store's statistics after this store's, per type.
    pub fn combine(mut self, other: StatisticsStore) -> StatisticsStore {
        for (statistic_type, statistics) in other.statistics {
            self.statistics
                .entry(statistic_type)
                .or_default()
                .extend(statistics);
        }
        self
    }

    pub fn get(&self, statistic_type: StatisticType) -> &[Statistic] {
        self.statistics
            .get(&statistic_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn statistic_types(&self) -> BTreeSet<StatisticType> {
        self.statistics
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.statistics.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statistic> {
        self.statistics.values().flatten()
    }

    pub fn double_scores(&self) -> impl Iterator<Item = &DoubleScoreStatistic> {
        self.get(StatisticType::DoubleScore).iter().filter_map(|s| match s {
            Statistic::DoubleScore(s) => Some(s),
            _ => None,
        })
    }

    pub fn duration_scores(&self) -> impl Iterator<Item = &DurationScoreStatistic> {
        self.get(StatisticType::DurationScore).iter().filter_map(|s| match s {
            Statistic::DurationScore(s) => Some(s),
            _ => None,
        })
    }

    pub fn diagrams(&self) -> impl Iterator<Item = &DiagramStatistic> {
        self.get(StatisticType::Diagram).iter().filter_map(|s| match s {
            Statistic::Diagram(s) => Some(s),
            _ => None,
        })
    }

    pub fn duration_diagrams(&self) -> impl Iterator<Item = &DurationDiagramStatistic> {
        self.get(StatisticType::DurationDiagram).iter().filter_map(|s| match s {
            Statistic::DurationDiagram(s) => Some(s),
            _ => None,
        })
    }

    pub fn boxplots_per_pair(&self) -> impl Iterator<Item = &BoxplotStatistic> {
        self.get(StatisticType::BoxplotPerPair).iter().filter_map(|s| match s {
            Statistic::BoxplotPerPair(s) => Some(s),
            _ => None,
        })
    }

    pub fn boxplots_per_pool(&self) -> impl Iterator<Item = &BoxplotStatistic> {
        self.get(StatisticType::BoxplotPerPool).iter().filter_map(|s| match s {
            Statistic::BoxplotPerPool(s) => Some(s),
            _ => None,
        })
    }

    pub fn pairs(&self) -> impl Iterator<Item = &PairsStatistic> {
        self.get(StatisticType::Pairs).iter().filter_map(|s| match s {
            Statistic::Pairs(s) => Some(s),
            _ => None,
        })
    }
}

/// A pending list of statistics of one type.
pub type StatisticsFuture = BoxFuture<'static, Result<Vec<Statistic>>>;

/// Accumulates pending statistics per type until [`StatisticsFutures::build`].
///
/// Futures of the same type are resolved and concatenated in the order they
/// were added. Safe to share across threads.
#[derive(Default)]
pub struct StatisticsFutures {
    pending: Mutex<BTreeMap<StatisticType, Vec<StatisticsFuture>>>,
}

impl StatisticsFutures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, statistic_type: StatisticType, future: StatisticsFuture) -> &Self {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(statistic_type)
            .or_default()
            .push(future);
        self
    }

    /// Absorb every pending future of another builder.
    pub fn merge(&self, other: StatisticsFutures) -> &Self {
        let other = other
            .pending
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for (statistic_type, futures) in other {
            pending.entry(statistic_type).or_default().extend(futures);
        }
        self
    }

    /// Absorb finished statistics as already-resolved futures.
    pub fn merge_store(&self, store: StatisticsStore) -> &Self {
        for (statistic_type, statistics) in store.statistics {
            self.add(statistic_type, futures::future::ready(Ok(statistics)).boxed());
        }
        self
    }

    /// The statistic types with at least one pending future.
    pub fn output_types(&self) -> BTreeSet<StatisticType> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, f)| !f.is_empty())
            .map(|(t, _)| *t)
            .collect()
    }

    pub fn has_future_outputs(&self) -> bool {
        !self.output_types().is_empty()
    }

    /// Wait for every pending future and collect the results.
    ///
    /// All futures run to completion even when one fails; the first failure
    /// in type and insertion order is returned.
    pub fn build(self) -> Result<StatisticsStore> {
        let pending = self
            .pending
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let mut keys = Vec::new();
        let mut futures = Vec::new();
        for (statistic_type, list) in pending {
            for future in list {
                keys.push(statistic_type);
                futures.push(future);
            }
        }

        let results = block_on(join_all(futures));

        let mut store = StatisticsStore::new();
        let mut first_error = None;
        for (statistic_type, result) in keys.into_iter().zip(results) {
            match result {
                Ok(statistics) => store
                    .statistics
                    .entry(statistic_type)
                    .or_default()
                    .extend(statistics),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        metrics::counter!("statistics_produced_total").increment(store.len() as u64);
        debug!(statistics = store.len(), types = store.statistic_types().len(), "Built statistics");

        Ok(store)
    }
}
