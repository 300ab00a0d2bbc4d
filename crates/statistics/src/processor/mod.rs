//! Processors that compute every configured metric for a pool.
//!
//! A processor slices the pool by each applicable threshold on the threshold
//! worker pool, then submits one task per metric group and slice to the
//! metric worker pool. Pending results are collected in [`StatisticsFutures`]
//! and merged into one [`StatisticsStore`] per pool.

mod ensemble;
mod single_valued;

pub use ensemble::EnsembleStatisticsProcessor;
pub use single_valued::SingleValuedStatisticsProcessor;

use crate::error::{Result, StatisticsError, ThresholdError};
use crate::executor::WorkerPools;
use crate::library::{MetricInput, MetricLibrary};
use crate::store::{StatisticsFutures, StatisticsStore};
use crate::thresholds::{add_quantiles, unique_by_value, MetricsAndThresholds};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use verify_common::{
    Climatology, MetricConstant, Pool, PoolMetadata, SampleDataGroup, StatisticType, Threshold,
};

/// Message of the error raised for a pool without a time window.
pub const MISSING_TIME_WINDOW: &str = "Expected a non-null time window in the pool metadata.";

/// Computes statistics for pools of one data type.
pub trait StatisticsProcessor<T>: Send + Sync {
    /// Compute every configured metric for every applicable threshold.
    fn apply(&self, pool: &Pool<T>) -> Result<StatisticsStore>;

    fn metrics_and_thresholds(&self) -> &MetricsAndThresholds;

    /// The configured metrics of a group that produce the statistic type.
    fn get_metrics(&self, group: SampleDataGroup, statistic_type: StatisticType) -> BTreeSet<MetricConstant> {
        self.metrics_and_thresholds()
            .metrics()
            .iter()
            .filter(|m| m.is_in_group(group) && m.statistic_type() == statistic_type)
            .copied()
            .collect()
    }

    fn has_metrics(&self, group: SampleDataGroup) -> bool {
        StatisticType::ALL
            .iter()
            .any(|t| self.has_metrics_for(group, *t))
    }

    fn has_metrics_for(&self, group: SampleDataGroup, statistic_type: StatisticType) -> bool {
        !self.get_metrics(group, statistic_type).is_empty()
    }

    /// The threshold that selects every pair.
    fn all_data_threshold(&self) -> Threshold {
        Threshold::all_data()
    }
}

/// State and helpers shared by the single-valued and ensemble processors.
pub(crate) struct ProcessorCore {
    metrics_and_thresholds: MetricsAndThresholds,
    pools: WorkerPools,
    library: Arc<dyn MetricLibrary>,
}

impl ProcessorCore {
    pub(crate) fn new(
        metrics_and_thresholds: MetricsAndThresholds,
        pools: WorkerPools,
        library: Arc<dyn MetricLibrary>,
    ) -> Self {
        Self {
            metrics_and_thresholds,
            pools,
            library,
        }
    }

    pub(crate) fn metrics_and_thresholds(&self) -> &MetricsAndThresholds {
        &self.metrics_and_thresholds
    }

    pub(crate) fn validate(metadata: &PoolMetadata) -> Result<()> {
        if metadata.time_window.is_none() {
            return Err(StatisticsError::invalid_input(MISSING_TIME_WINDOW));
        }
        Ok(())
    }

    /// The thresholds for the pool's feature, with probability thresholds
    /// resolved against climatology and duplicates by value removed.
    pub(crate) fn thresholds(
        &self,
        metadata: &PoolMetadata,
        climatology: Option<&Climatology>,
    ) -> Result<Vec<Threshold>> {
        let feature = &metadata.feature;
        let declared = self
            .metrics_and_thresholds
            .thresholds_for(feature)
            .ok_or_else(|| ThresholdError::MissingThresholds {
                feature: feature.clone(),
            })?;
        let resolved = add_quantiles(declared, feature, climatology)?;
        Ok(unique_by_value(&resolved).into_iter().collect())
    }

    /// Apply `slice` to every threshold in parallel on the threshold pool,
    /// keeping threshold order.
    pub(crate) fn slice<S, F>(&self, thresholds: &[Threshold], slice: F) -> Vec<S>
    where
        S: Send,
        F: Fn(&Threshold) -> S + Send + Sync,
    {
        self.pools
            .thresholds()
            .install(|| thresholds.par_iter().map(slice).collect())
    }

    /// Submit the metrics that apply to one pool subset as one task.
    ///
    /// Below the minimum sample size only the sample size is computed. Skill
    /// metrics need a baseline of at least the minimum size, metrics that do
    /// not accept thresholds run only for all data, and metrics requiring an
    /// explicit baseline run only when there is one.
    pub(crate) fn dispatch(
        &self,
        statistic_type: StatisticType,
        metrics: &BTreeSet<MetricConstant>,
        input: MetricInput,
        sample_size: usize,
        futures: &StatisticsFutures,
    ) {
        let minimum = self.metrics_and_thresholds.minimum_sample_size();
        let all_data = input
            .metadata()
            .thresholds
            .as_ref()
            .map_or(true, |t| t.first.is_all_data() && t.second.is_none());
        let baseline_size = input.baseline_len();

        let selected: BTreeSet<MetricConstant> = if sample_size < minimum {
            metrics
                .iter()
                .filter(|m| **m == MetricConstant::SampleSize)
                .copied()
                .collect()
        } else {
            metrics
                .iter()
                .filter(|m| !(m.is_skill_metric() && baseline_size.is_some_and(|n| n < minimum)))
                .filter(|m| all_data || m.accepts_thresholds())
                .filter(|m| !m.requires_explicit_baseline() || baseline_size.is_some())
                .copied()
                .collect()
        };

        if selected.is_empty() {
            debug!(
                feature = %input.metadata().feature,
                sample_size,
                minimum,
                ?statistic_type,
                "No metrics apply to pool subset"
            );
            return;
        }

        let library = Arc::clone(&self.library);
        futures.add(
            statistic_type,
            self.pools.submit(move || {
                selected
                    .iter()
                    .map(|metric| library.evaluate(*metric, &input))
                    .collect()
            }),
        );
    }
}
