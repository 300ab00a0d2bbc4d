use super::{ProcessorCore, StatisticsProcessor};
use crate::error::{DeclarationError, Result};
use crate::executor::WorkerPools;
use crate::library::{MetricInput, MetricLibrary};
use crate::slicing::{dichotomous_sample_size, slice_single_valued, slice_time_series, to_dichotomous};
use crate::store::{StatisticsFutures, StatisticsStore};
use crate::thresholds::MetricsAndThresholds;
use std::sync::Arc;
use tracing::debug;
use verify_common::{
    OneOrTwoThresholds, Pair, Pool, SampleDataGroup, StatisticType, Threshold, TimeSeries,
};

/// Computes statistics for pools of single-valued paired time series.
pub struct SingleValuedStatisticsProcessor {
    core: ProcessorCore,
}

impl SingleValuedStatisticsProcessor {
    pub fn new(
        metrics_and_thresholds: MetricsAndThresholds,
        pools: WorkerPools,
        library: Arc<dyn MetricLibrary>,
    ) -> std::result::Result<Self, DeclarationError> {
        metrics_and_thresholds.validate_event_thresholds()?;
        Ok(Self {
            core: ProcessorCore::new(metrics_and_thresholds, pools, library),
        })
    }

    fn process_single_valued(
        &self,
        pairs: &Pool<Pair<f64, f64>>,
        thresholds: &[Threshold],
        futures: &StatisticsFutures,
    ) {
        let slices = self.core.slice(thresholds, |threshold| {
            slice_single_valued(pairs, threshold)
                .with_metadata(|m| m.with_thresholds(OneOrTwoThresholds::of(threshold.clone())))
        });

        for statistic_type in [
            StatisticType::DoubleScore,
            StatisticType::Diagram,
            StatisticType::BoxplotPerPool,
        ] {
            let metrics = self.get_metrics(SampleDataGroup::SingleValued, statistic_type);
            if metrics.is_empty() {
                continue;
            }
            for slice in &slices {
                self.core.dispatch(
                    statistic_type,
                    &metrics,
                    MetricInput::SingleValued(slice.clone()),
                    slice.len(),
                    futures,
                );
            }
        }
    }

    fn process_dichotomous(
        &self,
        pairs: &Pool<Pair<f64, f64>>,
        thresholds: &[Threshold],
        futures: &StatisticsFutures,
    ) {
        let metrics = self.get_metrics(SampleDataGroup::Dichotomous, StatisticType::DoubleScore);
        let events: Vec<Threshold> = thresholds.iter().filter(|t| !t.is_all_data()).cloned().collect();

        let slices = self.core.slice(&events, |threshold| {
            to_dichotomous(pairs, threshold)
                .with_metadata(|m| m.with_thresholds(OneOrTwoThresholds::of(threshold.clone())))
        });

        for slice in slices {
            let sample_size = dichotomous_sample_size(&slice);
            self.core.dispatch(
                StatisticType::DoubleScore,
                &metrics,
                MetricInput::Dichotomous(slice),
                sample_size,
                futures,
            );
        }
    }

    fn process_time_series(
        &self,
        pool: &Pool<TimeSeries<Pair<f64, f64>>>,
        thresholds: &[Threshold],
        futures: &StatisticsFutures,
    ) {
        let slices = self.core.slice(thresholds, |threshold| {
            slice_time_series(pool, threshold)
                .with_metadata(|m| m.with_thresholds(OneOrTwoThresholds::of(threshold.clone())))
        });

        for statistic_type in [
            StatisticType::DurationDiagram,
            StatisticType::DurationScore,
            StatisticType::Pairs,
        ] {
            let metrics = self.get_metrics(SampleDataGroup::SingleValuedTimeSeries, statistic_type);
            if metrics.is_empty() {
                continue;
            }
            for slice in &slices {
                self.core.dispatch(
                    statistic_type,
                    &metrics,
                    MetricInput::SingleValuedTimeSeries(slice.clone()),
                    slice.event_count(),
                    futures,
                );
            }
        }
    }
}

impl StatisticsProcessor<TimeSeries<Pair<f64, f64>>> for SingleValuedStatisticsProcessor {
    fn apply(&self, pool: &Pool<TimeSeries<Pair<f64, f64>>>) -> Result<StatisticsStore> {
        ProcessorCore::validate(pool.metadata())?;

        let thresholds = self.core.thresholds(pool.metadata(), pool.climatology())?;
        let futures = StatisticsFutures::new();

        let has_single_valued = self.has_metrics(SampleDataGroup::SingleValued);
        let has_dichotomous = self.has_metrics(SampleDataGroup::Dichotomous);
        if has_single_valued || has_dichotomous {
            let pairs = pool.unpack();
            if has_single_valued {
                self.process_single_valued(&pairs, &thresholds, &futures);
            }
            if has_dichotomous {
                self.process_dichotomous(&pairs, &thresholds, &futures);
            }
        }

        if self.has_metrics(SampleDataGroup::SingleValuedTimeSeries) {
            self.process_time_series(pool, &thresholds, &futures);
        }

        debug!(
            feature = %pool.metadata().feature,
            series = pool.len(),
            pairs = pool.event_count(),
            thresholds = thresholds.len(),
            output_types = futures.output_types().len(),
            "Dispatched single-valued statistics"
        );

        futures.build()
    }

    fn metrics_and_thresholds(&self) -> &MetricsAndThresholds {
        self.core.metrics_and_thresholds()
    }
}
