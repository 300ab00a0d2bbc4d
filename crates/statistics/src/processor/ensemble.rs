use super::{ProcessorCore, SingleValuedStatisticsProcessor, StatisticsProcessor};
use crate::error::{DeclarationError, Result};
use crate::executor::WorkerPools;
use crate::library::{MetricInput, MetricLibrary};
use crate::slicing::{
    classify, dichotomous_sample_size, probability_sample_size, slice_ensemble, to_discrete_probability,
    to_ensemble_mean,
};
use crate::store::{StatisticsFutures, StatisticsStore};
use crate::thresholds::MetricsAndThresholds;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use verify_common::{
    Ensemble, MetricConstant, OneOrTwoThresholds, Pair, Pool, SampleDataGroup, StatisticType,
    Threshold, TimeSeries,
};

/// Computes statistics for pools of ensemble paired time series.
///
/// Ensemble metrics run on the pairs directly. Discrete probability metrics
/// run on the probability of each event threshold. Dichotomous metrics run on
/// those probabilities classified by each classifier threshold. Single-valued
/// metrics other than the sample size run on ensemble-mean pairs.
pub struct EnsembleStatisticsProcessor {
    core: ProcessorCore,
    ensemble_mean: Option<SingleValuedStatisticsProcessor>,
}

impl EnsembleStatisticsProcessor {
    pub fn new(
        metrics_and_thresholds: MetricsAndThresholds,
        pools: WorkerPools,
        library: Arc<dyn MetricLibrary>,
    ) -> std::result::Result<Self, DeclarationError> {
        metrics_and_thresholds.validate_event_thresholds()?;
        let single_valued: BTreeSet<MetricConstant> = metrics_and_thresholds
            .metrics()
            .iter()
            .filter(|m| m.is_in_group(SampleDataGroup::SingleValued) && **m != MetricConstant::SampleSize)
            .copied()
            .collect();
        let ensemble_mean = if single_valued.is_empty() {
            None
        } else {
            Some(SingleValuedStatisticsProcessor::new(
                metrics_and_thresholds.with_metrics(single_valued),
                pools.clone(),
                Arc::clone(&library),
            )?)
        };

        Ok(Self {
            core: ProcessorCore::new(metrics_and_thresholds, pools, library),
            ensemble_mean,
        })
    }

    fn process_ensemble(
        &self,
        pairs: &Pool<Pair<f64, Ensemble>>,
        thresholds: &[Threshold],
        futures: &StatisticsFutures,
    ) {
        let slices = self.core.slice(thresholds, |threshold| {
            slice_ensemble(pairs, threshold)
                .with_metadata(|m| m.with_thresholds(OneOrTwoThresholds::of(threshold.clone())))
        });

        for statistic_type in [
            StatisticType::DoubleScore,
            StatisticType::Diagram,
            StatisticType::BoxplotPerPair,
        ] {
            let metrics = self.get_metrics(SampleDataGroup::Ensemble, statistic_type);
            if metrics.is_empty() {
                continue;
            }
            for slice in &slices {
                self.core.dispatch(
                    statistic_type,
                    &metrics,
                    MetricInput::Ensemble(slice.clone()),
                    slice.len(),
                    futures,
                );
            }
        }
    }

    /// Probability pools, one per event threshold.
    fn probabilities(&self, pairs: &Pool<Pair<f64, Ensemble>>, events: &[Threshold]) -> Vec<Pool<Pair<f64, f64>>> {
        self.core.slice(events, |threshold| {
            to_discrete_probability(pairs, threshold)
                .with_metadata(|m| m.with_thresholds(OneOrTwoThresholds::of(threshold.clone())))
        })
    }

    fn process_discrete_probability(&self, probabilities: &[Pool<Pair<f64, f64>>], futures: &StatisticsFutures) {
        for statistic_type in [StatisticType::DoubleScore, StatisticType::Diagram] {
            let metrics = self.get_metrics(SampleDataGroup::DiscreteProbability, statistic_type);
            if metrics.is_empty() {
                continue;
            }
            for pool in probabilities {
                self.core.dispatch(
                    statistic_type,
                    &metrics,
                    MetricInput::DiscreteProbability(pool.clone()),
                    probability_sample_size(pool),
                    futures,
                );
            }
        }
    }

    fn process_dichotomous(&self, probabilities: &[Pool<Pair<f64, f64>>], futures: &StatisticsFutures) {
        let classifiers: Vec<Threshold> = self
            .core
            .metrics_and_thresholds()
            .classifiers()
            .iter()
            .cloned()
            .collect();
        if classifiers.is_empty() {
            debug!("No classifier thresholds, skipping dichotomous metrics for ensemble pool");
            return;
        }

        let metrics = self.get_metrics(SampleDataGroup::Dichotomous, StatisticType::DoubleScore);
        for pool in probabilities {
            let Some(event) = pool.metadata().thresholds.as_ref().map(|t| t.first.clone()) else {
                continue;
            };
            let classified = self.core.slice(&classifiers, |classifier| {
                classify(pool, classifier).with_metadata(|m| {
                    m.with_thresholds(OneOrTwoThresholds::with_classifier(event.clone(), classifier.clone()))
                })
            });
            for slice in classified {
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
    }
}

impl StatisticsProcessor<TimeSeries<Pair<f64, Ensemble>>> for EnsembleStatisticsProcessor {
    fn apply(&self, pool: &Pool<TimeSeries<Pair<f64, Ensemble>>>) -> Result<StatisticsStore> {
        ProcessorCore::validate(pool.metadata())?;

        let thresholds = self.core.thresholds(pool.metadata(), pool.climatology())?;
        let futures = StatisticsFutures::new();
        let pairs = pool.unpack();

        if self.has_metrics(SampleDataGroup::Ensemble) {
            self.process_ensemble(&pairs, &thresholds, &futures);
        }

        let has_probability = self.has_metrics(SampleDataGroup::DiscreteProbability);
        let has_dichotomous = self.has_metrics(SampleDataGroup::Dichotomous);
        if has_probability || has_dichotomous {
            let events: Vec<Threshold> = thresholds.iter().filter(|t| !t.is_all_data()).cloned().collect();
            let probabilities = self.probabilities(&pairs, &events);
            if has_probability {
                self.process_discrete_probability(&probabilities, &futures);
            }
            if has_dichotomous {
                self.process_dichotomous(&probabilities, &futures);
            }
        }

        if let Some(ensemble_mean) = &self.ensemble_mean {
            futures.merge_store(ensemble_mean.apply(&to_ensemble_mean(pool))?);
        }

        debug!(
            feature = %pool.metadata().feature,
            series = pool.len(),
            pairs = pairs.len(),
            thresholds = thresholds.len(),
            output_types = futures.output_types().len(),
            "Dispatched ensemble statistics"
        );

        futures.build()
    }

    fn metrics_and_thresholds(&self) -> &MetricsAndThresholds {
        self.core.metrics_and_thresholds()
    }

    /// The sample size of an ensemble pool is an ensemble metric; the
    /// single-valued group covers the metrics computed on ensemble means.
    fn get_metrics(&self, group: SampleDataGroup, statistic_type: StatisticType) -> BTreeSet<MetricConstant> {
        self.core
            .metrics_and_thresholds()
            .metrics()
            .iter()
            .filter(|m| m.is_in_group(group) && m.statistic_type() == statistic_type)
            .filter(|m| group != SampleDataGroup::SingleValued || **m != MetricConstant::SampleSize)
            .copied()
            .collect()
    }
}
