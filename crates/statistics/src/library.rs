//! The metric library: formulas that turn a pool into statistics.
//!
//! Processors decide which metrics run on which pool subset; the library only
//! computes. [`BasicMetricLibrary`] implements every [`MetricConstant`].

use crate::error::{Result, StatisticsError};
use crate::statistic::{
    BoxplotBox, BoxplotStatistic, DiagramComponent, DiagramStatistic, DoubleScoreStatistic,
    DurationDiagramStatistic, DurationPoint, DurationScoreStatistic, PairsRow, PairsStatistic,
    Statistic,
};
use crate::thresholds::quantile_of_sorted;
use chrono::Duration;
use verify_common::{
    Ensemble, Event, MetricConstant, Pair, Pool, PoolMetadata, SampleDataGroup, TimeSeries,
};

/// Pool data in the shape a sample data group consumes.
#[derive(Debug, Clone)]
pub enum MetricInput {
    SingleValued(Pool<Pair<f64, f64>>),
    SingleValuedTimeSeries(Pool<TimeSeries<Pair<f64, f64>>>),
    Dichotomous(Pool<Pair<bool, bool>>),
    Ensemble(Pool<Pair<f64, Ensemble>>),
    /// Observed probability (0 or 1) paired with forecast probability
    DiscreteProbability(Pool<Pair<f64, f64>>),
}

impl MetricInput {
    pub fn group(&self) -> SampleDataGroup {
        match self {
            Self::SingleValued(_) => SampleDataGroup::SingleValued,
            Self::SingleValuedTimeSeries(_) => SampleDataGroup::SingleValuedTimeSeries,
            Self::Dichotomous(_) => SampleDataGroup::Dichotomous,
            Self::Ensemble(_) => SampleDataGroup::Ensemble,
            Self::DiscreteProbability(_) => SampleDataGroup::DiscreteProbability,
        }
    }

    pub fn metadata(&self) -> &PoolMetadata {
        match self {
            Self::SingleValued(p) | Self::DiscreteProbability(p) => p.metadata(),
            Self::SingleValuedTimeSeries(p) => p.metadata(),
            Self::Dichotomous(p) => p.metadata(),
            Self::Ensemble(p) => p.metadata(),
        }
    }

    /// Size of the baseline data, when the pool has a baseline.
    pub fn baseline_len(&self) -> Option<usize> {
        fn len<T: Clone>(pool: &Pool<T>) -> Option<usize> {
            pool.has_baseline()
                .then(|| pool.baseline().map_or(0, <[T]>::len))
        }
        match self {
            Self::SingleValued(p) | Self::DiscreteProbability(p) => len(p),
            Self::SingleValuedTimeSeries(p) => len(p),
            Self::Dichotomous(p) => len(p),
            Self::Ensemble(p) => len(p),
        }
    }
}

/// Computes one metric for one pool.
pub trait MetricLibrary: Send + Sync {
    fn evaluate(&self, metric: MetricConstant, input: &MetricInput) -> Result<Statistic>;
}

/// Probabilities at which box plot quantiles are reported.
pub const BOXPLOT_PROBABILITIES: [f64; 5] = [0.0, 0.1, 0.5, 0.9, 1.0];

/// Straightforward implementations of every metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicMetricLibrary;

impl MetricLibrary for BasicMetricLibrary {
    fn evaluate(&self, metric: MetricConstant, input: &MetricInput) -> Result<Statistic> {
        if !metric.is_in_group(input.group()) {
            return Err(StatisticsError::metric_calculation(
                metric,
                format!("the metric does not consume {:?} data", input.group()),
            ));
        }

        match input {
            MetricInput::SingleValued(pool) => single_valued(metric, pool),
            MetricInput::SingleValuedTimeSeries(pool) => time_series(metric, pool),
            MetricInput::Dichotomous(pool) => dichotomous(metric, pool),
            MetricInput::Ensemble(pool) => ensemble(metric, pool),
            MetricInput::DiscreteProbability(pool) => discrete_probability(metric, pool),
        }
    }
}

fn unsupported(metric: MetricConstant) -> StatisticsError {
    StatisticsError::metric_calculation(metric, "no formula for this sample data group")
}

fn score(metric: MetricConstant, value: f64, sample_size: usize, metadata: &PoolMetadata) -> Statistic {
    Statistic::DoubleScore(DoubleScoreStatistic {
        metric,
        value,
        sample_size,
        metadata: metadata.clone(),
    })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    values.sort_by(f64::total_cmp);
    values
}

fn mean_square_error(pairs: &[Pair<f64, f64>]) -> f64 {
    mean(pairs.iter().map(|p| (p.right - p.left).powi(2)))
}

fn pearson(pairs: &[Pair<f64, f64>]) -> f64 {
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let left_mean = mean(pairs.iter().map(|p| p.left));
    let right_mean = mean(pairs.iter().map(|p| p.right));
    let (mut covariance, mut left_var, mut right_var) = (0.0, 0.0, 0.0);
    for p in pairs {
        let (dl, dr) = (p.left - left_mean, p.right - right_mean);
        covariance += dl * dr;
        left_var += dl * dl;
        right_var += dr * dr;
    }
    covariance / (left_var * right_var).sqrt()
}

fn single_valued(metric: MetricConstant, pool: &Pool<Pair<f64, f64>>) -> Result<Statistic> {
    let pairs = pool.get();
    let n = pairs.len();
    let metadata = pool.metadata();
    let left_sum: f64 = pairs.iter().map(|p| p.left).sum();

    let value = match metric {
        MetricConstant::SampleSize => n as f64,
        MetricConstant::MeanError => mean(pairs.iter().map(|p| p.right - p.left)),
        MetricConstant::MeanAbsoluteError => mean(pairs.iter().map(|p| (p.right - p.left).abs())),
        MetricConstant::MeanSquareError => mean_square_error(pairs),
        MetricConstant::RootMeanSquareError => mean_square_error(pairs).sqrt(),
        MetricConstant::BiasFraction if n > 0 => {
            pairs.iter().map(|p| p.right - p.left).sum::<f64>() / left_sum
        }
        MetricConstant::VolumetricEfficiency if n > 0 => {
            (left_sum - pairs.iter().map(|p| (p.right - p.left).abs()).sum::<f64>()) / left_sum
        }
        MetricConstant::BiasFraction | MetricConstant::VolumetricEfficiency => f64::NAN,
        MetricConstant::PearsonCorrelationCoefficient => pearson(pairs),
        MetricConstant::CoefficientOfDetermination => pearson(pairs).powi(2),
        MetricConstant::MeanSquareErrorSkillScore => {
            // Against the baseline when there is one, otherwise against the
            // mean of the observations.
            let reference = match pool.baseline() {
                Some(baseline) => mean_square_error(baseline),
                _ => {
                    let left_mean = mean(pairs.iter().map(|p| p.left));
                    mean(pairs.iter().map(|p| (p.left - left_mean).powi(2)))
                }
            };
            1.0 - mean_square_error(pairs) / reference
        }
        MetricConstant::QuantileQuantileDiagram => {
            return Ok(Statistic::Diagram(DiagramStatistic {
                metric,
                components: vec![
                    DiagramComponent::new("observed_quantiles", sorted(pairs.iter().map(|p| p.left))),
                    DiagramComponent::new("predicted_quantiles", sorted(pairs.iter().map(|p| p.right))),
                ],
                metadata: metadata.clone(),
            }));
        }
        MetricConstant::BoxPlotOfErrors => {
            let errors = sorted(pairs.iter().map(|p| p.right - p.left));
            return Ok(Statistic::BoxplotPerPool(BoxplotStatistic {
                metric,
                probabilities: BOXPLOT_PROBABILITIES.to_vec(),
                boxes: vec![BoxplotBox {
                    linked_value: None,
                    quantiles: BOXPLOT_PROBABILITIES
                        .iter()
                        .map(|&p| quantile_of_sorted(&errors, p))
                        .collect(),
                }],
                metadata: metadata.clone(),
            }));
        }
        other => return Err(unsupported(other)),
    };

    Ok(score(metric, value, n, metadata))
}

/// Timing error of the peak: valid time of the largest prediction minus valid
/// time of the largest observation. Ties resolve to the earliest time.
fn peak_timing_error(series: &TimeSeries<Pair<f64, f64>>) -> Option<DurationPoint> {
    let events = series.events();
    let peak = |side: fn(&Pair<f64, f64>) -> f64| {
        events
            .iter()
            .filter(|e| side(&e.value).is_finite())
            .fold(None, |best: Option<&Event<Pair<f64, f64>>>, e| match best {
                Some(b) if side(&b.value) >= side(&e.value) => Some(b),
                _ => Some(e),
            })
    };
    let observed = peak(|p| p.left)?;
    let predicted = peak(|p| p.right)?;
    let time = series
        .metadata()
        .lead_reference_time()
        .unwrap_or(events[0].valid_time);
    Some(DurationPoint {
        time,
        duration: predicted.valid_time - observed.valid_time,
    })
}

fn time_series(metric: MetricConstant, pool: &Pool<TimeSeries<Pair<f64, f64>>>) -> Result<Statistic> {
    let metadata = pool.metadata().clone();
    let series = pool.get();

    Ok(match metric {
        MetricConstant::TimeToPeakError => Statistic::DurationDiagram(DurationDiagramStatistic {
            metric,
            points: series.iter().filter_map(peak_timing_error).collect(),
            metadata,
        }),
        MetricConstant::TimeToPeakErrorStatistic => {
            let errors: Vec<i64> = series
                .iter()
                .filter_map(peak_timing_error)
                .map(|p| p.duration.num_seconds())
                .collect();
            let value = if errors.is_empty() {
                None
            } else {
                Duration::try_seconds(errors.iter().sum::<i64>() / errors.len() as i64)
            };
            Statistic::DurationScore(DurationScoreStatistic {
                metric,
                value,
                metadata,
            })
        }
        MetricConstant::TimeSeriesPairs => Statistic::Pairs(PairsStatistic {
            metric,
            pairs: series
                .iter()
                .flat_map(|s| s.events().iter())
                .map(|e| PairsRow {
                    valid_time: e.valid_time,
                    left: e.value.left,
                    right: e.value.right,
                })
                .collect(),
            metadata,
        }),
        other => return Err(unsupported(other)),
    })
}

/// 2x2 contingency table counts.
struct Contingency {
    hits: f64,
    false_alarms: f64,
    misses: f64,
    correct_negatives: f64,
}

impl Contingency {
    fn of(pairs: &[Pair<bool, bool>]) -> Self {
        let count = |observed: bool, predicted: bool| {
            pairs
                .iter()
                .filter(|p| p.left == observed && p.right == predicted)
                .count() as f64
        };
        Self {
            hits: count(true, true),
            false_alarms: count(false, true),
            misses: count(true, false),
            correct_negatives: count(false, false),
        }
    }

    fn total(&self) -> f64 {
        self.hits + self.false_alarms + self.misses + self.correct_negatives
    }
}

fn dichotomous(metric: MetricConstant, pool: &Pool<Pair<bool, bool>>) -> Result<Statistic> {
    let table = Contingency::of(pool.get());
    let Contingency {
        hits: a,
        false_alarms: b,
        misses: c,
        ..
    } = table;

    let value = match metric {
        MetricConstant::ProbabilityOfDetection => a / (a + c),
        MetricConstant::FalseAlarmRatio => b / (a + b),
        MetricConstant::ThreatScore => a / (a + b + c),
        MetricConstant::FrequencyBias => (a + b) / (a + c),
        MetricConstant::EquitableThreatScore => {
            let random_hits = (a + b) * (a + c) / table.total();
            (a - random_hits) / (a + b + c - random_hits)
        }
        other => return Err(unsupported(other)),
    };

    Ok(score(metric, value, pool.len(), pool.metadata()))
}

/// CRPS of one ensemble against one observation, using the empirical
/// distribution of the members.
fn crps(observation: f64, ensemble: &Ensemble) -> f64 {
    let members = ensemble.members();
    let m = members.len() as f64;
    if members.is_empty() {
        return f64::NAN;
    }
    let spread: f64 = members
        .iter()
        .flat_map(|x| members.iter().map(move |y| (x - y).abs()))
        .sum();
    members.iter().map(|x| (x - observation).abs()).sum::<f64>() / m - spread / (2.0 * m * m)
}

fn mean_crps(pairs: &[Pair<f64, Ensemble>]) -> f64 {
    mean(pairs.iter().map(|p| crps(p.left, &p.right)))
}

fn ensemble(metric: MetricConstant, pool: &Pool<Pair<f64, Ensemble>>) -> Result<Statistic> {
    let pairs = pool.get();
    let metadata = pool.metadata();

    let value = match metric {
        MetricConstant::SampleSize => pairs.len() as f64,
        MetricConstant::ContinuousRankedProbabilityScore => mean_crps(pairs),
        MetricConstant::ContinuousRankedProbabilitySkillScore => {
            let baseline = pool.baseline().ok_or_else(|| {
                StatisticsError::metric_calculation(metric, "a baseline is required")
            })?;
            1.0 - mean_crps(pairs) / mean_crps(baseline)
        }
        MetricConstant::RankHistogram => {
            let bins = pairs.iter().map(|p| p.right.len()).max().unwrap_or(0) + 1;
            let mut counts = vec![0usize; bins];
            for pair in pairs {
                let rank = pair.right.members().iter().filter(|m| **m < pair.left).count();
                counts[rank] += 1;
            }
            let total = pairs.len() as f64;
            return Ok(Statistic::Diagram(DiagramStatistic {
                metric,
                components: vec![
                    DiagramComponent::new("rank", (1..=bins).map(|r| r as f64).collect()),
                    DiagramComponent::new(
                        "relative_frequency",
                        counts.iter().map(|&c| c as f64 / total).collect(),
                    ),
                ],
                metadata: metadata.clone(),
            }));
        }
        MetricConstant::BoxPlotOfErrorsByObservedValue => {
            return Ok(Statistic::BoxplotPerPair(BoxplotStatistic {
                metric,
                probabilities: BOXPLOT_PROBABILITIES.to_vec(),
                boxes: pairs
                    .iter()
                    .map(|pair| {
                        let errors = sorted(pair.right.members().iter().map(|m| m - pair.left));
                        BoxplotBox {
                            linked_value: Some(pair.left),
                            quantiles: BOXPLOT_PROBABILITIES
                                .iter()
                                .map(|&p| quantile_of_sorted(&errors, p))
                                .collect(),
                        }
                    })
                    .collect(),
                metadata: metadata.clone(),
            }));
        }
        other => return Err(unsupported(other)),
    };

    Ok(score(metric, value, pairs.len(), metadata))
}

fn discrete_probability(metric: MetricConstant, pool: &Pool<Pair<f64, f64>>) -> Result<Statistic> {
    let value = match metric {
        MetricConstant::BrierScore => mean(pool.get().iter().map(|p| (p.right - p.left).powi(2))),
        other => return Err(unsupported(other)),
    };
    Ok(score(metric, value, pool.len(), pool.metadata()))
}
