//! Metric identifiers, sample data groups and statistic types.

use crate::error::CommonError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of metrics by the shape of data they consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleDataGroup {
    /// Pairs of single values
    SingleValued,
    /// Whole paired time series, for timing metrics
    SingleValuedTimeSeries,
    /// Yes/no pairs derived by applying a threshold
    Dichotomous,
    /// Single observations paired with ensemble members
    Ensemble,
    /// Observed occurrence paired with a forecast probability
    DiscreteProbability,
}

/// The shape of the statistic a metric produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticType {
    DoubleScore,
    DurationScore,
    Diagram,
    DurationDiagram,
    BoxplotPerPair,
    BoxplotPerPool,
    Pairs,
}

impl StatisticType {
    pub const ALL: [StatisticType; 7] = [
        Self::DoubleScore,
        Self::DurationScore,
        Self::Diagram,
        Self::DurationDiagram,
        Self::BoxplotPerPair,
        Self::BoxplotPerPool,
        Self::Pairs,
    ];
}

/// Every metric the evaluation pipeline knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricConstant {
    SampleSize,
    MeanError,
    MeanAbsoluteError,
    MeanSquareError,
    RootMeanSquareError,
    BiasFraction,
    PearsonCorrelationCoefficient,
    CoefficientOfDetermination,
    VolumetricEfficiency,
    MeanSquareErrorSkillScore,
    QuantileQuantileDiagram,
    BoxPlotOfErrors,
    TimeToPeakError,
    TimeToPeakErrorStatistic,
    TimeSeriesPairs,
    ProbabilityOfDetection,
    FalseAlarmRatio,
    ThreatScore,
    FrequencyBias,
    EquitableThreatScore,
    ContinuousRankedProbabilityScore,
    ContinuousRankedProbabilitySkillScore,
    RankHistogram,
    BoxPlotOfErrorsByObservedValue,
    BrierScore,
}

impl MetricConstant {
    pub const ALL: [MetricConstant; 25] = [
        Self::SampleSize,
        Self::MeanError,
        Self::MeanAbsoluteError,
        Self::MeanSquareError,
        Self::RootMeanSquareError,
        Self::BiasFraction,
        Self::PearsonCorrelationCoefficient,
        Self::CoefficientOfDetermination,
        Self::VolumetricEfficiency,
        Self::MeanSquareErrorSkillScore,
        Self::QuantileQuantileDiagram,
        Self::BoxPlotOfErrors,
        Self::TimeToPeakError,
        Self::TimeToPeakErrorStatistic,
        Self::TimeSeriesPairs,
        Self::ProbabilityOfDetection,
        Self::FalseAlarmRatio,
        Self::ThreatScore,
        Self::FrequencyBias,
        Self::EquitableThreatScore,
        Self::ContinuousRankedProbabilityScore,
        Self::ContinuousRankedProbabilitySkillScore,
        Self::RankHistogram,
        Self::BoxPlotOfErrorsByObservedValue,
        Self::BrierScore,
    ];

    /// The sample data groups this metric can consume.
    pub fn groups(&self) -> &'static [SampleDataGroup] {
        use SampleDataGroup::*;
        match self {
            Self::SampleSize => &[SingleValued, Ensemble],
            Self::MeanError
            | Self::MeanAbsoluteError
            | Self::MeanSquareError
            | Self::RootMeanSquareError
            | Self::BiasFraction
            | Self::PearsonCorrelationCoefficient
            | Self::CoefficientOfDetermination
            | Self::VolumetricEfficiency
            | Self::MeanSquareErrorSkillScore
            | Self::QuantileQuantileDiagram
            | Self::BoxPlotOfErrors => &[SingleValued],
            Self::TimeToPeakError | Self::TimeToPeakErrorStatistic | Self::TimeSeriesPairs => {
                &[SingleValuedTimeSeries]
            }
            Self::ProbabilityOfDetection
            | Self::FalseAlarmRatio
            | Self::ThreatScore
            | Self::FrequencyBias
            | Self::EquitableThreatScore => &[Dichotomous],
            Self::ContinuousRankedProbabilityScore
            | Self::ContinuousRankedProbabilitySkillScore
            | Self::RankHistogram
            | Self::BoxPlotOfErrorsByObservedValue => &[Ensemble],
            Self::BrierScore => &[DiscreteProbability],
        }
    }

    pub fn is_in_group(&self, group: SampleDataGroup) -> bool {
        self.groups().contains(&group)
    }

    pub fn statistic_type(&self) -> StatisticType {
        match self {
            Self::QuantileQuantileDiagram | Self::RankHistogram => StatisticType::Diagram,
            Self::BoxPlotOfErrors => StatisticType::BoxplotPerPool,
            Self::BoxPlotOfErrorsByObservedValue => StatisticType::BoxplotPerPair,
            Self::TimeToPeakError => StatisticType::DurationDiagram,
            Self::TimeToPeakErrorStatistic => StatisticType::DurationScore,
            Self::TimeSeriesPairs => StatisticType::Pairs,
            _ => StatisticType::DoubleScore,
        }
    }

    /// Whether the metric needs a threshold to define an event.
    pub fn requires_thresholds(&self) -> bool {
        self.is_in_group(SampleDataGroup::Dichotomous)
            || self.is_in_group(SampleDataGroup::DiscreteProbability)
    }

    /// Whether the metric can be computed on a subset defined by a threshold
    /// other than "all data".
    pub fn accepts_thresholds(&self) -> bool {
        !matches!(self, Self::QuantileQuantileDiagram | Self::TimeSeriesPairs)
    }

    pub fn is_skill_metric(&self) -> bool {
        matches!(
            self,
            Self::MeanSquareErrorSkillScore | Self::ContinuousRankedProbabilitySkillScore
        )
    }

    /// Whether the metric cannot fall back to a default reference when the
    /// pool has no baseline.
    pub fn requires_explicit_baseline(&self) -> bool {
        matches!(self, Self::ContinuousRankedProbabilitySkillScore)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SampleSize => "sample_size",
            Self::MeanError => "mean_error",
            Self::MeanAbsoluteError => "mean_absolute_error",
            Self::MeanSquareError => "mean_square_error",
            Self::RootMeanSquareError => "root_mean_square_error",
            Self::BiasFraction => "bias_fraction",
            Self::PearsonCorrelationCoefficient => "pearson_correlation_coefficient",
            Self::CoefficientOfDetermination => "coefficient_of_determination",
            Self::VolumetricEfficiency => "volumetric_efficiency",
            Self::MeanSquareErrorSkillScore => "mean_square_error_skill_score",
            Self::QuantileQuantileDiagram => "quantile_quantile_diagram",
            Self::BoxPlotOfErrors => "box_plot_of_errors",
            Self::TimeToPeakError => "time_to_peak_error",
            Self::TimeToPeakErrorStatistic => "time_to_peak_error_statistic",
            Self::TimeSeriesPairs => "time_series_pairs",
            Self::ProbabilityOfDetection => "probability_of_detection",
            Self::FalseAlarmRatio => "false_alarm_ratio",
            Self::ThreatScore => "threat_score",
            Self::FrequencyBias => "frequency_bias",
            Self::EquitableThreatScore => "equitable_threat_score",
            Self::ContinuousRankedProbabilityScore => "continuous_ranked_probability_score",
            Self::ContinuousRankedProbabilitySkillScore => {
                "continuous_ranked_probability_skill_score"
            }
            Self::RankHistogram => "rank_histogram",
            Self::BoxPlotOfErrorsByObservedValue => "box_plot_of_errors_by_observed_value",
            Self::BrierScore => "brier_score",
        }
    }
}

impl FromStr for MetricConstant {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .iter()
            .find(|m| m.as_str() == normalized)
            .copied()
            .ok_or_else(|| CommonError::unrecognized("metric", s))
    }
}

impl fmt::Display for MetricConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for metric in MetricConstant::ALL {
            assert_eq!(metric.as_str().parse::<MetricConstant>().unwrap(), metric);
        }
        assert_eq!(
            "Mean Error".parse::<MetricConstant>().unwrap(),
            MetricConstant::MeanError
        );
        assert!("not_a_metric".parse::<MetricConstant>().is_err());
    }

    #[test]
    fn test_every_metric_has_a_group() {
        for metric in MetricConstant::ALL {
            assert!(!metric.groups().is_empty(), "{metric} has no group");
        }
    }

    #[test]
    fn test_threshold_requirements() {
        assert!(MetricConstant::ProbabilityOfDetection.requires_thresholds());
        assert!(MetricConstant::BrierScore.requires_thresholds());
        assert!(!MetricConstant::MeanError.requires_thresholds());
        assert!(!MetricConstant::QuantileQuantileDiagram.accepts_thresholds());
    }

    #[test]
    fn test_sample_size_is_shared_by_groups() {
        assert!(MetricConstant::SampleSize.is_in_group(SampleDataGroup::SingleValued));
        assert!(MetricConstant::SampleSize.is_in_group(SampleDataGroup::Ensemble));
        assert_eq!(MetricConstant::SampleSize.statistic_type(), StatisticType::DoubleScore);
    }
}
