//! Resolved evaluation declaration.
//!
//! This is the structure the declaration collaborator hands to the pipeline:
//! datasets, desired time scale, thresholds, metrics and features. Parsing of
//! any particular project file format happens elsewhere; this module only
//! defines the resolved shape and the derived views the pipeline needs.

use crate::error::{CommonError, CommonResult};
use crate::feature::Feature;
use crate::metric::MetricConstant;
use crate::threshold::{Threshold, ThresholdOperator, ThresholdOrientation, ThresholdType};
use crate::time::{lead_duration_windows, Instant, TimeScale, TimeWindow};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The kind of data a dataset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Observations,
    SingleValuedForecasts,
    EnsembleForecasts,
}

/// One side of an evaluation (left, right or baseline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDeclaration {
    pub variable: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Offset added to every valid time, in seconds
    #[serde(default)]
    pub time_shift_seconds: i64,
}

impl DatasetDeclaration {
    pub fn new(variable: impl Into<String>, data_type: DataType) -> Self {
        Self {
            variable: variable.into(),
            data_type,
            time_shift_seconds: 0,
        }
    }

    pub fn time_shift(&self) -> Duration {
        Duration::seconds(self.time_shift_seconds)
    }
}

/// A baseline synthesized from the left data rather than read from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum GeneratedBaseline {
    /// Persist the `order`-th most recent admissible left value forward
    Persistence {
        #[serde(default = "default_persistence_order")]
        order: usize,
    },
}

fn default_persistence_order() -> usize {
    1
}

/// Where baseline data comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineDeclaration {
    Dataset(DatasetDeclaration),
    Generated(GeneratedBaseline),
}

/// A group of declared thresholds sharing kind, operator and orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDeclaration {
    #[serde(rename = "type", default = "default_threshold_type")]
    pub kind: ThresholdType,
    pub values: Vec<f64>,
    #[serde(default = "default_operator")]
    pub operator: ThresholdOperator,
    #[serde(default = "default_orientation")]
    pub orientation: ThresholdOrientation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

fn default_threshold_type() -> ThresholdType {
    ThresholdType::Value
}

fn default_operator() -> ThresholdOperator {
    ThresholdOperator::Greater
}

fn default_orientation() -> ThresholdOrientation {
    ThresholdOrientation::Left
}

impl ThresholdDeclaration {
    /// Expand the declared values into individual thresholds.
    pub fn thresholds(&self) -> CommonResult<Vec<Threshold>> {
        self.values
            .iter()
            .map(|&value| -> CommonResult<Threshold> {
                let threshold = match self.kind {
                    ThresholdType::Value => {
                        Threshold::value(value, self.operator, self.orientation)
                    }
                    ThresholdType::Probability => {
                        Threshold::probability(value, self.operator, self.orientation)?
                    }
                    ThresholdType::ProbabilityClassifier => {
                        Threshold::classifier(value, self.operator)?
                    }
                };
                Ok(match &self.unit {
                    Some(unit) => threshold.with_unit(unit.clone()),
                    None => threshold,
                })
            })
            .collect()
    }
}

/// Sliding lead-duration windows, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadWindowDeclaration {
    pub minimum_hours: i64,
    pub maximum_hours: i64,
    pub width_hours: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_hours: Option<i64>,
}

/// Admissible range of values; values outside become missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl ValueConstraints {
    /// Map values outside the admissible range to `NaN`.
    pub fn apply(&self, value: f64) -> f64 {
        let too_small = self.minimum.is_some_and(|min| value < min);
        let too_large = self.maximum.is_some_and(|max| value > max);
        if too_small || too_large {
            f64::NAN
        } else {
            value
        }
    }
}

/// A fully resolved evaluation declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDeclaration {
    pub project_id: i64,
    /// Desired measurement unit
    pub unit: String,
    pub features: Vec<Feature>,
    pub left: DatasetDeclaration,
    pub right: DatasetDeclaration,
    /// Written as a single-key map, `dataset:` or `generated:`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_yaml::with::singleton_map"
    )]
    pub baseline: Option<BaselineDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_scale: Option<TimeScale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_windows: Option<LeadWindowDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_dates: Option<(Instant, Instant)>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdDeclaration>,
    pub metrics: BTreeSet<MetricConstant>,
    #[serde(default)]
    pub minimum_sample_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_constraints: Option<ValueConstraints>,
}

impl EvaluationDeclaration {
    /// Check the structural requirements of the declaration.
    pub fn validate(&self) -> Result<(), String> {
        if self.unit.trim().is_empty() {
            return Err("unit must not be empty".to_string());
        }
        if self.features.is_empty() {
            return Err("at least one feature must be declared".to_string());
        }
        if self.metrics.is_empty() {
            return Err("at least one metric must be declared".to_string());
        }
        if self.left.data_type != DataType::Observations {
            return Err("left data must be observations".to_string());
        }
        if self.right.data_type == DataType::Observations {
            return Err("right data must be forecasts".to_string());
        }
        match &self.baseline {
            Some(BaselineDeclaration::Dataset(baseline)) if baseline.data_type != self.right.data_type => {
                return Err("baseline data type must match right data type".to_string());
            }
            Some(BaselineDeclaration::Generated(GeneratedBaseline::Persistence { .. }))
                if self.right.data_type == DataType::EnsembleForecasts =>
            {
                return Err(
                    "a persistence baseline is single-valued and cannot be generated for ensemble forecasts"
                        .to_string(),
                );
            }
            _ => {}
        }
        if let Some(scale) = &self.time_scale {
            if scale.period() <= Duration::zero() {
                return Err("time scale period must be > 0".to_string());
            }
        }
        if let Some(windows) = &self.lead_windows {
            if windows.width_hours <= 0 {
                return Err("lead window width must be > 0".to_string());
            }
        }
        Ok(())
    }

    /// Value and probability thresholds, excluding classifiers.
    pub fn event_thresholds(&self) -> CommonResult<BTreeSet<Threshold>> {
        self.thresholds_where(|kind| kind != ThresholdType::ProbabilityClassifier)
    }

    pub fn classifier_thresholds(&self) -> CommonResult<BTreeSet<Threshold>> {
        self.thresholds_where(|kind| kind == ThresholdType::ProbabilityClassifier)
    }

    fn thresholds_where(&self, keep: impl Fn(ThresholdType) -> bool) -> CommonResult<BTreeSet<Threshold>> {
        let mut thresholds = BTreeSet::new();
        for declaration in self.thresholds.iter().filter(|d| keep(d.kind)) {
            thresholds.extend(declaration.thresholds()?);
        }
        Ok(thresholds)
    }

    pub fn has_probability_thresholds(&self) -> bool {
        self.thresholds
            .iter()
            .any(|d| d.kind == ThresholdType::Probability && !d.values.is_empty())
    }

    pub fn generated_baseline(&self) -> Option<GeneratedBaseline> {
        match &self.baseline {
            Some(BaselineDeclaration::Generated(generated)) => Some(*generated),
            _ => None,
        }
    }

    pub fn baseline_dataset(&self) -> Option<&DatasetDeclaration> {
        match &self.baseline {
            Some(BaselineDeclaration::Dataset(dataset)) => Some(dataset),
            _ => None,
        }
    }

    /// The time windows to evaluate, one pool per window and feature.
    pub fn time_windows(&self) -> CommonResult<Vec<TimeWindow>> {
        let mut base = TimeWindow::unbounded();
        if let Some((earliest, latest)) = self.valid_dates {
            base = base.with_valid_times(earliest, latest)?;
        }

        match &self.lead_windows {
            Some(leads) => {
                let windows = lead_duration_windows(
                    base,
                    Duration::hours(leads.minimum_hours),
                    Duration::hours(leads.maximum_hours),
                    Duration::hours(leads.width_hours),
                    leads.frequency_hours.map(Duration::hours),
                )?;
                if windows.is_empty() {
                    return Err(CommonError::invalid_time_window(
                        "lead window declaration produced no windows",
                    ));
                }
                Ok(windows)
            }
            None => Ok(vec![base]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration() -> EvaluationDeclaration {
        EvaluationDeclaration {
            project_id: 1,
            unit: "CMS".to_string(),
            features: vec![Feature::new("DRRC2")],
            left: DatasetDeclaration::new("QINE", DataType::Observations),
            right: DatasetDeclaration::new("SQIN", DataType::SingleValuedForecasts),
            baseline: None,
            time_scale: None,
            lead_windows: Some(LeadWindowDeclaration {
                minimum_hours: 0,
                maximum_hours: 24,
                width_hours: 6,
                frequency_hours: None,
            }),
            valid_dates: None,
            thresholds: vec![
                ThresholdDeclaration {
                    kind: ThresholdType::Value,
                    values: vec![5.0, 10.0],
                    operator: ThresholdOperator::Greater,
                    orientation: ThresholdOrientation::Left,
                    unit: None,
                },
                ThresholdDeclaration {
                    kind: ThresholdType::ProbabilityClassifier,
                    values: vec![0.5],
                    operator: ThresholdOperator::GreaterEqual,
                    orientation: ThresholdOrientation::Left,
                    unit: None,
                },
            ],
            metrics: [MetricConstant::MeanError].into_iter().collect(),
            minimum_sample_size: 0,
            value_constraints: None,
        }
    }

    #[test]
    fn test_declaration_validates() {
        assert!(declaration().validate().is_ok());

        let mut no_metrics = declaration();
        no_metrics.metrics.clear();
        assert!(no_metrics.validate().is_err());

        let mut bad_left = declaration();
        bad_left.left.data_type = DataType::EnsembleForecasts;
        assert!(bad_left.validate().is_err());
    }

    #[test]
    fn test_ensemble_persistence_baseline_is_rejected() {
        let mut ensemble = declaration();
        ensemble.right.data_type = DataType::EnsembleForecasts;
        ensemble.baseline = Some(BaselineDeclaration::Generated(GeneratedBaseline::Persistence {
            order: 1,
        }));
        let err = ensemble.validate().unwrap_err();
        assert!(err.contains("persistence"));

        let mut single_valued = ensemble.clone();
        single_valued.right.data_type = DataType::SingleValuedForecasts;
        assert_eq!(single_valued.validate(), Ok(()));
    }

    #[test]
    fn test_thresholds_are_split_by_kind() {
        let declaration = declaration();
        assert_eq!(declaration.event_thresholds().unwrap().len(), 2);
        assert_eq!(declaration.classifier_thresholds().unwrap().len(), 1);
        assert!(!declaration.has_probability_thresholds());
    }

    #[test]
    fn test_time_windows_from_lead_declaration() {
        let windows = declaration().time_windows().unwrap();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[1].earliest_lead_duration, Duration::hours(6));
    }

    #[test]
    fn test_value_constraints() {
        let constraints = ValueConstraints {
            minimum: Some(0.0),
            maximum: None,
        };
        assert_eq!(constraints.apply(3.0), 3.0);
        assert!(constraints.apply(-1.0).is_nan());
    }

    #[test]
    fn test_declaration_deserializes_from_json() {
        let json = r#"{
            "project_id": 7,
            "unit": "CMS",
            "features": [{"name": "DRRC2"}],
            "left": {"variable": "QINE", "type": "observations"},
            "right": {"variable": "SQIN", "type": "single_valued_forecasts"},
            "baseline": {"generated": {"method": "persistence"}},
            "time_scale": {"period_seconds": 21600, "function": "mean"},
            "thresholds": [{"type": "probability", "values": [0.9]}],
            "metrics": ["mean_square_error_skill_score", "sample_size"]
        }"#;

        let declaration: EvaluationDeclaration = serde_json::from_str(json).unwrap();
        assert_eq!(
            declaration.generated_baseline(),
            Some(GeneratedBaseline::Persistence { order: 1 })
        );
        assert!(declaration.has_probability_thresholds());
        assert_eq!(declaration.metrics.len(), 2);
        assert_eq!(declaration.time_windows().unwrap(), vec![TimeWindow::unbounded()]);
    }
}
