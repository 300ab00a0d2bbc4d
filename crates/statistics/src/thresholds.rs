//! Grouping of metrics with the thresholds they are computed for, and
//! resolution of probability thresholds against climatology.

use crate::error::{DeclarationError, ThresholdError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use verify_common::{
    Bounds, Climatology, EvaluationDeclaration, Feature, MetricConstant, Threshold,
    ThresholdOperator, ThresholdOrientation, ThresholdType,
};

/// A set of metrics and the thresholds each feature's pools are sliced by.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsAndThresholds {
    metrics: BTreeSet<MetricConstant>,
    thresholds: BTreeMap<Feature, BTreeSet<Threshold>>,
    classifiers: BTreeSet<Threshold>,
    minimum_sample_size: usize,
}

impl MetricsAndThresholds {
    pub fn new(
        metrics: BTreeSet<MetricConstant>,
        thresholds: BTreeMap<Feature, BTreeSet<Threshold>>,
        minimum_sample_size: usize,
    ) -> Self {
        Self {
            metrics,
            thresholds,
            classifiers: BTreeSet::new(),
            minimum_sample_size,
        }
    }

    pub fn with_classifiers(mut self, classifiers: BTreeSet<Threshold>) -> Self {
        self.classifiers = classifiers;
        self
    }

    /// The same thresholds for a different set of metrics.
    pub fn with_metrics(&self, metrics: BTreeSet<MetricConstant>) -> Self {
        Self {
            metrics,
            ..self.clone()
        }
    }

    pub fn metrics(&self) -> &BTreeSet<MetricConstant> {
        &self.metrics
    }

    pub fn thresholds(&self) -> &BTreeMap<Feature, BTreeSet<Threshold>> {
        &self.thresholds
    }

    pub fn thresholds_for(&self, feature: &Feature) -> Option<&BTreeSet<Threshold>> {
        self.thresholds.get(feature)
    }

    pub fn classifiers(&self) -> &BTreeSet<Threshold> {
        &self.classifiers
    }

    pub fn minimum_sample_size(&self) -> usize {
        self.minimum_sample_size
    }

    /// Fails when a dichotomous or discrete probability metric has no value
    /// or probability threshold to define its events for any feature.
    pub fn validate_event_thresholds(&self) -> Result<(), DeclarationError> {
        let has_events = self.thresholds.values().flatten().any(|t| {
            !t.is_all_data() && matches!(t.kind(), ThresholdType::Value | ThresholdType::Probability)
        });
        if has_events {
            return Ok(());
        }
        match self.metrics.iter().find(|m| m.requires_thresholds()) {
            Some(metric) => Err(DeclarationError::MissingThresholds { metric: *metric }),
            None => Ok(()),
        }
    }
}

/// Group the declared metrics by whether they need an event threshold.
///
/// Metrics that do not need one are computed for all data and every declared
/// value or probability threshold. Metrics that need one are computed for the
/// declared thresholds only, with any classifiers attached. Declared
/// thresholds apply to every declared feature; `extra` adds thresholds for
/// individual features.
pub fn get_metrics_and_thresholds_for_processing(
    declaration: &EvaluationDeclaration,
    extra: &BTreeMap<Feature, BTreeSet<Threshold>>,
) -> Result<Vec<MetricsAndThresholds>, DeclarationError> {
    let declared = declaration.event_thresholds()?;
    let classifiers = declaration.classifier_thresholds()?;

    let mut per_feature: BTreeMap<Feature, BTreeSet<Threshold>> = declaration
        .features
        .iter()
        .map(|f| (f.clone(), declared.clone()))
        .collect();
    for (feature, thresholds) in extra {
        per_feature
            .entry(feature.clone())
            .or_default()
            .extend(thresholds.iter().filter(|t| t.kind() != ThresholdType::ProbabilityClassifier).cloned());
    }

    let (requiring, continuous): (BTreeSet<MetricConstant>, BTreeSet<MetricConstant>) = declaration
        .metrics
        .iter()
        .copied()
        .partition(|m| m.requires_thresholds());

    if per_feature.values().all(BTreeSet::is_empty) {
        if let Some(metric) = requiring.first() {
            return Err(DeclarationError::MissingThresholds { metric: *metric });
        }
    }

    let mut groups = Vec::new();

    if !continuous.is_empty() {
        let thresholds = per_feature
            .iter()
            .map(|(feature, thresholds)| {
                let mut with_all_data = thresholds.clone();
                with_all_data.insert(Threshold::all_data());
                (feature.clone(), with_all_data)
            })
            .collect();
        groups.push(MetricsAndThresholds::new(
            continuous,
            thresholds,
            declaration.minimum_sample_size,
        ));
    }

    if !requiring.is_empty() {
        let thresholds = per_feature
            .into_iter()
            .map(|(feature, thresholds)| {
                let without_all_data = thresholds.into_iter().filter(|t| !t.is_all_data()).collect();
                (feature, without_all_data)
            })
            .collect();
        groups.push(
            MetricsAndThresholds::new(requiring, thresholds, declaration.minimum_sample_size)
                .with_classifiers(classifiers),
        );
    }

    debug!(groups = groups.len(), "Grouped metrics by threshold requirement");

    Ok(groups)
}

/// Estimate the `probability` quantile of a sample.
///
/// Non-finite values are ignored. The position `p(n + 1)` in the sorted sample
/// is interpolated linearly and clamped to the sample extremes. An empty
/// sample has no quantile (`NaN`).
pub fn quantile(sample: &[f64], probability: f64) -> f64 {
    let mut sorted: Vec<f64> = sample.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    quantile_of_sorted(&sorted, probability)
}

/// As [`quantile`], for a sample already sorted and free of non-finite values.
pub fn quantile_of_sorted(sorted: &[f64], probability: f64) -> f64 {
    let n = sorted.len();
    if n == 0 || probability.is_nan() {
        return f64::NAN;
    }

    let position = probability * (n as f64 + 1.0);
    if position <= 1.0 {
        return sorted[0];
    }
    if position >= n as f64 {
        return sorted[n - 1];
    }

    let lower = position.floor();
    let index = lower as usize - 1;
    let fraction = position - lower;
    sorted[index] + fraction * (sorted[index + 1] - sorted[index])
}

/// Resolve every probability threshold that still needs a value to a quantile
/// of the feature's climatology. Other thresholds pass through unchanged.
pub fn add_quantiles(
    thresholds: &BTreeSet<Threshold>,
    feature: &Feature,
    climatology: Option<&Climatology>,
) -> Result<BTreeSet<Threshold>, ThresholdError> {
    if !thresholds.iter().any(Threshold::needs_quantile) {
        return Ok(thresholds.clone());
    }

    let sample = climatology
        .and_then(|c| c.get(feature))
        .ok_or_else(|| ThresholdError::MissingClimatology {
            feature: feature.clone(),
        })?;
    let mut sorted: Vec<f64> = sample.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    Ok(thresholds
        .iter()
        .map(|threshold| match threshold.probabilities() {
            Some(p) if threshold.needs_quantile() => threshold.clone().with_values(Bounds {
                lower: quantile_of_sorted(&sorted, p.lower),
                upper: p.upper.map(|upper| quantile_of_sorted(&sorted, upper)),
            }),
            _ => threshold.clone(),
        })
        .collect())
}

/// Keep one threshold per distinct value, operator and orientation.
///
/// Quantiles resolved from different probabilities can share a value; the
/// greatest such threshold survives. Thresholds without values are kept.
pub fn unique_by_value(thresholds: &BTreeSet<Threshold>) -> BTreeSet<Threshold> {
    type Key = (u64, Option<u64>, ThresholdOperator, ThresholdOrientation);

    let mut by_value: BTreeMap<Key, &Threshold> = BTreeMap::new();
    let mut unique = BTreeSet::new();

    for threshold in thresholds {
        let Some(values) = threshold.values() else {
            unique.insert(threshold.clone());
            continue;
        };
        let key = (
            values.lower.to_bits(),
            values.upper.map(f64::to_bits),
            threshold.operator(),
            threshold.orientation(),
        );
        by_value
            .entry(key)
            .and_modify(|kept| {
                if threshold > *kept {
                    *kept = threshold;
                }
            })
            .or_insert(threshold);
    }

    unique.extend(by_value.into_values().cloned());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use verify_common::{DatasetDeclaration, DataType, ThresholdDeclaration};

    fn declaration(metrics: &[MetricConstant], thresholds: Vec<ThresholdDeclaration>) -> EvaluationDeclaration {
        EvaluationDeclaration {
            project_id: 1,
            unit: "CMS".to_string(),
            features: vec![Feature::new("DRRC2")],
            left: DatasetDeclaration::new("QINE", DataType::Observations),
            right: DatasetDeclaration::new("SQIN", DataType::SingleValuedForecasts),
            baseline: None,
            time_scale: None,
            lead_windows: None,
            valid_dates: None,
            thresholds,
            metrics: metrics.iter().copied().collect(),
            minimum_sample_size: 0,
            value_constraints: None,
        }
    }

    fn values(kind: ThresholdType, values: &[f64]) -> ThresholdDeclaration {
        ThresholdDeclaration {
            kind,
            values: values.to_vec(),
            operator: ThresholdOperator::Greater,
            orientation: ThresholdOrientation::Left,
            unit: None,
        }
    }

    #[test]
    fn test_quantile_interpolates_and_clamps() {
        let sample = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sample, 0.5), 2.5);
        assert_eq!(quantile(&sample, 0.1), 1.0);
        assert_eq!(quantile(&sample, 0.95), 4.0);
        assert_eq!(quantile(&[4.0, f64::NAN, 1.0, 3.0, 2.0], 0.5), 2.5);
        assert!(quantile(&[], 0.5).is_nan());
        assert!(quantile(&[f64::NAN], 0.5).is_nan());
    }

    #[test]
    fn test_threshold_requiring_metric_without_thresholds_is_rejected() {
        let error = get_metrics_and_thresholds_for_processing(
            &declaration(&[MetricConstant::MeanError, MetricConstant::ProbabilityOfDetection], vec![]),
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(
            error,
            DeclarationError::MissingThresholds {
                metric: MetricConstant::ProbabilityOfDetection
            }
        );
        assert!(error.to_string().contains("PROBABILITY_OF_DETECTION"));
    }

    #[test]
    fn test_metrics_partitioned_by_threshold_requirement() {
        let groups = get_metrics_and_thresholds_for_processing(
            &declaration(
                &[MetricConstant::MeanError, MetricConstant::ThreatScore],
                vec![values(ThresholdType::Value, &[5.0]), values(ThresholdType::ProbabilityClassifier, &[0.5])],
            ),
            &BTreeMap::new(),
        )
        .unwrap();

        assert_eq!(groups.len(), 2);
        let feature = Feature::new("DRRC2");

        let continuous = &groups[0];
        assert_eq!(continuous.metrics(), &BTreeSet::from([MetricConstant::MeanError]));
        let thresholds = continuous.thresholds_for(&feature).unwrap();
        assert_eq!(thresholds.len(), 2);
        assert!(thresholds.iter().any(Threshold::is_all_data));
        assert!(continuous.classifiers().is_empty());

        let requiring = &groups[1];
        assert_eq!(requiring.metrics(), &BTreeSet::from([MetricConstant::ThreatScore]));
        let thresholds = requiring.thresholds_for(&feature).unwrap();
        assert_eq!(thresholds.len(), 1);
        assert!(!thresholds.iter().any(Threshold::is_all_data));
        assert_eq!(requiring.classifiers().len(), 1);
    }

    #[test]
    fn test_extra_thresholds_are_merged_per_feature() {
        let other = Feature::new("DOLC2");
        let extra = BTreeMap::from([(
            other.clone(),
            BTreeSet::from([Threshold::value(9.0, ThresholdOperator::Greater, ThresholdOrientation::Left)]),
        )]);

        let groups = get_metrics_and_thresholds_for_processing(
            &declaration(&[MetricConstant::ProbabilityOfDetection], vec![]),
            &extra,
        )
        .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].thresholds_for(&other).map(BTreeSet::len), Some(1));
        assert_eq!(groups[0].thresholds_for(&Feature::new("DRRC2")).map(BTreeSet::len), Some(0));
    }

    #[test]
    fn test_probability_thresholds_resolve_against_climatology() {
        let feature = Feature::new("DRRC2");
        let mut climatology = Climatology::new();
        climatology.add(feature.clone(), [1.0, 2.0, 3.0, 4.0]);

        let probability =
            Threshold::probability(0.5, ThresholdOperator::Greater, ThresholdOrientation::Left).unwrap();
        let value = Threshold::value(7.0, ThresholdOperator::Greater, ThresholdOrientation::Left);
        let resolved = add_quantiles(
            &BTreeSet::from([probability, value.clone()]),
            &feature,
            Some(&climatology),
        )
        .unwrap();

        assert!(resolved.contains(&value));
        let quantile = resolved.iter().find(|t| t.is_quantile()).unwrap();
        assert_eq!(quantile.values().map(|b| b.lower), Some(2.5));
        assert_eq!(quantile.probabilities().map(|b| b.lower), Some(0.5));
    }

    #[test]
    fn test_missing_climatology_is_an_error() {
        let feature = Feature::new("DRRC2");
        let probability =
            Threshold::probability(0.5, ThresholdOperator::Greater, ThresholdOrientation::Left).unwrap();
        assert_eq!(
            add_quantiles(&BTreeSet::from([probability]), &feature, None),
            Err(ThresholdError::MissingClimatology { feature })
        );
    }

    #[test]
    fn test_unique_by_value_keeps_one_threshold_per_value() {
        let feature = Feature::new("DRRC2");
        let mut climatology = Climatology::new();
        climatology.add(feature.clone(), [3.0, 3.0, 3.0]);

        let thresholds: BTreeSet<Threshold> = [0.25, 0.5, 0.75]
            .into_iter()
            .map(|p| Threshold::probability(p, ThresholdOperator::Greater, ThresholdOrientation::Left).unwrap())
            .collect();
        let resolved = add_quantiles(&thresholds, &feature, Some(&climatology)).unwrap();
        let unique = unique_by_value(&resolved);

        assert_eq!(unique.len(), 1);
        assert_eq!(unique.iter().next().and_then(|t| t.probabilities()).map(|b| b.lower), Some(0.75));
    }
}
