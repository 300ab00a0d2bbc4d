//! Pools of paired data ready for metric computation.
//!
//! A [`Pool`] bundles the main data, optional baseline data and optional
//! climatology for one feature and one time window. Pools are immutable once
//! built; derived views (threshold subsets, unpacked pairs) are new pools that
//! share nothing mutable with their source.

use crate::error::{CommonError, CommonResult};
use crate::feature::Feature;
use crate::series::TimeSeries;
use crate::threshold::OneOrTwoThresholds;
use crate::time::{TimeScale, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// One left/right pair at one valid time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pair<L, R> {
    pub left: L,
    pub right: R,
}

impl<L, R> Pair<L, R> {
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }
}

/// Fixed-size set of ensemble member values with optional member labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    members: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    labels: Option<Arc<Vec<String>>>,
}

impl Ensemble {
    pub fn new(members: Vec<f64>) -> Self {
        Self {
            members,
            labels: None,
        }
    }

    pub fn with_labels(members: Vec<f64>, labels: Arc<Vec<String>>) -> CommonResult<Self> {
        if members.len() != labels.len() {
            return Err(CommonError::InvalidTimeSeries(format!(
                "ensemble has {} members but {} labels",
                members.len(),
                labels.len()
            )));
        }
        Ok(Self {
            members,
            labels: Some(labels),
        })
    }

    pub fn members(&self) -> &[f64] {
        &self.members
    }

    pub fn labels(&self) -> Option<&[String]> {
        self.labels.as_ref().map(|l| l.as_slice())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Arithmetic mean of the members, `NaN` when there are none.
    pub fn mean(&self) -> f64 {
        if self.members.is_empty() {
            return f64::NAN;
        }
        self.members.iter().sum::<f64>() / self.members.len() as f64
    }

    pub fn all_finite(&self) -> bool {
        self.members.iter().all(|m| m.is_finite())
    }
}

/// Climatological samples of left values, keyed by feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Climatology {
    by_feature: BTreeMap<Feature, Arc<Vec<f64>>>,
}

impl Climatology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add samples for a feature; non-finite samples are discarded.
    pub fn add(&mut self, feature: Feature, values: impl IntoIterator<Item = f64>) -> &mut Self {
        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        self.by_feature.insert(feature, Arc::new(values));
        self
    }

    pub fn get(&self, feature: &Feature) -> Option<&[f64]> {
        self.by_feature.get(feature).map(|v| v.as_slice())
    }

    pub fn has_feature(&self, feature: &Feature) -> bool {
        self.by_feature.contains_key(feature)
    }

    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.by_feature.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.by_feature.is_empty()
    }
}

/// Identity of the evaluation a pool belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationDescription {
    pub evaluation_id: Uuid,
    pub left_variable: String,
    pub right_variable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_variable: Option<String>,
    pub measurement_unit: String,
}

impl EvaluationDescription {
    pub fn new(
        left_variable: impl Into<String>,
        right_variable: impl Into<String>,
        measurement_unit: impl Into<String>,
    ) -> Self {
        Self {
            evaluation_id: Uuid::new_v4(),
            left_variable: left_variable.into(),
            right_variable: right_variable.into(),
            baseline_variable: None,
            measurement_unit: measurement_unit.into(),
        }
    }

    pub fn with_baseline_variable(mut self, variable: impl Into<String>) -> Self {
        self.baseline_variable = Some(variable.into());
        self
    }
}

/// Metadata describing one pool: what, where, when and which thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolMetadata {
    pub evaluation: EvaluationDescription,
    pub feature: Feature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<OneOrTwoThresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_scale: Option<TimeScale>,
    /// Whether this metadata describes baseline rather than main data
    pub is_baseline: bool,
}

impl PoolMetadata {
    pub fn new(evaluation: EvaluationDescription, feature: Feature) -> Self {
        Self {
            evaluation,
            feature,
            time_window: None,
            thresholds: None,
            time_scale: None,
            is_baseline: false,
        }
    }

    pub fn with_time_window(mut self, time_window: TimeWindow) -> Self {
        self.time_window = Some(time_window);
        self
    }

    pub fn with_thresholds(mut self, thresholds: OneOrTwoThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn with_time_scale(mut self, time_scale: Option<TimeScale>) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// The same metadata, marked as describing baseline data.
    pub fn as_baseline(&self) -> Self {
        Self {
            is_baseline: true,
            ..self.clone()
        }
    }

    pub fn measurement_unit(&self) -> &str {
        &self.evaluation.measurement_unit
    }
}

/// An immutable bundle of main data, optional baseline data and optional climatology.
///
/// An absent baseline (`None`) is distinct from a declared baseline that
/// produced no data (`Some` and empty): [`Pool::has_baseline`] reports the
/// latter as `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool<T> {
    main: Arc<Vec<T>>,
    metadata: PoolMetadata,
    baseline: Option<Arc<Vec<T>>>,
    baseline_metadata: Option<PoolMetadata>,
    climatology: Option<Climatology>,
}

impl<T: Clone> Pool<T> {
    pub fn builder() -> PoolBuilder<T> {
        PoolBuilder::default()
    }

    pub fn get(&self) -> &[T] {
        &self.main
    }

    pub fn metadata(&self) -> &PoolMetadata {
        &self.metadata
    }

    pub fn baseline(&self) -> Option<&[T]> {
        self.baseline.as_ref().map(|b| b.as_slice())
    }

    pub fn baseline_metadata(&self) -> Option<&PoolMetadata> {
        self.baseline_metadata.as_ref()
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline_metadata.is_some()
    }

    /// The baseline data as a pool in its own right.
    pub fn baseline_data(&self) -> Option<Pool<T>> {
        let metadata = self.baseline_metadata.clone()?;
        Some(Pool {
            main: self.baseline.clone().unwrap_or_default(),
            metadata,
            baseline: None,
            baseline_metadata: None,
            climatology: self.climatology.clone(),
        })
    }

    pub fn climatology(&self) -> Option<&Climatology> {
        self.climatology.as_ref()
    }

    pub fn len(&self) -> usize {
        self.main.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }

    /// Transform every main and baseline element.
    pub fn map<U, F>(&self, f: F) -> Pool<U>
    where
        F: Fn(&T) -> U,
    {
        Pool {
            main: Arc::new(self.main.iter().map(&f).collect()),
            metadata: self.metadata.clone(),
            baseline: self.baseline.as_ref().map(|b| Arc::new(b.iter().map(&f).collect())),
            baseline_metadata: self.baseline_metadata.clone(),
            climatology: self.climatology.clone(),
        }
    }

    /// Transform every main and baseline element, dropping those mapped to `None`.
    pub fn filter_map<U, F>(&self, f: F) -> Pool<U>
    where
        F: Fn(&T) -> Option<U>,
    {
        Pool {
            main: Arc::new(self.main.iter().filter_map(&f).collect()),
            metadata: self.metadata.clone(),
            baseline: self
                .baseline
                .as_ref()
                .map(|b| Arc::new(b.iter().filter_map(&f).collect())),
            baseline_metadata: self.baseline_metadata.clone(),
            climatology: self.climatology.clone(),
        }
    }

    /// Keep the main and baseline elements that satisfy the predicate.
    pub fn filter<F>(&self, predicate: F) -> Pool<T>
    where
        F: Fn(&T) -> bool,
    {
        self.filter_map(|t| predicate(t).then(|| t.clone()))
    }

    /// Replace the metadata, applying the same change to the baseline metadata.
    pub fn with_metadata<F>(&self, update: F) -> Pool<T>
    where
        F: Fn(PoolMetadata) -> PoolMetadata,
    {
        Pool {
            main: Arc::clone(&self.main),
            metadata: update(self.metadata.clone()),
            baseline: self.baseline.clone(),
            baseline_metadata: self.baseline_metadata.clone().map(&update),
            climatology: self.climatology.clone(),
        }
    }
}

impl<P: Clone> Pool<TimeSeries<P>> {
    /// Flatten a pool of paired series into a pool of pairs.
    pub fn unpack(&self) -> Pool<P> {
        let flatten = |series: &Arc<Vec<TimeSeries<P>>>| {
            Arc::new(
                series
                    .iter()
                    .flat_map(|s| s.events().iter().map(|e| e.value.clone()))
                    .collect::<Vec<P>>(),
            )
        };
        Pool {
            main: flatten(&self.main),
            metadata: self.metadata.clone(),
            baseline: self.baseline.as_ref().map(flatten),
            baseline_metadata: self.baseline_metadata.clone(),
            climatology: self.climatology.clone(),
        }
    }

    /// Total number of events across the main series.
    pub fn event_count(&self) -> usize {
        self.main.iter().map(|s| s.len()).sum()
    }
}

/// Validated construction of a [`Pool`].
#[derive(Debug)]
pub struct PoolBuilder<T> {
    main: Vec<T>,
    metadata: Option<PoolMetadata>,
    baseline: Option<Vec<T>>,
    baseline_metadata: Option<PoolMetadata>,
    climatology: Option<Climatology>,
}

impl<T> Default for PoolBuilder<T> {
    fn default() -> Self {
        Self {
            main: Vec::new(),
            metadata: None,
            baseline: None,
            baseline_metadata: None,
            climatology: None,
        }
    }
}

impl<T: Clone> PoolBuilder<T> {
    pub fn add_data(mut self, data: impl IntoIterator<Item = T>) -> Self {
        self.main.extend(data);
        self
    }

    pub fn set_metadata(mut self, metadata: PoolMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add baseline data. Declaring a baseline with no data is allowed.
    pub fn add_baseline_data(mut self, data: impl IntoIterator<Item = T>) -> Self {
        self.baseline.get_or_insert_with(Vec::new).extend(data);
        self
    }

    pub fn set_baseline_metadata(mut self, metadata: PoolMetadata) -> Self {
        self.baseline_metadata = Some(metadata);
        self
    }

    pub fn set_climatology(mut self, climatology: Climatology) -> Self {
        self.climatology = Some(climatology);
        self
    }

    pub fn build(self) -> CommonResult<Pool<T>> {
        let metadata = self.metadata.ok_or(CommonError::MissingField("metadata"))?;
        if metadata.is_baseline {
            return Err(CommonError::invalid_pool(
                "main metadata must not be marked as baseline metadata",
            ));
        }

        let baseline = match (self.baseline, &self.baseline_metadata) {
            (Some(_), None) => {
                return Err(CommonError::invalid_pool(
                    "baseline data was supplied without baseline metadata",
                ))
            }
            (Some(data), Some(_)) => Some(Arc::new(data)),
            (None, Some(_)) => Some(Arc::new(Vec::new())),
            (None, None) => None,
        };

        if let Some(baseline_metadata) = &self.baseline_metadata {
            if !baseline_metadata.is_baseline {
                return Err(CommonError::invalid_pool(
                    "baseline metadata must be marked as baseline metadata",
                ));
            }
        }

        Ok(Pool {
            main: Arc::new(self.main),
            metadata,
            baseline,
            baseline_metadata: self.baseline_metadata,
            climatology: self.climatology,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> PoolMetadata {
        PoolMetadata::new(
            EvaluationDescription::new("QINE", "SQIN", "CMS"),
            Feature::new("DRRC2"),
        )
    }

    #[test]
    fn test_pool_requires_metadata() {
        let result = Pool::<Pair<f64, f64>>::builder().add_data(vec![Pair::new(1.0, 2.0)]).build();
        assert_eq!(result.unwrap_err(), CommonError::MissingField("metadata"));
    }

    #[test]
    fn test_baseline_data_requires_baseline_metadata() {
        let result = Pool::builder()
            .set_metadata(metadata())
            .add_baseline_data(vec![Pair::new(1.0, 2.0)])
            .build();
        assert!(matches!(result, Err(CommonError::InvalidPool(_))));
    }

    #[test]
    fn test_empty_baseline_is_distinct_from_no_baseline() {
        let without = Pool::<Pair<f64, f64>>::builder().set_metadata(metadata()).build().unwrap();
        assert!(!without.has_baseline());
        assert!(without.baseline_data().is_none());

        let with_empty = Pool::<Pair<f64, f64>>::builder()
            .set_metadata(metadata())
            .set_baseline_metadata(metadata().as_baseline())
            .build()
            .unwrap();
        assert!(with_empty.has_baseline());
        assert_eq!(with_empty.baseline().map(|b| b.len()), Some(0));
        assert_ne!(without, with_empty);
    }

    #[test]
    fn test_filter_applies_to_main_and_baseline() {
        let pool = Pool::builder()
            .set_metadata(metadata())
            .add_data(vec![Pair::new(1.0, 2.0), Pair::new(5.0, 6.0)])
            .set_baseline_metadata(metadata().as_baseline())
            .add_baseline_data(vec![Pair::new(5.0, 1.0)])
            .build()
            .unwrap();

        let filtered = pool.filter(|p| p.left > 2.0);
        assert_eq!(filtered.get(), &[Pair::new(5.0, 6.0)]);
        assert_eq!(filtered.baseline().map(|b| b.len()), Some(1));
    }

    #[test]
    fn test_ensemble_mean_and_finiteness() {
        let ensemble = Ensemble::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(ensemble.mean(), 2.0);
        assert!(ensemble.all_finite());
        assert!(!Ensemble::new(vec![1.0, f64::NAN]).all_finite());
        assert!(Ensemble::new(vec![]).mean().is_nan());
        assert!(Ensemble::with_labels(vec![1.0], Arc::new(vec![])).is_err());
    }

    #[test]
    fn test_ensemble_labels_deserialize() {
        let ensemble: Ensemble =
            serde_json::from_str(r#"{"members": [1.0, 2.0], "labels": ["a", "b"]}"#).unwrap();
        assert_eq!(ensemble.labels(), Some(&["a".to_string(), "b".to_string()][..]));

        let unlabelled: Ensemble = serde_json::from_str(r#"{"members": [1.0]}"#).unwrap();
        assert_eq!(unlabelled.labels(), None);
    }

    #[test]
    fn test_climatology_discards_non_finite_values() {
        let mut climatology = Climatology::new();
        climatology.add(Feature::new("DRRC2"), vec![1.0, f64::NAN, 3.0, f64::INFINITY]);
        assert_eq!(climatology.get(&Feature::new("DRRC2")), Some(&[1.0, 3.0][..]));
        assert!(climatology.get(&Feature::new("OTHER")).is_none());
    }
}
