//! Thresholds that define events and pool subsets.
//!
//! A threshold is either a literal value, a probability that is later resolved
//! against climatology into a value (a quantile), or a probability classifier
//! that turns forecast probabilities into yes/no predictions.

use crate::error::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Absolute difference within which a value equals an `Equal` threshold.
pub const EQUAL_TOLERANCE: f64 = 1e-8;

/// Comparison applied between a value and the threshold bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperator {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    Between,
}

impl ThresholdOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Equal => "=",
            Self::Between => ">= AND <",
        }
    }
}

/// Which side of a pair a threshold is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOrientation {
    Left,
    Right,
    LeftAndRight,
    AnyRight,
    LeftAndAnyRight,
    RightMean,
    LeftAndRightMean,
}

/// The kind of quantity a threshold is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    Value,
    Probability,
    ProbabilityClassifier,
}

/// A lower bound and, for [`ThresholdOperator::Between`], an upper bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl Bounds {
    pub fn single(lower: f64) -> Self {
        Self { lower, upper: None }
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.lower.total_cmp(&other.lower).then_with(|| match (self.upper, other.upper) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.total_cmp(&b),
        })
    }

    fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.lower.to_bits().hash(state);
        self.upper.map(f64::to_bits).hash(state);
    }
}

fn cmp_optional_bounds(a: &Option<Bounds>, b: &Option<Bounds>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.total_cmp(b),
    }
}

/// A threshold with an operator, an orientation and value and/or probability bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
    kind: ThresholdType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Bounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probabilities: Option<Bounds>,
    operator: ThresholdOperator,
    orientation: ThresholdOrientation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
}

impl Threshold {
    /// A literal value threshold.
    pub fn value(value: f64, operator: ThresholdOperator, orientation: ThresholdOrientation) -> Self {
        Self {
            kind: ThresholdType::Value,
            values: Some(Bounds::single(value)),
            probabilities: None,
            operator,
            orientation,
            label: None,
            unit: None,
        }
    }

    /// A literal value threshold covering `[lower, upper)`.
    pub fn value_between(
        lower: f64,
        upper: f64,
        orientation: ThresholdOrientation,
    ) -> CommonResult<Self> {
        if !(lower < upper) {
            return Err(CommonError::invalid_threshold(format!(
                "lower bound {lower} must be less than upper bound {upper}"
            )));
        }
        Ok(Self {
            values: Some(Bounds {
                lower,
                upper: Some(upper),
            }),
            ..Self::value(lower, ThresholdOperator::Between, orientation)
        })
    }

    /// A probability threshold awaiting resolution against climatology.
    pub fn probability(
        probability: f64,
        operator: ThresholdOperator,
        orientation: ThresholdOrientation,
    ) -> CommonResult<Self> {
        check_probability(probability)?;
        Ok(Self {
            kind: ThresholdType::Probability,
            values: None,
            probabilities: Some(Bounds::single(probability)),
            operator,
            orientation,
            label: None,
            unit: None,
        })
    }

    /// A classifier that turns forecast probabilities into yes/no predictions.
    pub fn classifier(probability: f64, operator: ThresholdOperator) -> CommonResult<Self> {
        check_probability(probability)?;
        Ok(Self {
            kind: ThresholdType::ProbabilityClassifier,
            values: None,
            probabilities: Some(Bounds::single(probability)),
            operator,
            orientation: ThresholdOrientation::LeftAndRight,
            label: None,
            unit: None,
        })
    }

    /// A probability threshold resolved to a value.
    pub fn quantile(
        value: f64,
        probability: f64,
        operator: ThresholdOperator,
        orientation: ThresholdOrientation,
    ) -> CommonResult<Self> {
        check_probability(probability)?;
        Ok(Self {
            kind: ThresholdType::Probability,
            values: Some(Bounds::single(value)),
            probabilities: Some(Bounds::single(probability)),
            operator,
            orientation,
            label: None,
            unit: None,
        })
    }

    /// The threshold that admits all data: `> -inf` on both sides.
    pub fn all_data() -> Self {
        Self::value(
            f64::NEG_INFINITY,
            ThresholdOperator::Greater,
            ThresholdOrientation::LeftAndRight,
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_orientation(mut self, orientation: ThresholdOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set the value bounds, keeping any probabilities. Resolving a
    /// probability threshold against climatology turns it into a quantile.
    pub fn with_values(mut self, values: Bounds) -> Self {
        self.values = Some(values);
        self
    }

    pub fn kind(&self) -> ThresholdType {
        self.kind
    }

    pub fn values(&self) -> Option<Bounds> {
        self.values
    }

    pub fn probabilities(&self) -> Option<Bounds> {
        self.probabilities
    }

    pub fn operator(&self) -> ThresholdOperator {
        self.operator
    }

    pub fn orientation(&self) -> ThresholdOrientation {
        self.orientation
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Whether the threshold still needs a value derived from climatology.
    pub fn needs_quantile(&self) -> bool {
        self.kind == ThresholdType::Probability && self.values.is_none()
    }

    pub fn is_quantile(&self) -> bool {
        self.kind == ThresholdType::Probability && self.values.is_some()
    }

    /// Whether the threshold admits every value.
    pub fn is_all_data(&self) -> bool {
        let by_value = matches!(self.values, Some(Bounds { lower, upper: None })
            if lower == f64::NEG_INFINITY)
            && matches!(self.operator, ThresholdOperator::Greater | ThresholdOperator::GreaterEqual);
        let by_probability = self.values.is_none()
            && self.kind == ThresholdType::Probability
            && matches!(self.probabilities, Some(Bounds { lower, upper: None }) if lower == 0.0)
            && self.operator == ThresholdOperator::GreaterEqual;
        by_value || by_probability
    }

    /// Test a value against the value bounds, or the probability bounds when
    /// no value bounds exist. Non-finite values other than infinities never pass.
    pub fn test(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let Some(bounds) = self.values.or(self.probabilities) else {
            return false;
        };
        match self.operator {
            ThresholdOperator::Greater => value > bounds.lower,
            ThresholdOperator::GreaterEqual => value >= bounds.lower,
            ThresholdOperator::Less => value < bounds.lower,
            ThresholdOperator::LessEqual => value <= bounds.lower,
            ThresholdOperator::Equal => (value - bounds.lower).abs() < EQUAL_TOLERANCE,
            ThresholdOperator::Between => {
                value >= bounds.lower && bounds.upper.map_or(true, |upper| value < upper)
            }
        }
    }
}

fn check_probability(probability: f64) -> CommonResult<()> {
    if !(0.0..=1.0).contains(&probability) {
        return Err(CommonError::invalid_threshold(format!(
            "probability {probability} is outside [0, 1]"
        )));
    }
    Ok(())
}

impl PartialEq for Threshold {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Threshold {}

impl PartialOrd for Threshold {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Threshold {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| cmp_optional_bounds(&self.values, &other.values))
            .then_with(|| cmp_optional_bounds(&self.probabilities, &other.probabilities))
            .then_with(|| self.operator.cmp(&other.operator))
            .then_with(|| self.orientation.cmp(&other.orientation))
            .then_with(|| self.label.cmp(&other.label))
            .then_with(|| self.unit.cmp(&other.unit))
    }
}

impl Hash for Threshold {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        if let Some(values) = &self.values {
            values.hash_bits(state);
        }
        if let Some(probabilities) = &self.probabilities {
            probabilities.hash_bits(state);
        }
        self.operator.hash(state);
        self.orientation.hash(state);
        self.label.hash(state);
        self.unit.hash(state);
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all_data() {
            return f.write_str("All data");
        }
        let bounds = |b: &Bounds| match b.upper {
            Some(upper) => format!("{} AND < {}", b.lower, upper),
            None => b.lower.to_string(),
        };
        match (&self.values, &self.probabilities) {
            (Some(v), Some(p)) => write!(f, "Pr {} {} ({})", self.operator.symbol(), bounds(p), bounds(v))?,
            (None, Some(p)) => write!(f, "Pr {} {}", self.operator.symbol(), bounds(p))?,
            (Some(v), None) => write!(f, "{} {}", self.operator.symbol(), bounds(v))?,
            (None, None) => f.write_str("Undefined")?,
        }
        if let Some(unit) = &self.unit {
            write!(f, " {unit}")?;
        }
        if let Some(label) = &self.label {
            write!(f, " ({label})")?;
        }
        Ok(())
    }
}

/// A main threshold with an optional classifier, used for ensemble pools
/// where probabilities are first derived and then classified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OneOrTwoThresholds {
    pub first: Threshold,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second: Option<Threshold>,
}

impl OneOrTwoThresholds {
    pub fn of(first: Threshold) -> Self {
        Self { first, second: None }
    }

    pub fn with_classifier(first: Threshold, classifier: Threshold) -> Self {
        Self {
            first,
            second: Some(classifier),
        }
    }
}

impl fmt::Display for OneOrTwoThresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.second {
            Some(second) => write!(f, "{} AND {}", self.first, second),
            None => write!(f, "{}", self.first),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_all_data_threshold() {
        let all = Threshold::all_data();
        assert!(all.is_all_data());
        assert!(all.test(-1.0e300));
        assert!(!all.test(f64::NAN));
        assert_eq!(all.to_string(), "All data");
        assert!(!Threshold::value(0.0, ThresholdOperator::Greater, ThresholdOrientation::Left).is_all_data());
    }

    #[test]
    fn test_operators() {
        let greater = Threshold::value(5.0, ThresholdOperator::Greater, ThresholdOrientation::Left);
        assert!(greater.test(5.1));
        assert!(!greater.test(5.0));

        let at_least = Threshold::value(5.0, ThresholdOperator::GreaterEqual, ThresholdOrientation::Left);
        assert!(at_least.test(5.0));

        let less = Threshold::value(5.0, ThresholdOperator::Less, ThresholdOrientation::Left);
        assert!(less.test(4.9));
        assert!(!less.test(5.0));

        let between = Threshold::value_between(1.0, 2.0, ThresholdOrientation::Left).unwrap();
        assert!(between.test(1.0));
        assert!(!between.test(2.0));
    }

    #[test]
    fn test_equal_tolerates_rounding() {
        let equal = Threshold::value(110.0, ThresholdOperator::Equal, ThresholdOrientation::Left);
        assert!(equal.test(100.0 * 1.1));
        assert!(equal.test(110.0 + 1e-9));
        assert!(!equal.test(110.0 + 1e-6));
        assert!(!equal.test(f64::NAN));
    }

    #[test]
    fn test_probability_bounds_are_checked() {
        assert!(Threshold::probability(1.1, ThresholdOperator::Greater, ThresholdOrientation::Left).is_err());
        assert!(Threshold::classifier(-0.1, ThresholdOperator::Greater).is_err());
        let p = Threshold::probability(0.9, ThresholdOperator::Greater, ThresholdOrientation::Left).unwrap();
        assert!(p.needs_quantile());
        assert!(!p.is_quantile());
    }

    #[test]
    fn test_thresholds_deduplicate_in_sets() {
        let mut set = BTreeSet::new();
        set.insert(Threshold::value(1.0, ThresholdOperator::Greater, ThresholdOrientation::Left));
        set.insert(Threshold::value(1.0, ThresholdOperator::Greater, ThresholdOrientation::Left));
        set.insert(Threshold::value(2.0, ThresholdOperator::Greater, ThresholdOrientation::Left));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().and_then(|t| t.values()).map(|b| b.lower), Some(1.0));
    }

    #[test]
    fn test_quantile_display() {
        let q = Threshold::quantile(12.5, 0.9, ThresholdOperator::Greater, ThresholdOrientation::Left)
            .unwrap()
            .with_unit("CMS");
        assert_eq!(q.to_string(), "Pr > 0.9 (12.5) CMS");
    }
}
