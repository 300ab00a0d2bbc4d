//! Subsetting pools by threshold and transforming pairs into event pairs.
//!
//! The threshold orientation decides which side of a pair is tested:
//! `Left` tests the observation, `Right` the prediction, `LeftAndRight` both.
//! For ensembles, `Right` requires every member to pass, `AnyRight` at least
//! one member, and `RightMean` tests the ensemble mean.

use verify_common::{Ensemble, Pair, Pool, Threshold, ThresholdOrientation, TimeSeries};

/// Keep the single-valued pairs selected by the threshold.
pub fn slice_single_valued(pool: &Pool<Pair<f64, f64>>, threshold: &Threshold) -> Pool<Pair<f64, f64>> {
    if threshold.is_all_data() {
        return pool.clone();
    }
    pool.filter(|pair| single_valued_passes(pair, threshold))
}

/// Whether a single-valued pair passes. Ensemble-only orientations reduce to
/// their single-valued meaning.
pub fn single_valued_passes(pair: &Pair<f64, f64>, threshold: &Threshold) -> bool {
    use ThresholdOrientation::*;
    match threshold.orientation() {
        Left => threshold.test(pair.left),
        Right | AnyRight | RightMean => threshold.test(pair.right),
        LeftAndRight | LeftAndAnyRight | LeftAndRightMean => {
            threshold.test(pair.left) && threshold.test(pair.right)
        }
    }
}

/// Keep the ensemble pairs selected by the threshold.
pub fn slice_ensemble(pool: &Pool<Pair<f64, Ensemble>>, threshold: &Threshold) -> Pool<Pair<f64, Ensemble>> {
    if threshold.is_all_data() {
        return pool.clone();
    }
    pool.filter(|pair| ensemble_passes(pair, threshold))
}

pub fn ensemble_passes(pair: &Pair<f64, Ensemble>, threshold: &Threshold) -> bool {
    use ThresholdOrientation::*;
    let members = pair.right.members();
    let all = || !members.is_empty() && members.iter().all(|m| threshold.test(*m));
    let any = || members.iter().any(|m| threshold.test(*m));
    let mean = || threshold.test(pair.right.mean());
    match threshold.orientation() {
        Left => threshold.test(pair.left),
        Right => all(),
        LeftAndRight => threshold.test(pair.left) && all(),
        AnyRight => any(),
        LeftAndAnyRight => threshold.test(pair.left) && any(),
        RightMean => mean(),
        LeftAndRightMean => threshold.test(pair.left) && mean(),
    }
}

/// Keep the paired time series with at least one event on the tested side
/// passing the threshold. Timing metrics look at whole series, so series are
/// kept or dropped as a unit.
pub fn slice_time_series(
    pool: &Pool<TimeSeries<Pair<f64, f64>>>,
    threshold: &Threshold,
) -> Pool<TimeSeries<Pair<f64, f64>>> {
    if threshold.is_all_data() {
        return pool.clone();
    }
    use ThresholdOrientation::*;
    pool.filter(|series| {
        let any_left = || series.events().iter().any(|e| threshold.test(e.value.left));
        let any_right = || series.events().iter().any(|e| threshold.test(e.value.right));
        match threshold.orientation() {
            Left => any_left(),
            Right | AnyRight | RightMean => any_right(),
            LeftAndRight | LeftAndAnyRight | LeftAndRightMean => any_left() && any_right(),
        }
    })
}

/// Map single-valued pairs to occurrence pairs: does the observation and does
/// the prediction exceed the threshold.
pub fn to_dichotomous(pool: &Pool<Pair<f64, f64>>, threshold: &Threshold) -> Pool<Pair<bool, bool>> {
    pool.map(|pair| Pair::new(threshold.test(pair.left), threshold.test(pair.right)))
}

/// Map ensemble pairs to probability pairs: the observed probability is 1 or
/// 0, the forecast probability is the fraction of members passing.
pub fn to_discrete_probability(
    pool: &Pool<Pair<f64, Ensemble>>,
    threshold: &Threshold,
) -> Pool<Pair<f64, f64>> {
    pool.map(|pair| {
        let observed = if threshold.test(pair.left) { 1.0 } else { 0.0 };
        let members = pair.right.members();
        let forecast = if members.is_empty() {
            f64::NAN
        } else {
            members.iter().filter(|m| threshold.test(**m)).count() as f64 / members.len() as f64
        };
        Pair::new(observed, forecast)
    })
}

/// Classify probability pairs as occurrences, using the classifier for the
/// forecast probability.
pub fn classify(pool: &Pool<Pair<f64, f64>>, classifier: &Threshold) -> Pool<Pair<bool, bool>> {
    pool.map(|pair| Pair::new(pair.left >= 1.0, classifier.test(pair.right)))
}

/// Map ensemble pairs to pairs of observation and ensemble mean.
pub fn to_ensemble_mean(pool: &Pool<TimeSeries<Pair<f64, Ensemble>>>) -> Pool<TimeSeries<Pair<f64, f64>>> {
    pool.map(|series| series.map(|pair| Pair::new(pair.left, pair.right.mean())))
}

/// The dichotomous sample size: the smaller of occurrences and non-occurrences
/// of the observed event.
pub fn dichotomous_sample_size(pool: &Pool<Pair<bool, bool>>) -> usize {
    let occurrences = pool.get().iter().filter(|p| p.left).count();
    occurrences.min(pool.len() - occurrences)
}

/// As [`dichotomous_sample_size`], for probability pairs.
pub fn probability_sample_size(pool: &Pool<Pair<f64, f64>>) -> usize {
    let occurrences = pool.get().iter().filter(|p| p.left >= 1.0).count();
    occurrences.min(pool.len() - occurrences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use verify_common::{EvaluationDescription, Feature, PoolMetadata, ThresholdOperator};

    fn metadata() -> PoolMetadata {
        PoolMetadata::new(EvaluationDescription::new("QINE", "SQIN", "CMS"), Feature::new("DRRC2"))
    }

    fn pool<T: Clone>(data: Vec<T>) -> Pool<T> {
        Pool::builder().add_data(data).set_metadata(metadata()).build().unwrap()
    }

    fn above(value: f64, orientation: ThresholdOrientation) -> Threshold {
        Threshold::value(value, ThresholdOperator::Greater, orientation)
    }

    #[test]
    fn test_single_valued_orientation() {
        let pairs = pool(vec![Pair::new(1.0, 10.0), Pair::new(10.0, 1.0), Pair::new(10.0, 10.0)]);

        assert_eq!(slice_single_valued(&pairs, &above(5.0, ThresholdOrientation::Left)).len(), 2);
        assert_eq!(slice_single_valued(&pairs, &above(5.0, ThresholdOrientation::Right)).len(), 2);
        assert_eq!(slice_single_valued(&pairs, &above(5.0, ThresholdOrientation::LeftAndRight)).len(), 1);
        assert_eq!(slice_single_valued(&pairs, &Threshold::all_data()).len(), 3);
    }

    #[test]
    fn test_ensemble_orientation() {
        let pairs = pool(vec![
            Pair::new(10.0, Ensemble::new(vec![1.0, 10.0])),
            Pair::new(1.0, Ensemble::new(vec![10.0, 10.0])),
        ]);
        let count = |orientation| slice_ensemble(&pairs, &above(5.0, orientation)).len();

        assert_eq!(count(ThresholdOrientation::Left), 1);
        assert_eq!(count(ThresholdOrientation::Right), 1);
        assert_eq!(count(ThresholdOrientation::AnyRight), 2);
        assert_eq!(count(ThresholdOrientation::LeftAndAnyRight), 1);
        assert_eq!(count(ThresholdOrientation::RightMean), 2);
        assert_eq!(count(ThresholdOrientation::LeftAndRight), 0);
    }

    #[test]
    fn test_discrete_probability_and_classification() {
        let pairs = pool(vec![
            Pair::new(10.0, Ensemble::new(vec![1.0, 10.0, 10.0, 10.0])),
            Pair::new(1.0, Ensemble::new(vec![1.0, 1.0, 1.0, 10.0])),
        ]);
        let probabilities = to_discrete_probability(&pairs, &above(5.0, ThresholdOrientation::Left));
        assert_eq!(probabilities.get(), &[Pair::new(1.0, 0.75), Pair::new(0.0, 0.25)]);
        assert_eq!(probability_sample_size(&probabilities), 1);

        let classifier = Threshold::classifier(0.5, ThresholdOperator::Greater).unwrap();
        let classified = classify(&probabilities, &classifier);
        assert_eq!(classified.get(), &[Pair::new(true, true), Pair::new(false, false)]);
    }

    #[test]
    fn test_dichotomous_sample_size_is_rarer_outcome() {
        let pairs = pool(vec![Pair::new(1.0, 1.0), Pair::new(6.0, 1.0), Pair::new(7.0, 9.0)]);
        let events = to_dichotomous(&pairs, &above(5.0, ThresholdOrientation::Left));
        assert_eq!(events.get()[0], Pair::new(false, false));
        assert_eq!(dichotomous_sample_size(&events), 1);
    }
}
