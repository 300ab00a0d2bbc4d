//! Common test fixtures for forecast verification tests.
//!
//! This module provides pre-defined metadata and pools that represent
//! common evaluation scenarios.

use chrono::{Duration, TimeZone, Utc};
use verify_common::{
    Climatology, DataType, DatasetDeclaration, Ensemble, EvaluationDeclaration,
    EvaluationDescription, Event, Feature, Instant, MetricConstant, Pair, Pool, PoolMetadata,
    ReferenceTimeType, TimeSeries, TimeSeriesMetadata, TimeWindow,
};

/// Common feature and variable names.
pub mod names {
    /// Default feature
    pub const FEATURE: &str = "DRRC2";

    /// Second feature for multi-feature tests
    pub const OTHER_FEATURE: &str = "DOLC2";

    /// Observed discharge
    pub const OBSERVED: &str = "QINE";

    /// Simulated discharge
    pub const SIMULATED: &str = "SQIN";

    /// Measurement unit
    pub const UNIT: &str = "CMS";
}

/// An instant on 1985-01-01 at `hour`. Hours past 23 roll into later days.
pub fn t(hour: u32) -> Instant {
    Utc.with_ymd_and_hms(1985, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i64::from(hour))
}

pub fn feature() -> Feature {
    Feature::new(names::FEATURE)
}

/// Series metadata for observed data at the default feature.
pub fn observed_metadata() -> TimeSeriesMetadata {
    TimeSeriesMetadata::new(names::OBSERVED, feature(), names::UNIT)
}

/// Series metadata for a forecast issued at `reference_time`.
pub fn forecast_metadata(reference_time: Instant) -> TimeSeriesMetadata {
    TimeSeriesMetadata::new(names::SIMULATED, feature(), names::UNIT)
        .with_reference_time(ReferenceTimeType::T0, reference_time)
}

pub fn evaluation() -> EvaluationDescription {
    EvaluationDescription::new(names::OBSERVED, names::SIMULATED, names::UNIT)
}

/// Pool metadata for the default feature and the given window.
pub fn pool_metadata(window: TimeWindow) -> PoolMetadata {
    PoolMetadata::new(evaluation(), feature()).with_time_window(window)
}

/// A minimal single-valued declaration: QINE against SQIN at the default
/// feature, with mean error, one unbounded window and no thresholds.
pub fn single_valued_declaration() -> EvaluationDeclaration {
    EvaluationDeclaration {
        project_id: 1,
        unit: names::UNIT.to_string(),
        features: vec![feature()],
        left: DatasetDeclaration::new(names::OBSERVED, DataType::Observations),
        right: DatasetDeclaration::new(names::SIMULATED, DataType::SingleValuedForecasts),
        baseline: None,
        time_scale: None,
        lead_windows: None,
        valid_dates: None,
        thresholds: Vec::new(),
        metrics: [MetricConstant::MeanError].into_iter().collect(),
        minimum_sample_size: 0,
        value_constraints: None,
    }
}

/// The same declaration against ensemble forecasts.
pub fn ensemble_declaration() -> EvaluationDeclaration {
    EvaluationDeclaration {
        right: DatasetDeclaration::new(names::SIMULATED, DataType::EnsembleForecasts),
        metrics: [MetricConstant::ContinuousRankedProbabilityScore].into_iter().collect(),
        ..single_valued_declaration()
    }
}

/// The regression pairs: (1, 6), (2, 7) and (3, 8) at 06Z, 12Z and 18Z.
///
/// Every error-based score of these pairs is exactly 5.
pub fn regression_pairs() -> TimeSeries<Pair<f64, f64>> {
    TimeSeries::of(
        forecast_metadata(t(0)),
        vec![
            Event::new(t(6), Pair::new(1.0, 6.0)),
            Event::new(t(12), Pair::new(2.0, 7.0)),
            Event::new(t(18), Pair::new(3.0, 8.0)),
        ],
    )
    .unwrap()
}

/// A pool holding only the regression pairs, with an unbounded window.
pub fn regression_pool() -> Pool<TimeSeries<Pair<f64, f64>>> {
    single_valued_pool(vec![regression_pairs()], None)
}

/// A single-valued pool over an unbounded window, with an optional baseline.
pub fn single_valued_pool(
    main: Vec<TimeSeries<Pair<f64, f64>>>,
    baseline: Option<Vec<TimeSeries<Pair<f64, f64>>>>,
) -> Pool<TimeSeries<Pair<f64, f64>>> {
    let metadata = pool_metadata(TimeWindow::unbounded());
    let mut builder = Pool::builder().add_data(main).set_metadata(metadata.clone());
    if let Some(baseline) = baseline {
        builder = builder
            .add_baseline_data(baseline)
            .set_baseline_metadata(metadata.as_baseline());
    }
    builder.build().unwrap()
}

/// A single-valued pool whose climatology holds `climatology` for the default feature.
pub fn single_valued_pool_with_climatology(
    main: Vec<TimeSeries<Pair<f64, f64>>>,
    climatology: Vec<f64>,
) -> Pool<TimeSeries<Pair<f64, f64>>> {
    let mut values = Climatology::new();
    values.add(feature(), climatology);
    Pool::builder()
        .add_data(main)
        .set_metadata(pool_metadata(TimeWindow::unbounded()))
        .set_climatology(values)
        .build()
        .unwrap()
}

/// An ensemble pool over an unbounded window with climatology.
pub fn ensemble_pool(
    main: Vec<TimeSeries<Pair<f64, Ensemble>>>,
    climatology: Vec<f64>,
) -> Pool<TimeSeries<Pair<f64, Ensemble>>> {
    let mut values = Climatology::new();
    values.add(feature(), climatology);
    Pool::builder()
        .add_data(main)
        .set_metadata(pool_metadata(TimeWindow::unbounded()))
        .set_climatology(values)
        .build()
        .unwrap()
}

/// A pool whose metadata has no time window.
pub fn pool_without_time_window() -> Pool<TimeSeries<Pair<f64, f64>>> {
    Pool::builder()
        .add_data(vec![regression_pairs()])
        .set_metadata(PoolMetadata::new(evaluation(), feature()))
        .build()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_roll_into_later_days() {
        assert_eq!(t(24), Utc.with_ymd_and_hms(1985, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_declarations_validate() {
        assert!(single_valued_declaration().validate().is_ok());
        assert!(ensemble_declaration().validate().is_ok());
    }

    #[test]
    fn test_regression_pool_shape() {
        let pool = regression_pool();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.event_count(), 3);
        assert!(!pool.has_baseline());
        assert!(pool.metadata().time_window.is_some());
    }

    #[test]
    fn test_pool_with_empty_baseline_still_has_baseline() {
        let pool = single_valued_pool(vec![regression_pairs()], Some(Vec::new()));
        assert!(pool.has_baseline());
        assert_eq!(pool.baseline().map(|b| b.len()), Some(0));
    }
}
