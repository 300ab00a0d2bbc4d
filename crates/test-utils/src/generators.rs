//! Generators for synthetic time series.
//!
//! These generators create predictable, verifiable series so that expected
//! pairs and scores can be worked out by hand.

use crate::fixtures::{forecast_metadata, observed_metadata, t};
use verify_common::{Ensemble, Event, Instant, Pair, TimeSeries, TimeSeriesMetadata};

/// Creates a series with one event per `(hour, value)`.
pub fn series_of<T: Clone>(metadata: TimeSeriesMetadata, values: &[(u32, T)]) -> TimeSeries<T> {
    TimeSeries::of(
        metadata,
        values.iter().map(|(h, v)| Event::new(t(*h), v.clone())).collect(),
    )
    .unwrap()
}

/// Creates an observed series with a value every hour from `start`.
///
/// Values follow `value = hour`, which makes any pairing easy to verify.
///
/// # Example
///
/// ```
/// use test_utils::create_hourly_observations;
///
/// let series = create_hourly_observations(1, 3);
/// assert_eq!(series.len(), 3);
/// assert_eq!(series.events()[0].value, 1.0);
/// ```
pub fn create_hourly_observations(start: u32, count: u32) -> TimeSeries<f64> {
    let values: Vec<(u32, f64)> = (start..start + count).map(|h| (h, f64::from(h))).collect();
    series_of(observed_metadata(), &values)
}

/// Creates a single-valued forecast issued at `reference_hour`, valid every
/// hour for `count` hours after it, with `value = hour + offset`.
pub fn create_single_valued_forecast(reference_hour: u32, count: u32, offset: f64) -> TimeSeries<f64> {
    let values: Vec<(u32, f64)> = (1..=count)
        .map(|lead| {
            let hour = reference_hour + lead;
            (hour, f64::from(hour) + offset)
        })
        .collect();
    series_of(forecast_metadata(t(reference_hour)), &values)
}

/// Creates an ensemble forecast whose members are `hour + offset` for each offset.
pub fn create_ensemble_forecast(reference_hour: u32, count: u32, offsets: &[f64]) -> TimeSeries<Ensemble> {
    let values: Vec<(u32, Ensemble)> = (1..=count)
        .map(|lead| {
            let hour = reference_hour + lead;
            let members = offsets.iter().map(|o| f64::from(hour) + o).collect();
            (hour, Ensemble::new(members))
        })
        .collect();
    series_of(forecast_metadata(t(reference_hour)), &values)
}

/// Creates a paired forecast series from `(left, right)` values, one per hour
/// after `reference_hour`.
pub fn create_pairs(reference_hour: u32, values: &[(f64, f64)]) -> TimeSeries<Pair<f64, f64>> {
    let events: Vec<(u32, Pair<f64, f64>)> = values
        .iter()
        .zip(1u32..)
        .map(|((left, right), lead)| (reference_hour + lead, Pair::new(*left, *right)))
        .collect();
    series_of(forecast_metadata(t(reference_hour)), &events)
}

/// Creates paired ensemble data, one event per hour after `reference_hour`.
pub fn create_ensemble_pairs(
    reference_hour: u32,
    values: &[(f64, Vec<f64>)],
) -> TimeSeries<Pair<f64, Ensemble>> {
    let events: Vec<(u32, Pair<f64, Ensemble>)> = values
        .iter()
        .zip(1u32..)
        .map(|((left, members), lead)| {
            (reference_hour + lead, Pair::new(*left, Ensemble::new(members.clone())))
        })
        .collect();
    series_of(forecast_metadata(t(reference_hour)), &events)
}

/// Valid times of a series, for compact assertions.
pub fn valid_times<T: Clone>(series: &TimeSeries<T>) -> Vec<Instant> {
    series.events().iter().map(|e| e.valid_time).collect()
}
