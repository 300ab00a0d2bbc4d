//! Immutable time series of events.
//!
//! A [`TimeSeries`] is a strictly time-ordered set of [`Event`]s together with
//! metadata describing where and what the values are. Events are shared behind
//! an `Arc`, so cloning a series or replacing its metadata is cheap.

use crate::error::{CommonError, CommonResult};
use crate::feature::Feature;
use crate::time::{Instant, ReferenceTimeType, TimeScale, TimeWindow};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One value at one valid time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
    pub valid_time: Instant,
    pub value: T,
}

impl<T> Event<T> {
    pub fn new(valid_time: Instant, value: T) -> Self {
        Self { valid_time, value }
    }
}

/// Metadata shared by every event of a time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSeriesMetadata {
    pub reference_times: BTreeMap<ReferenceTimeType, Instant>,
    pub time_scale: Option<TimeScale>,
    pub variable_name: String,
    pub feature: Feature,
    pub unit: String,
}

impl TimeSeriesMetadata {
    pub fn new(variable_name: impl Into<String>, feature: Feature, unit: impl Into<String>) -> Self {
        Self {
            reference_times: BTreeMap::new(),
            time_scale: None,
            variable_name: variable_name.into(),
            feature,
            unit: unit.into(),
        }
    }

    pub fn with_reference_time(mut self, kind: ReferenceTimeType, time: Instant) -> Self {
        self.reference_times.insert(kind, time);
        self
    }

    pub fn with_time_scale(mut self, time_scale: Option<TimeScale>) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = feature;
        self
    }

    /// The reference time used to compute lead durations: the T0 when present,
    /// otherwise the first declared reference time.
    pub fn lead_reference_time(&self) -> Option<Instant> {
        self.reference_times
            .get(&ReferenceTimeType::T0)
            .or_else(|| self.reference_times.values().next())
            .copied()
    }
}

/// A strictly time-ordered, immutable sequence of events.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries<T> {
    metadata: TimeSeriesMetadata,
    events: Arc<Vec<Event<T>>>,
}

impl<T: Clone> TimeSeries<T> {
    /// Create a series from events in any order, rejecting duplicate valid times.
    pub fn of(metadata: TimeSeriesMetadata, events: Vec<Event<T>>) -> CommonResult<Self> {
        let mut builder = TimeSeriesBuilder::new(metadata);
        for event in events {
            builder.add_event(event)?;
        }
        Ok(builder.build())
    }

    pub fn empty(metadata: TimeSeriesMetadata) -> Self {
        Self {
            metadata,
            events: Arc::new(Vec::new()),
        }
    }

    pub fn metadata(&self) -> &TimeSeriesMetadata {
        &self.metadata
    }

    pub fn events(&self) -> &[Event<T>] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn time_scale(&self) -> Option<TimeScale> {
        self.metadata.time_scale
    }

    pub fn valid_times(&self) -> BTreeSet<Instant> {
        self.events.iter().map(|e| e.valid_time).collect()
    }

    pub fn first_valid_time(&self) -> Option<Instant> {
        self.events.first().map(|e| e.valid_time)
    }

    pub fn last_valid_time(&self) -> Option<Instant> {
        self.events.last().map(|e| e.valid_time)
    }

    /// Look up the event at an exact valid time.
    pub fn event_at(&self, valid_time: Instant) -> Option<&Event<T>> {
        self.events
            .binary_search_by(|e| e.valid_time.cmp(&valid_time))
            .ok()
            .map(|i| &self.events[i])
    }

    /// Replace the metadata while sharing the events.
    pub fn with_metadata(&self, metadata: TimeSeriesMetadata) -> Self {
        Self {
            metadata,
            events: Arc::clone(&self.events),
        }
    }

    /// Transform every value, keeping valid times and metadata.
    pub fn map<U, F>(&self, f: F) -> TimeSeries<U>
    where
        F: Fn(&T) -> U,
    {
        TimeSeries {
            metadata: self.metadata.clone(),
            events: Arc::new(
                self.events
                    .iter()
                    .map(|e| Event::new(e.valid_time, f(&e.value)))
                    .collect(),
            ),
        }
    }

    /// Keep the events that satisfy the predicate.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Event<T>) -> bool,
    {
        Self {
            metadata: self.metadata.clone(),
            events: Arc::new(self.events.iter().filter(|e| predicate(e)).cloned().collect()),
        }
    }

    /// Shift every valid time and reference time by a fixed offset.
    pub fn with_valid_time_offset(&self, offset: Duration) -> Self {
        if offset.is_zero() {
            return self.clone();
        }
        let mut metadata = self.metadata.clone();
        for time in metadata.reference_times.values_mut() {
            *time = *time + offset;
        }
        Self {
            metadata,
            events: Arc::new(
                self.events
                    .iter()
                    .map(|e| Event::new(e.valid_time + offset, e.value.clone()))
                    .collect(),
            ),
        }
    }

    /// Keep events whose valid time lies within `[earliest, latest]`.
    pub fn snip(&self, earliest: Instant, latest: Instant) -> Self {
        self.filter(|e| e.valid_time >= earliest && e.valid_time <= latest)
    }

    /// Restrict the series to a time window.
    ///
    /// A series whose lead reference time falls outside the window's reference
    /// time bounds is emptied. Lead durations are only checked when the series
    /// has a reference time.
    pub fn filter_by_time_window(&self, window: &TimeWindow) -> Self {
        let reference_time = self.metadata.lead_reference_time();

        if let Some(reference) = reference_time {
            if !window.contains_reference_time(reference) {
                return Self::empty(self.metadata.clone());
            }
        }

        self.filter(|e| {
            if !window.contains_valid_time(e.valid_time) {
                return false;
            }
            match reference_time {
                Some(reference) => window.contains_lead_duration(e.valid_time - reference),
                None => true,
            }
        })
    }
}

/// Accumulates events for a series, rejecting duplicate valid times.
#[derive(Debug)]
pub struct TimeSeriesBuilder<T> {
    metadata: TimeSeriesMetadata,
    events: BTreeMap<Instant, T>,
}

impl<T: Clone> TimeSeriesBuilder<T> {
    pub fn new(metadata: TimeSeriesMetadata) -> Self {
        Self {
            metadata,
            events: BTreeMap::new(),
        }
    }

    pub fn add_event(&mut self, event: Event<T>) -> CommonResult<&mut Self> {
        if self.events.contains_key(&event.valid_time) {
            return Err(CommonError::DuplicateEvent {
                series: self.metadata.variable_name.clone(),
                valid_time: event.valid_time.to_rfc3339(),
            });
        }
        self.events.insert(event.valid_time, event.value);
        Ok(self)
    }

    /// Whether an event already exists at the valid time.
    pub fn contains(&self, valid_time: Instant) -> bool {
        self.events.contains_key(&valid_time)
    }

    pub fn set_metadata(&mut self, metadata: TimeSeriesMetadata) -> &mut Self {
        self.metadata = metadata;
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn build(self) -> TimeSeries<T> {
        TimeSeries {
            metadata: self.metadata,
            events: Arc::new(
                self.events
                    .into_iter()
                    .map(|(valid_time, value)| Event::new(valid_time, value))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn t(hour: u32) -> Instant {
        Utc.with_ymd_and_hms(1985, 1, 1, hour, 0, 0).unwrap()
    }

    fn metadata() -> TimeSeriesMetadata {
        TimeSeriesMetadata::new("STREAMFLOW", Feature::new("DRRC2"), "CMS")
    }

    #[test]
    fn test_events_are_sorted_by_valid_time() {
        let series = TimeSeries::of(
            metadata(),
            vec![Event::new(t(12), 2.0), Event::new(t(6), 1.0), Event::new(t(18), 3.0)],
        )
        .unwrap();

        let times: Vec<_> = series.events().iter().map(|e| e.valid_time).collect();
        assert_eq!(times, vec![t(6), t(12), t(18)]);
        assert_eq!(series.event_at(t(12)).map(|e| e.value), Some(2.0));
        assert!(series.event_at(t(13)).is_none());
    }

    #[test]
    fn test_duplicate_valid_time_is_rejected() {
        let result = TimeSeries::of(metadata(), vec![Event::new(t(6), 1.0), Event::new(t(6), 2.0)]);
        assert!(matches!(result, Err(CommonError::DuplicateEvent { .. })));
    }

    #[test]
    fn test_filter_by_valid_time_window() {
        let series = TimeSeries::of(
            metadata(),
            vec![Event::new(t(6), 1.0), Event::new(t(12), 2.0), Event::new(t(18), 3.0)],
        )
        .unwrap();
        let window = TimeWindow::unbounded().with_valid_times(t(6), t(18)).unwrap();

        let filtered = series.filter_by_time_window(&window);
        assert_eq!(filtered.valid_times(), [t(6), t(12)].into_iter().collect());
    }

    #[test]
    fn test_filter_by_lead_duration_window() {
        let forecast = TimeSeries::of(
            metadata().with_reference_time(ReferenceTimeType::T0, t(0)),
            vec![Event::new(t(6), 1.0), Event::new(t(12), 2.0), Event::new(t(18), 3.0)],
        )
        .unwrap();
        let window = TimeWindow::unbounded()
            .with_lead_durations(Duration::hours(6), Duration::hours(12))
            .unwrap();

        let filtered = forecast.filter_by_time_window(&window);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.events()[0].valid_time, t(6));
    }

    #[test]
    fn test_reference_time_outside_window_empties_series() {
        let forecast = TimeSeries::of(
            metadata().with_reference_time(ReferenceTimeType::T0, t(0)),
            vec![Event::new(t(6), 1.0)],
        )
        .unwrap();
        let window = TimeWindow::unbounded().with_reference_times(t(1), t(2)).unwrap();

        assert!(forecast.filter_by_time_window(&window).is_empty());
    }

    #[test]
    fn test_offset_shifts_valid_and_reference_times() {
        let forecast = TimeSeries::of(
            metadata().with_reference_time(ReferenceTimeType::T0, t(0)),
            vec![Event::new(t(6), 1.0)],
        )
        .unwrap();

        let shifted = forecast.with_valid_time_offset(Duration::hours(1));
        assert_eq!(shifted.first_valid_time(), Some(t(7)));
        assert_eq!(shifted.metadata().lead_reference_time(), Some(t(1)));
    }
}
