//! Temporal upscaling of time series to a coarser desired time scale.
//!
//! Each upscaled value aggregates the raw events that fall within the
//! right-closed interval `(end - period, end]` for one end time. Structural
//! incompatibilities between the existing and desired scales are fatal;
//! problems confined to individual intervals are reported as validation
//! events and the interval is skipped.

use crate::error::RescalingError;
use chrono::Duration;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};
use verify_common::{
    Ensemble, Event, Instant, TimeScale, TimeScaleFunction, TimeSeries, TimeSeriesBuilder,
    MISSING_DOUBLE,
};

/// Severity of a scale validation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
    Debug,
    Warn,
}

/// A non-fatal observation made while rescaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleValidationEvent {
    pub level: ValidationLevel,
    pub message: String,
}

impl ScaleValidationEvent {
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Warn,
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Debug,
            message: message.into(),
        }
    }
}

/// An upscaled series with the validation events raised while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct RescaledTimeSeries<T> {
    pub series: TimeSeries<T>,
    pub validation_events: Vec<ScaleValidationEvent>,
}

impl<T> RescaledTimeSeries<T> {
    fn unchanged(series: TimeSeries<T>) -> Self {
        Self {
            series,
            validation_events: Vec::new(),
        }
    }
}

/// Upscales series of `T` to a desired time scale.
pub trait TimeSeriesUpscaler<T>: Send + Sync {
    /// Upscale `series` to `desired`, producing one value per end time. When
    /// `ends_at` is empty, end times are derived from the series itself.
    fn upscale(
        &self,
        series: &TimeSeries<T>,
        desired: TimeScale,
        ends_at: &BTreeSet<Instant>,
    ) -> Result<RescaledTimeSeries<T>, RescalingError>;
}

/// Whether a series at `existing` needs rescaling to reach `desired`.
pub fn is_change_of_scale_required(existing: Option<TimeScale>, desired: TimeScale) -> bool {
    match existing {
        None => !desired.is_instantaneous(),
        Some(existing) => {
            existing != desired && !(existing.is_instantaneous() && desired.is_instantaneous())
        }
    }
}

/// Emit validation events through `tracing` at their level.
pub fn log_validation_events(context: &str, events: &[ScaleValidationEvent]) {
    for event in events {
        match event.level {
            ValidationLevel::Warn => warn!(context, detail = %event.message, "Rescaling"),
            ValidationLevel::Debug => debug!(context, detail = %event.message, "Rescaling"),
        }
    }
}

enum Plan {
    Unchanged,
    Relabel(Vec<ScaleValidationEvent>),
    Aggregate(Vec<ScaleValidationEvent>),
}

/// Check whether `existing` can be rescaled to `desired` and decide how.
fn plan(existing: Option<TimeScale>, desired: TimeScale) -> Result<Plan, RescalingError> {
    let Some(existing) = existing else {
        if desired.is_instantaneous() {
            return Ok(Plan::Unchanged);
        }
        return Err(RescalingError::MissingExistingTimeScale {
            desired: desired.to_string(),
        });
    };

    if existing == desired || (existing.is_instantaneous() && desired.is_instantaneous()) {
        return Ok(Plan::Unchanged);
    }

    if desired.function() == TimeScaleFunction::Unknown {
        return Err(RescalingError::UnknownDesiredFunction {
            desired: desired.to_string(),
        });
    }

    if desired.period() < existing.period() {
        return Err(RescalingError::Downscaling {
            existing: existing.to_string(),
            desired: desired.to_string(),
        });
    }

    if desired.period() == existing.period() {
        if existing.function() == TimeScaleFunction::Unknown {
            return Ok(Plan::Relabel(vec![ScaleValidationEvent::warn(format!(
                "the function of the existing time scale {existing} is unknown; assuming it is {} \
                 because the periods match",
                desired.function()
            ))]));
        }
        return Err(RescalingError::FunctionChangeWithoutPeriodChange {
            existing: existing.to_string(),
            desired: desired.to_string(),
        });
    }

    let mut events = Vec::new();

    if desired.function() == TimeScaleFunction::Total {
        if existing.is_instantaneous() {
            return Err(RescalingError::AccumulatingInstantaneous {
                desired: desired.to_string(),
            });
        }
        match existing.function() {
            TimeScaleFunction::Total => {}
            TimeScaleFunction::Unknown => events.push(ScaleValidationEvent::warn(format!(
                "the function of the existing time scale {existing} is unknown; assuming it is a \
                 total so that values can be accumulated"
            ))),
            _ => {
                return Err(RescalingError::AccumulatingNonAccumulation {
                    existing: existing.to_string(),
                    desired: desired.to_string(),
                })
            }
        }
    }

    let existing_seconds = existing.period().num_seconds();
    let desired_seconds = desired.period().num_seconds();
    if existing_seconds == 0 || desired_seconds % existing_seconds != 0 {
        events.push(ScaleValidationEvent::warn(format!(
            "the desired period of {desired_seconds}s is not an integer multiple of the existing \
             period of {existing_seconds}s; some intervals may not be upscaled"
        )));
    }

    Ok(Plan::Aggregate(events))
}

/// End times stepping by the desired period from one time-step before the
/// first event until the last event is covered.
fn end_times_from_series<T: Clone>(series: &TimeSeries<T>, period: Duration) -> BTreeSet<Instant> {
    let mut ends_at = BTreeSet::new();
    let events = series.events();
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return ends_at;
    };

    let time_step = match events.get(1) {
        Some(second) => second.valid_time - first.valid_time,
        None => Duration::zero(),
    };

    let mut check = first.valid_time - time_step;
    while check < last.valid_time {
        check = check + period;
        ends_at.insert(check);
    }
    ends_at
}

/// Group event indices by the interval `(end - period, end]` they fall in.
fn group_by_interval<T>(
    events: &[Event<T>],
    ends_at: &BTreeSet<Instant>,
    period: Duration,
) -> BTreeMap<Instant, Vec<usize>> {
    ends_at
        .iter()
        .map(|&end| {
            let start = end - period;
            let lower = events.partition_point(|e| e.valid_time <= start);
            let upper = events.partition_point(|e| e.valid_time <= end);
            (end, (lower..upper).collect())
        })
        .collect()
}

/// Check that one interval can produce a value: at least two events, evenly
/// spaced from the start of the interval.
fn check_interval(times: &[Instant], end: Instant, period: Duration) -> Option<ScaleValidationEvent> {
    if times.len() < 2 {
        return Some(ScaleValidationEvent::warn(format!(
            "skipped the interval ending at {end}: found {} event(s), which is insufficient for upscaling",
            times.len()
        )));
    }

    let mut previous = end - period;
    let mut gap: Option<Duration> = None;
    for &time in times {
        let next_gap = time - previous;
        if let Some(gap) = gap {
            if gap != next_gap {
                return Some(ScaleValidationEvent::warn(format!(
                    "skipped the interval ending at {end}: events are not evenly spaced ({}s and {}s)",
                    gap.num_seconds(),
                    next_gap.num_seconds()
                )));
            }
        }
        gap = Some(next_gap);
        previous = time;
    }
    None
}

fn aggregate(function: TimeScaleFunction, values: impl Iterator<Item = f64> + Clone) -> f64 {
    if values.clone().any(|v| !v.is_finite()) {
        return MISSING_DOUBLE;
    }
    match function {
        TimeScaleFunction::Mean => {
            let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            sum / count as f64
        }
        TimeScaleFunction::Total => values.sum(),
        TimeScaleFunction::Minimum => values.fold(f64::INFINITY, f64::min),
        TimeScaleFunction::Maximum => values.fold(f64::NEG_INFINITY, f64::max),
        TimeScaleFunction::Unknown => MISSING_DOUBLE,
    }
}

/// Upscaler for single-valued series.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleUpscaler;

impl DoubleUpscaler {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSeriesUpscaler<f64> for DoubleUpscaler {
    fn upscale(
        &self,
        series: &TimeSeries<f64>,
        desired: TimeScale,
        ends_at: &BTreeSet<Instant>,
    ) -> Result<RescaledTimeSeries<f64>, RescalingError> {
        if series.is_empty() {
            return Ok(RescaledTimeSeries::unchanged(series.clone()));
        }

        let mut validation_events = match plan(series.time_scale(), desired)? {
            Plan::Unchanged => return Ok(RescaledTimeSeries::unchanged(series.clone())),
            Plan::Relabel(events) => {
                let metadata = series.metadata().clone().with_time_scale(Some(desired));
                return Ok(RescaledTimeSeries {
                    series: series.with_metadata(metadata),
                    validation_events: events,
                });
            }
            Plan::Aggregate(events) => events,
        };

        let period = desired.period();
        let derived;
        let ends_at = if ends_at.is_empty() {
            derived = end_times_from_series(series, period);
            &derived
        } else {
            ends_at
        };

        let events = series.events();
        let metadata = series.metadata().clone().with_time_scale(Some(desired));
        let mut builder = TimeSeriesBuilder::new(metadata);

        for (end, indices) in group_by_interval(events, ends_at, period) {
            let times: Vec<Instant> = indices.iter().map(|&i| events[i].valid_time).collect();
            if let Some(problem) = check_interval(&times, end, period) {
                validation_events.push(problem);
                continue;
            }
            let value = aggregate(desired.function(), indices.iter().map(|&i| events[i].value));
            // End times are unique, so events cannot collide.
            let _ = builder.add_event(Event::new(end, value));
        }

        Ok(RescaledTimeSeries {
            series: builder.build(),
            validation_events,
        })
    }
}

fn labelled(members: Vec<f64>, labels: Option<&Arc<Vec<String>>>) -> Ensemble {
    match labels {
        Some(labels) if labels.len() == members.len() => {
            Ensemble::with_labels(members.clone(), Arc::clone(labels))
                .unwrap_or_else(|_| Ensemble::new(members))
        }
        _ => Ensemble::new(members),
    }
}

/// Upscaler for ensemble series. Members are upscaled independently and a
/// valid time is kept only when every member produced a value for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleUpscaler {
    members: DoubleUpscaler,
}

impl EnsembleUpscaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeSeriesUpscaler<Ensemble> for EnsembleUpscaler {
    fn upscale(
        &self,
        series: &TimeSeries<Ensemble>,
        desired: TimeScale,
        ends_at: &BTreeSet<Instant>,
    ) -> Result<RescaledTimeSeries<Ensemble>, RescalingError> {
        let Some(first) = series.events().first() else {
            return Ok(RescaledTimeSeries::unchanged(series.clone()));
        };

        let member_count = first.value.len();
        let labels = first.value.labels().map(|l| Arc::new(l.to_vec()));

        let mut by_time: BTreeMap<Instant, Vec<f64>> = BTreeMap::new();
        let mut validation_events = Vec::new();
        let mut rescaled_metadata = None;

        for member in 0..member_count {
            let member_series =
                series.map(|e| e.members().get(member).copied().unwrap_or(MISSING_DOUBLE));
            let rescaled = self.members.upscale(&member_series, desired, ends_at)?;
            // Member series share valid times, so validation is reported once.
            if member == 0 {
                validation_events = rescaled.validation_events;
                rescaled_metadata = Some(rescaled.series.metadata().clone());
            }
            for event in rescaled.series.events() {
                by_time.entry(event.valid_time).or_default().push(event.value);
            }
        }

        let metadata = rescaled_metadata.unwrap_or_else(|| series.metadata().clone());
        let mut builder = TimeSeriesBuilder::new(metadata);
        for (valid_time, members) in by_time {
            if members.len() != member_count {
                continue;
            }
            let _ = builder.add_event(Event::new(valid_time, labelled(members, labels.as_ref())));
        }

        Ok(RescaledTimeSeries {
            series: builder.build(),
            validation_events,
        })
    }
}
