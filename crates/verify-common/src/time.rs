//! Time scales, time windows and reference time types.

use crate::error::{CommonError, CommonResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An absolute instant on the UTC time-line.
pub type Instant = DateTime<Utc>;

/// Periods at or below this many seconds are treated as instantaneous.
pub const INSTANTANEOUS_PERIOD_SECONDS: i64 = 60;

/// Function used to aggregate values over a time scale period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScaleFunction {
    Mean,
    Total,
    Minimum,
    Maximum,
    Unknown,
}

impl TimeScaleFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Total => "total",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for TimeScaleFunction {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "total" | "sum" => Ok(Self::Total),
            "minimum" | "min" => Ok(Self::Minimum),
            "maximum" | "max" => Ok(Self::Maximum),
            "unknown" => Ok(Self::Unknown),
            other => Err(CommonError::unrecognized("time scale function", other)),
        }
    }
}

impl fmt::Display for TimeScaleFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The period over which a value applies, together with the function that
/// produced it from finer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeScale {
    #[serde(with = "duration_seconds", rename = "period_seconds")]
    period: Duration,
    function: TimeScaleFunction,
}

impl TimeScale {
    /// Create a time scale with a strictly positive period.
    pub fn new(period: Duration, function: TimeScaleFunction) -> CommonResult<Self> {
        if period <= Duration::zero() {
            return Err(CommonError::InvalidTimeScale(format!(
                "period must be positive, got {}s",
                period.num_seconds()
            )));
        }
        Ok(Self { period, function })
    }

    /// A one-second scale with an unknown function.
    pub fn instantaneous() -> Self {
        Self {
            period: Duration::seconds(1),
            function: TimeScaleFunction::Unknown,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn function(&self) -> TimeScaleFunction {
        self.function
    }

    /// Whether the period is short enough to treat the value as a point sample.
    pub fn is_instantaneous(&self) -> bool {
        self.period <= Duration::seconds(INSTANTANEOUS_PERIOD_SECONDS)
    }
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_instantaneous() {
            write!(f, "[INSTANTANEOUS]")
        } else {
            write!(f, "[PT{}S,{}]", self.period.num_seconds(), self.function)
        }
    }
}

/// The kind of reference time attached to a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTimeType {
    /// Forecast issue time (the "T0" of a model run).
    T0,
    AnalysisStartTime,
    IssuedTime,
    LatestObservation,
    Unknown,
}

/// Bounds that define the pairing and filtering scope of one pool.
///
/// Every dimension is left-closed and right-open when bounded. Unbounded ends
/// use the minimum/maximum representable instant or duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub earliest_reference_time: Instant,
    pub latest_reference_time: Instant,
    pub earliest_valid_time: Instant,
    pub latest_valid_time: Instant,
    #[serde(with = "duration_seconds")]
    pub earliest_lead_duration: Duration,
    #[serde(with = "duration_seconds")]
    pub latest_lead_duration: Duration,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl TimeWindow {
    /// A window with every dimension unbounded.
    pub fn unbounded() -> Self {
        Self {
            earliest_reference_time: DateTime::<Utc>::MIN_UTC,
            latest_reference_time: DateTime::<Utc>::MAX_UTC,
            earliest_valid_time: DateTime::<Utc>::MIN_UTC,
            latest_valid_time: DateTime::<Utc>::MAX_UTC,
            earliest_lead_duration: Duration::MIN,
            latest_lead_duration: Duration::MAX,
        }
    }

    /// Create a fully specified window, rejecting inverted bounds.
    pub fn new(
        reference_times: (Instant, Instant),
        valid_times: (Instant, Instant),
        lead_durations: (Duration, Duration),
    ) -> CommonResult<Self> {
        Self::unbounded()
            .with_reference_times(reference_times.0, reference_times.1)?
            .with_valid_times(valid_times.0, valid_times.1)?
            .with_lead_durations(lead_durations.0, lead_durations.1)
    }

    pub fn with_reference_times(mut self, earliest: Instant, latest: Instant) -> CommonResult<Self> {
        if earliest > latest {
            return Err(CommonError::invalid_time_window(format!(
                "earliest reference time {earliest} is later than latest reference time {latest}"
            )));
        }
        self.earliest_reference_time = earliest;
        self.latest_reference_time = latest;
        Ok(self)
    }

    pub fn with_valid_times(mut self, earliest: Instant, latest: Instant) -> CommonResult<Self> {
        if earliest > latest {
            return Err(CommonError::invalid_time_window(format!(
                "earliest valid time {earliest} is later than latest valid time {latest}"
            )));
        }
        self.earliest_valid_time = earliest;
        self.latest_valid_time = latest;
        Ok(self)
    }

    pub fn with_lead_durations(mut self, earliest: Duration, latest: Duration) -> CommonResult<Self> {
        if earliest > latest {
            return Err(CommonError::invalid_time_window(format!(
                "earliest lead duration {}s is longer than latest lead duration {}s",
                earliest.num_seconds(),
                latest.num_seconds()
            )));
        }
        self.earliest_lead_duration = earliest;
        self.latest_lead_duration = latest;
        Ok(self)
    }

    pub fn contains_valid_time(&self, time: Instant) -> bool {
        time >= self.earliest_valid_time
            && (time < self.latest_valid_time || self.latest_valid_time == DateTime::<Utc>::MAX_UTC)
    }

    pub fn contains_reference_time(&self, time: Instant) -> bool {
        time >= self.earliest_reference_time
            && (time < self.latest_reference_time
                || self.latest_reference_time == DateTime::<Utc>::MAX_UTC)
    }

    pub fn contains_lead_duration(&self, lead: Duration) -> bool {
        lead >= self.earliest_lead_duration
            && (lead < self.latest_lead_duration || self.latest_lead_duration == Duration::MAX)
    }

    pub fn has_unbounded_valid_times(&self) -> bool {
        self.earliest_valid_time == DateTime::<Utc>::MIN_UTC
            && self.latest_valid_time == DateTime::<Utc>::MAX_UTC
    }

    pub fn has_unbounded_reference_times(&self) -> bool {
        self.earliest_reference_time == DateTime::<Utc>::MIN_UTC
            && self.latest_reference_time == DateTime::<Utc>::MAX_UTC
    }

    pub fn has_unbounded_lead_durations(&self) -> bool {
        self.earliest_lead_duration == Duration::MIN && self.latest_lead_duration == Duration::MAX
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn instant(t: &Instant) -> String {
            if *t == DateTime::<Utc>::MIN_UTC {
                "-INF".to_string()
            } else if *t == DateTime::<Utc>::MAX_UTC {
                "+INF".to_string()
            } else {
                t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
            }
        }
        fn lead(d: &Duration) -> String {
            if *d == Duration::MIN {
                "-INF".to_string()
            } else if *d == Duration::MAX {
                "+INF".to_string()
            } else {
                format!("PT{}S", d.num_seconds())
            }
        }
        write!(
            f,
            "[{},{},{},{},{},{}]",
            instant(&self.earliest_reference_time),
            instant(&self.latest_reference_time),
            instant(&self.earliest_valid_time),
            instant(&self.latest_valid_time),
            lead(&self.earliest_lead_duration),
            lead(&self.latest_lead_duration)
        )
    }
}

/// Generate sliding lead-duration windows of `width`, stepped by `frequency`,
/// from `minimum` up to and including a window that ends at `maximum`.
///
/// Every other dimension of `base` is copied into each window.
pub fn lead_duration_windows(
    base: TimeWindow,
    minimum: Duration,
    maximum: Duration,
    width: Duration,
    frequency: Option<Duration>,
) -> CommonResult<Vec<TimeWindow>> {
    let frequency = frequency.unwrap_or(width);
    if width <= Duration::zero() || frequency <= Duration::zero() {
        return Err(CommonError::invalid_time_window(
            "lead duration window width and frequency must be positive",
        ));
    }
    if minimum > maximum {
        return Err(CommonError::invalid_time_window(format!(
            "minimum lead duration {}s exceeds maximum lead duration {}s",
            minimum.num_seconds(),
            maximum.num_seconds()
        )));
    }

    let mut windows = Vec::new();
    let mut start = minimum;
    while start + width <= maximum {
        windows.push(base.with_lead_durations(start, start + width)?);
        start = start + frequency;
    }
    Ok(windows)
}

/// Serde helper for durations expressed as whole seconds.
pub mod duration_seconds {
    use chrono::Duration;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        Duration::try_seconds(seconds)
            .ok_or_else(|| D::Error::custom(format!("duration of {seconds}s is out of range")))
    }
}
