//! Shared data model for forecast verification.
//!
//! Every crate in the workspace speaks in terms of these types:
//!
//! - [`TimeSeries`] / [`Event`]: immutable, strictly time-ordered values
//! - [`TimeScale`] / [`TimeWindow`]: the temporal support of values and the
//!   scope of one pool
//! - [`Threshold`]: value, probability and classifier thresholds
//! - [`Pool`]: paired main/baseline data plus climatology for one feature and
//!   one time window
//! - [`MetricConstant`]: metric identifiers with their data groups and
//!   statistic types
//! - [`EvaluationDeclaration`]: the resolved declaration that drives an evaluation

pub mod declaration;
pub mod error;
pub mod feature;
pub mod metric;
pub mod pool;
pub mod series;
pub mod threshold;
pub mod time;

pub use declaration::{
    BaselineDeclaration, DataType, DatasetDeclaration, EvaluationDeclaration, GeneratedBaseline,
    LeadWindowDeclaration, ThresholdDeclaration, ValueConstraints,
};
pub use error::{CommonError, CommonResult};
pub use feature::Feature;
pub use metric::{MetricConstant, SampleDataGroup, StatisticType};
pub use pool::{Climatology, Ensemble, EvaluationDescription, Pair, Pool, PoolBuilder, PoolMetadata};
pub use series::{Event, TimeSeries, TimeSeriesBuilder, TimeSeriesMetadata};
pub use threshold::{
    Bounds, OneOrTwoThresholds, Threshold, ThresholdOperator, ThresholdOrientation, ThresholdType,
    EQUAL_TOLERANCE,
};
pub use time::{Instant, ReferenceTimeType, TimeScale, TimeScaleFunction, TimeWindow};

/// Sentinel for a missing numeric value.
pub const MISSING_DOUBLE: f64 = f64::NAN;
