//! Pool assembly for forecast verification.
//!
//! Turns retrieved left, right and baseline time series into immutable
//! [`Pool`](verify_common::Pool)s of paired data, one per feature and time
//! window.
//!
//! # Architecture
//!
//! ```text
//! PoolsGenerator (one per evaluation)
//!      │
//!      ▼
//! PoolOfPairsSupplier (one per feature and time window, memoized)
//!      │
//!      ├─► retrieve left / right / baseline (with valid-time offsets)
//!      ├─► TimeSeriesUpscaler      right first, then left at right's times
//!      ├─► TimeSeriesPairer        exact valid-time matching
//!      ├─► BaselineGenerator       persistence, when declared
//!      ├─► filter by time window
//!      └─► climatology             from the whole left record
//!               │
//!               ▼
//!      Arc<Pool<TimeSeries<Pair<L, R>>>>
//! ```

pub mod error;
pub mod generator;
pub mod pairing;
pub mod persistence;
pub mod supplier;
pub mod upscale;

pub use error::{PairingError, PoolCreationError, PoolError, RescalingError, Result};
pub use generator::{EnsemblePoolGenerator, PoolsGenerator, SingleValuedPoolGenerator};
pub use pairing::{all_members, Admissible, PairerByExactTime, TimeSeriesPairer};
pub use persistence::{BaselineGenerator, PersistenceGenerator};
pub use supplier::{BaselineSource, PairedPool, PoolOfPairsSupplier, PoolOfPairsSupplierBuilder};
pub use upscale::{
    is_change_of_scale_required, DoubleUpscaler, EnsembleUpscaler, RescaledTimeSeries,
    ScaleValidationEvent, TimeSeriesUpscaler, ValidationLevel,
};
