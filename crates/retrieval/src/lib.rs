//! Time-series retrieval for forecast verification.
//!
//! Retrievers turn raw stored series into converted, window-restricted
//! [`TimeSeries`](verify_common::TimeSeries) values for one side of an
//! evaluation.
//!
//! # Architecture
//!
//! ```text
//! TimeSeriesSource (backing store, read-only)
//!      │
//!      ├─► UnitMapper::new(source, unit)     one bulk query for conversions
//!      │
//!      ▼
//! RetrieverFactory::{left,right,baseline}_retriever(feature, window)
//!      │
//!      ├─► SingleValuedForecastRetriever     by id, by id range, bulk
//!      ├─► ObservationRetriever              bulk only, one series per feature
//!      └─► EnsembleForecastRetriever         bulk only
//!               │
//!               ▼
//!      CachingRetriever (optional)           materialize once, share across pools
//! ```

pub mod cache;
pub mod error;
pub mod factory;
pub mod retriever;
pub mod source;
pub mod units;

pub use cache::{CacheStats, CachingRetriever};
pub use error::{Result, RetrieverError};
pub use factory::{
    EnsembleRetrieverFactory, RetrieverFactory, SeriesRetriever, SingleValuedRetrieverFactory,
};
pub use retriever::{
    Capabilities, EnsembleForecastRetriever, ObservationRetriever, Retriever, SeriesIter,
    SingleValuedForecastRetriever, SourceContext,
};
pub use source::{
    InMemoryData, InMemorySource, LeftOrRightOrBaseline, RawEvent, RawTimeSeries, RawValue,
    RetrievalRequest, SourceStats, TimeSeriesSource, UnitConversion,
};
pub use units::{UnitConverter, UnitMapper};
