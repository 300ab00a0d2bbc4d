//! Statistics processing for pools of paired data.
//!
//! # Architecture
//!
//! ```text
//! EvaluationDeclaration
//!      │
//!      ▼
//! get_metrics_and_thresholds_for_processing
//!      │   (continuous metrics + all data, threshold metrics + classifiers)
//!      ▼
//! StatisticsProcessor::apply(pool)
//!      │
//!      ├─► add_quantiles / unique_by_value     per feature
//!      ├─► slice by threshold                  threshold worker pool
//!      ├─► MetricLibrary::evaluate per group   metric worker pool
//!      │        │
//!      │        ▼
//!      │   StatisticsFutures (oneshot per task)
//!      ▼
//! StatisticsStore
//! ```

pub mod error;
pub mod executor;
pub mod library;
pub mod processor;
pub mod slicing;
pub mod statistic;
pub mod store;
pub mod thresholds;

pub use error::{DeclarationError, Result, StatisticsError, ThresholdError};
pub use executor::{ExecutorConfig, WorkerPools};
pub use library::{BasicMetricLibrary, MetricInput, MetricLibrary, BOXPLOT_PROBABILITIES};
pub use processor::{
    EnsembleStatisticsProcessor, SingleValuedStatisticsProcessor, StatisticsProcessor,
    MISSING_TIME_WINDOW,
};
pub use statistic::{
    BoxplotBox, BoxplotStatistic, DiagramComponent, DiagramStatistic, DoubleScoreStatistic,
    DurationDiagramStatistic, DurationPoint, DurationScoreStatistic, PairsRow, PairsStatistic,
    Statistic,
};
pub use store::{StatisticsFuture, StatisticsFutures, StatisticsStore};
pub use thresholds::{
    add_quantiles, get_metrics_and_thresholds_for_processing, quantile, unique_by_value,
    MetricsAndThresholds,
};
