//! Typed statistics produced by metrics.
//!
//! Every statistic names the metric that produced it and carries the metadata
//! of the pool it was computed from, including the threshold that defined the
//! pool subset.

use chrono::Duration;
use serde::Serialize;
use verify_common::time::duration_seconds;
use verify_common::{Instant, MetricConstant, PoolMetadata, StatisticType};

/// A single score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoubleScoreStatistic {
    pub metric: MetricConstant,
    pub value: f64,
    pub sample_size: usize,
    pub metadata: PoolMetadata,
}

/// A score expressed as a duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationScoreStatistic {
    pub metric: MetricConstant,
    #[serde(with = "optional_duration_seconds")]
    pub value: Option<Duration>,
    pub metadata: PoolMetadata,
}

/// One named axis of a diagram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramComponent {
    pub name: String,
    pub values: Vec<f64>,
}

impl DiagramComponent {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A diagram made of equal-length components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramStatistic {
    pub metric: MetricConstant,
    pub components: Vec<DiagramComponent>,
    pub metadata: PoolMetadata,
}

impl DiagramStatistic {
    pub fn component(&self, name: &str) -> Option<&[f64]> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }
}

/// A duration attached to an instant, such as a timing error per forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DurationPoint {
    pub time: Instant,
    #[serde(with = "duration_seconds")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationDiagramStatistic {
    pub metric: MetricConstant,
    pub points: Vec<DurationPoint>,
    pub metadata: PoolMetadata,
}

/// Quantiles of a sample, optionally linked to a value such as the observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxplotBox {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_value: Option<f64>,
    pub quantiles: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxplotStatistic {
    pub metric: MetricConstant,
    pub probabilities: Vec<f64>,
    pub boxes: Vec<BoxplotBox>,
    pub metadata: PoolMetadata,
}

/// One paired value at a valid time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairsRow {
    pub valid_time: Instant,
    pub left: f64,
    pub right: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairsStatistic {
    pub metric: MetricConstant,
    pub pairs: Vec<PairsRow>,
    pub metadata: PoolMetadata,
}

/// Any statistic, tagged by its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statistic {
    DoubleScore(DoubleScoreStatistic),
    DurationScore(DurationScoreStatistic),
    Diagram(DiagramStatistic),
    DurationDiagram(DurationDiagramStatistic),
    BoxplotPerPair(BoxplotStatistic),
    BoxplotPerPool(BoxplotStatistic),
    Pairs(PairsStatistic),
}

impl Statistic {
    pub fn statistic_type(&self) -> StatisticType {
        match self {
            Self::DoubleScore(_) => StatisticType::DoubleScore,
            Self::DurationScore(_) => StatisticType::DurationScore,
            Self::Diagram(_) => StatisticType::Diagram,
            Self::DurationDiagram(_) => StatisticType::DurationDiagram,
            Self::BoxplotPerPair(_) => StatisticType::BoxplotPerPair,
            Self::BoxplotPerPool(_) => StatisticType::BoxplotPerPool,
            Self::Pairs(_) => StatisticType::Pairs,
        }
    }

    pub fn metric(&self) -> MetricConstant {
        match self {
            Self::DoubleScore(s) => s.metric,
            Self::DurationScore(s) => s.metric,
            Self::Diagram(s) => s.metric,
            Self::DurationDiagram(s) => s.metric,
            Self::BoxplotPerPair(s) | Self::BoxplotPerPool(s) => s.metric,
            Self::Pairs(s) => s.metric,
        }
    }

    pub fn metadata(&self) -> &PoolMetadata {
        match self {
            Self::DoubleScore(s) => &s.metadata,
            Self::DurationScore(s) => &s.metadata,
            Self::Diagram(s) => &s.metadata,
            Self::DurationDiagram(s) => &s.metadata,
            Self::BoxplotPerPair(s) | Self::BoxplotPerPool(s) => &s.metadata,
            Self::Pairs(s) => &s.metadata,
        }
    }
}

mod optional_duration_seconds {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&duration.num_seconds()),
            None => serializer.serialize_none(),
        }
    }
}
