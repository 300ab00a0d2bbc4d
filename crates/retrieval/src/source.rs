//! The backing-store seam and an in-memory implementation of it.
//!
//! Physical storage is owned by another component; retrieval only needs raw
//! series by request or identifier and the table of unit conversions. The
//! [`InMemorySource`] serves both from memory and is what the evaluator loads
//! from JSON data files.

use crate::error::{Result, RetrieverError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use verify_common::{DataType, Feature, Instant, TimeScale, TimeWindow};

/// Which side of an evaluation a retrieval serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeftOrRightOrBaseline {
    Left,
    Right,
    Baseline,
}

impl std::fmt::Display for LeftOrRightOrBaseline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::Baseline => f.write_str("baseline"),
        }
    }
}

/// Everything a source needs to select raw series for one retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub project_id: i64,
    pub variable: String,
    pub feature: Feature,
    pub side: LeftOrRightOrBaseline,
    pub data_type: DataType,
    /// Pool scope; `None` reads the whole period of record
    pub time_window: Option<TimeWindow>,
    pub desired_time_scale: Option<TimeScale>,
}

/// A conversion from one source unit into the desired unit:
/// `(value + initial_offset) * factor + final_offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub from_unit_id: i64,
    pub from_unit: String,
    pub to_unit: String,
    #[serde(default)]
    pub initial_offset: f64,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub final_offset: f64,
}

fn default_factor() -> f64 {
    1.0
}

/// A raw value: one number, or one number per ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Single(f64),
    Members(Vec<f64>),
}

/// One raw value at one valid time, in the source unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub valid_time: Instant,
    pub value: RawValue,
}

/// A time series as stored, before unit conversion and filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTimeSeries {
    pub id: i64,
    pub variable: String,
    pub feature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_time: Option<Instant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_scale: Option<TimeScale>,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_labels: Option<Vec<String>>,
    pub events: Vec<RawEvent>,
}

impl RawTimeSeries {
    fn matches(&self, request: &RetrievalRequest) -> bool {
        if self.variable != request.variable || self.feature != request.feature.name {
            return false;
        }
        match (self.reference_time, &request.time_window) {
            (Some(reference_time), Some(window)) => window.contains_reference_time(reference_time),
            _ => true,
        }
    }
}

/// Read-only access to raw time series and unit conversions.
pub trait TimeSeriesSource: Send + Sync {
    /// Identifiers of the raw series that match a request.
    fn series_identifiers(&self, request: &RetrievalRequest) -> Result<Vec<i64>>;

    /// Read one raw series by identifier.
    fn read_series(&self, id: i64) -> Result<Option<RawTimeSeries>>;

    /// Read every raw series that matches a request.
    fn read_all(&self, request: &RetrievalRequest) -> Result<Vec<RawTimeSeries>> {
        let mut series = Vec::new();
        for id in self.series_identifiers(request)? {
            if let Some(raw) = self.read_series(id)? {
                series.push(raw);
            }
        }
        Ok(series)
    }

    /// Every known conversion into the desired unit, in one query.
    fn unit_conversions(&self, desired_unit: &str) -> Result<Vec<UnitConversion>>;
}

/// Serialized form of an in-memory data set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryData {
    #[serde(default)]
    pub series: Vec<RawTimeSeries>,
    #[serde(default)]
    pub unit_conversions: Vec<UnitConversion>,
}

/// Read counters for an [`InMemorySource`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    pub series_reads: u64,
    pub bulk_reads: u64,
    pub unit_queries: u64,
}

/// A [`TimeSeriesSource`] held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemorySource {
    data: InMemoryData,
    series_reads: AtomicU64,
    bulk_reads: AtomicU64,
    unit_queries: AtomicU64,
}

impl InMemorySource {
    pub fn new(data: InMemoryData) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// Parse a data set from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let data: InMemoryData = serde_json::from_str(json)?;
        debug!(
            series = data.series.len(),
            conversions = data.unit_conversions.len(),
            "Loaded in-memory data set"
        );
        Ok(Self::new(data))
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            series_reads: self.series_reads.load(Ordering::Relaxed),
            bulk_reads: self.bulk_reads.load(Ordering::Relaxed),
            unit_queries: self.unit_queries.load(Ordering::Relaxed),
        }
    }
}

impl TimeSeriesSource for InMemorySource {
    fn series_identifiers(&self, request: &RetrievalRequest) -> Result<Vec<i64>> {
        Ok(self
            .data
            .series
            .iter()
            .filter(|s| s.matches(request))
            .map(|s| s.id)
            .collect())
    }

    fn read_series(&self, id: i64) -> Result<Option<RawTimeSeries>> {
        self.series_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.data.series.iter().find(|s| s.id == id).cloned())
    }

    fn read_all(&self, request: &RetrievalRequest) -> Result<Vec<RawTimeSeries>> {
        self.bulk_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .data
            .series
            .iter()
            .filter(|s| s.matches(request))
            .cloned()
            .collect())
    }

    fn unit_conversions(&self, desired_unit: &str) -> Result<Vec<UnitConversion>> {
        self.unit_queries.fetch_add(1, Ordering::Relaxed);
        let conversions: Vec<UnitConversion> = self
            .data
            .unit_conversions
            .iter()
            .filter(|c| c.to_unit == desired_unit)
            .cloned()
            .collect();
        if conversions.is_empty() && !self.data.unit_conversions.is_empty() {
            return Err(RetrieverError::data_access(format!(
                "no unit conversions into '{desired_unit}' are known"
            )));
        }
        Ok(conversions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"{
        "series": [
            {
                "id": 1,
                "variable": "QINE",
                "feature": "DRRC2",
                "unit": "CFS",
                "events": [
                    {"valid_time": "1985-01-01T06:00:00Z", "value": 1.0},
                    {"valid_time": "1985-01-01T12:00:00Z", "value": 2.0}
                ]
            },
            {
                "id": 2,
                "variable": "SQIN",
                "feature": "DRRC2",
                "unit": "CMS",
                "reference_time": "1985-01-01T00:00:00Z",
                "events": [
                    {"valid_time": "1985-01-01T06:00:00Z", "value": [1.0, 2.0, 3.0]}
                ]
            }
        ],
        "unit_conversions": [
            {"from_unit_id": 1, "from_unit": "CFS", "to_unit": "CMS", "factor": 0.0283168},
            {"from_unit_id": 2, "from_unit": "CMS", "to_unit": "CMS"}
        ]
    }"#;

    fn request(variable: &str) -> RetrievalRequest {
        RetrievalRequest {
            project_id: 1,
            variable: variable.to_string(),
            feature: Feature::new("DRRC2"),
            side: LeftOrRightOrBaseline::Left,
            data_type: DataType::Observations,
            time_window: None,
            desired_time_scale: None,
        }
    }

    #[test]
    fn test_from_json_parses_single_and_member_values() {
        let source = InMemorySource::from_json(DATA).unwrap();
        let observed = source.read_all(&request("QINE")).unwrap();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].events[0].value, RawValue::Single(1.0));

        let forecast = source.read_series(2).unwrap().unwrap();
        assert_eq!(forecast.events[0].value, RawValue::Members(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_identifiers_match_variable_and_feature() {
        let source = InMemorySource::from_json(DATA).unwrap();
        assert_eq!(source.series_identifiers(&request("SQIN")).unwrap(), vec![2]);
        assert!(source.series_identifiers(&request("OTHER")).unwrap().is_empty());
    }

    #[test]
    fn test_unit_conversions_are_filtered_by_desired_unit() {
        let source = InMemorySource::from_json(DATA).unwrap();
        let conversions = source.unit_conversions("CMS").unwrap();
        assert_eq!(conversions.len(), 2);
        assert_eq!(conversions[1].factor, 1.0);
        assert!(source.unit_conversions("FURLONGS").is_err());
        assert_eq!(source.stats().unit_queries, 2);
    }

    #[test]
    fn test_malformed_json_is_a_data_access_error() {
        let result = InMemorySource::from_json("{ not json");
        assert!(matches!(result, Err(RetrieverError::DataAccess(_))));
    }
}
