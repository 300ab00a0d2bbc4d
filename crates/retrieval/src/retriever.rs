//! Retrievers: lazy sequences of converted time series for one dataset side.
//!
//! A [`Retriever`] advertises which access paths it supports through
//! [`Capabilities`]. Forecast sources with stable per-series identifiers
//! support every path; observation and ensemble sources are bulk-only and
//! answer the by-identifier paths with [`RetrieverError::Unsupported`].

use crate::error::{Result, RetrieverError};
use crate::source::{RawTimeSeries, RawValue, RetrievalRequest, TimeSeriesSource};
use crate::units::{UnitConverter, UnitMapper};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use verify_common::{
    Ensemble, Event, ReferenceTimeType, TimeScale, TimeSeries, TimeSeriesBuilder,
    TimeSeriesMetadata, TimeWindow, ValueConstraints,
};

/// A lazy sequence of retrieved items.
pub type SeriesIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

/// The access paths a retriever supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub by_id: bool,
    pub by_id_range: bool,
    pub bulk: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        by_id: true,
        by_id_range: true,
        bulk: true,
    };

    pub const BULK_ONLY: Capabilities = Capabilities {
        by_id: false,
        by_id_range: false,
        bulk: true,
    };
}

/// Supplies items (usually time series) for one dataset side.
pub trait Retriever<T: 'static>: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Retrieve one item by identifier.
    fn get_by_id(&self, _id: i64) -> Result<Option<T>> {
        Err(RetrieverError::unsupported("retrieval by identifier", self.name()))
    }

    /// Identifiers of every item this retriever can supply.
    fn get_all_identifiers(&self) -> Result<Vec<i64>> {
        Err(RetrieverError::unsupported("identifier listing", self.name()))
    }

    /// Retrieve a range of items by identifier, lazily.
    fn get_by_ids(&self, ids: Vec<i64>) -> Result<SeriesIter<'_, T>> {
        if !self.capabilities().by_id_range {
            return Err(RetrieverError::unsupported(
                "retrieval by identifier range",
                self.name(),
            ));
        }
        Ok(Box::new(
            ids.into_iter().filter_map(move |id| self.get_by_id(id).transpose()),
        ))
    }

    /// Retrieve every item. By default, maps the identifiers through
    /// [`Retriever::get_by_id`].
    fn get(&self) -> Result<SeriesIter<'_, T>> {
        let ids = self.get_all_identifiers()?;
        self.get_by_ids(ids)
    }
}

/// Shared plumbing for retrievers backed by a [`TimeSeriesSource`].
#[derive(Clone)]
pub struct SourceContext {
    pub source: Arc<dyn TimeSeriesSource>,
    pub request: RetrievalRequest,
    pub units: Arc<UnitMapper>,
    pub constraints: Option<ValueConstraints>,
}

impl std::fmt::Debug for SourceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceContext")
            .field("request", &self.request)
            .field("desired_unit", &self.units.desired_unit())
            .finish()
    }
}

impl SourceContext {
    pub fn new(
        source: Arc<dyn TimeSeriesSource>,
        request: RetrievalRequest,
        units: Arc<UnitMapper>,
        constraints: Option<ValueConstraints>,
    ) -> Self {
        Self {
            source,
            request,
            units,
            constraints,
        }
    }

    fn converter_for(&self, raw: &RawTimeSeries) -> Result<UnitConverter> {
        match raw.unit_id {
            Some(id) if raw.unit != self.units.desired_unit() => self
                .units
                .unit_mapper_by_id(id)
                .or_else(|_| self.units.unit_mapper_by_name(&raw.unit)),
            _ => self.units.unit_mapper_by_name(&raw.unit),
        }
    }

    fn metadata_for(&self, raw: &RawTimeSeries) -> TimeSeriesMetadata {
        let mut metadata = TimeSeriesMetadata::new(
            raw.variable.clone(),
            self.request.feature.clone(),
            self.units.desired_unit(),
        )
        .with_time_scale(raw.time_scale);
        if let Some(reference_time) = raw.reference_time {
            metadata = metadata.with_reference_time(ReferenceTimeType::T0, reference_time);
        }
        metadata
    }

    /// The pool window, widened at its lower valid-time and lead-duration
    /// bounds by the desired period so that upscaling sees whole periods.
    fn retrieval_window(&self) -> Option<TimeWindow> {
        let window = self.request.time_window?;
        let period = self
            .request
            .desired_time_scale
            .map(|s| s.period())
            .unwrap_or_else(Duration::zero);

        let earliest_valid = window
            .earliest_valid_time
            .checked_sub_signed(period)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let earliest_lead = window
            .earliest_lead_duration
            .checked_sub(&period)
            .unwrap_or(Duration::MIN);

        Some(TimeWindow {
            earliest_valid_time: earliest_valid,
            earliest_lead_duration: earliest_lead,
            ..window
        })
    }

    fn convert_value(&self, convert: &UnitConverter, value: f64) -> f64 {
        let converted = convert(value);
        match &self.constraints {
            Some(constraints) => constraints.apply(converted),
            None => converted,
        }
    }

    /// Convert a raw single-valued series into the desired unit.
    pub fn to_single_valued(&self, raw: RawTimeSeries) -> Result<TimeSeries<f64>> {
        let convert = self.converter_for(&raw)?;
        let mut builder = TimeSeriesBuilder::new(self.metadata_for(&raw));
        for event in raw.events {
            let value = match event.value {
                RawValue::Single(value) => value,
                RawValue::Members(members) if members.len() == 1 => members[0],
                RawValue::Members(members) => {
                    return Err(RetrieverError::data_access(format!(
                        "series {} has {} values at {} where one was expected",
                        raw.id,
                        members.len(),
                        event.valid_time
                    )))
                }
            };
            builder.add_event(Event::new(event.valid_time, self.convert_value(&convert, value)))?;
        }
        Ok(self.restrict(builder.build()))
    }

    /// Convert a raw ensemble series into the desired unit.
    pub fn to_ensemble(&self, raw: RawTimeSeries) -> Result<TimeSeries<Ensemble>> {
        let convert = self.converter_for(&raw)?;
        let labels = raw.member_labels.clone().map(Arc::new);
        let mut builder = TimeSeriesBuilder::new(self.metadata_for(&raw));
        let mut member_count = None;

        for event in raw.events {
            let members: Vec<f64> = match event.value {
                RawValue::Single(value) => vec![value],
                RawValue::Members(members) => members,
            };
            if *member_count.get_or_insert(members.len()) != members.len() {
                return Err(RetrieverError::data_access(format!(
                    "series {} has a varying number of ensemble members at {}",
                    raw.id, event.valid_time
                )));
            }
            let members = members
                .into_iter()
                .map(|m| self.convert_value(&convert, m))
                .collect();
            let ensemble = match &labels {
                Some(labels) => Ensemble::with_labels(members, Arc::clone(labels))?,
                None => Ensemble::new(members),
            };
            builder.add_event(Event::new(event.valid_time, ensemble))?;
        }
        Ok(self.restrict(builder.build()))
    }

    fn restrict<T: Clone>(&self, series: TimeSeries<T>) -> TimeSeries<T> {
        match self.retrieval_window() {
            Some(window) => series.filter_by_time_window(&window),
            None => series,
        }
    }
}

/// Single-valued forecasts, retrievable by identifier or in bulk.
#[derive(Debug, Clone)]
pub struct SingleValuedForecastRetriever {
    context: SourceContext,
}

impl SingleValuedForecastRetriever {
    pub fn new(context: SourceContext) -> Self {
        Self { context }
    }
}

impl Retriever<TimeSeries<f64>> for SingleValuedForecastRetriever {
    fn name(&self) -> &'static str {
        "single-valued forecast retriever"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn get_by_id(&self, id: i64) -> Result<Option<TimeSeries<f64>>> {
        self.context
            .source
            .read_series(id)?
            .map(|raw| self.context.to_single_valued(raw))
            .transpose()
    }

    fn get_all_identifiers(&self) -> Result<Vec<i64>> {
        let ids = self.context.source.series_identifiers(&self.context.request)?;
        debug!(
            variable = %self.context.request.variable,
            feature = %self.context.request.feature,
            count = ids.len(),
            "Listed forecast identifiers"
        );
        Ok(ids)
    }
}

/// Observations, consolidated into one series per feature. Bulk only.
#[derive(Debug, Clone)]
pub struct ObservationRetriever {
    context: SourceContext,
}

impl ObservationRetriever {
    pub fn new(context: SourceContext) -> Self {
        Self { context }
    }

    fn consolidate(&self, raw: Vec<RawTimeSeries>) -> Result<Option<TimeSeries<f64>>> {
        let mut time_scale: Option<Option<TimeScale>> = None;
        let mut consolidated: Option<TimeSeriesBuilder<f64>> = None;

        for raw_series in raw {
            let expected = *time_scale.get_or_insert(raw_series.time_scale);
            if expected != raw_series.time_scale {
                return Err(RetrieverError::data_access(format!(
                    "observations of '{}' at '{}' have conflicting time scales: {:?} and {:?}",
                    raw_series.variable, raw_series.feature, expected, raw_series.time_scale
                )));
            }

            let series = self.context.to_single_valued(raw_series)?;
            let builder = consolidated
                .get_or_insert_with(|| TimeSeriesBuilder::new(series.metadata().clone()));
            for event in series.events() {
                if builder.contains(event.valid_time) {
                    warn!(
                        valid_time = %event.valid_time,
                        feature = %self.context.request.feature,
                        "Ignoring duplicate observation"
                    );
                    continue;
                }
                builder.add_event(event.clone())?;
            }
        }

        Ok(consolidated.map(TimeSeriesBuilder::build))
    }
}

impl Retriever<TimeSeries<f64>> for ObservationRetriever {
    fn name(&self) -> &'static str {
        "observation retriever"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BULK_ONLY
    }

    fn get(&self) -> Result<SeriesIter<'_, TimeSeries<f64>>> {
        let raw = self.context.source.read_all(&self.context.request)?;
        debug!(
            variable = %self.context.request.variable,
            feature = %self.context.request.feature,
            raw_series = raw.len(),
            "Read observations"
        );
        let consolidated = self.consolidate(raw)?;
        Ok(Box::new(consolidated.into_iter().map(Ok)))
    }
}

/// Ensemble forecasts. Bulk only.
#[derive(Debug, Clone)]
pub struct EnsembleForecastRetriever {
    context: SourceContext,
}

impl EnsembleForecastRetriever {
    pub fn new(context: SourceContext) -> Self {
        Self { context }
    }
}

impl Retriever<TimeSeries<Ensemble>> for EnsembleForecastRetriever {
    fn name(&self) -> &'static str {
        "ensemble forecast retriever"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BULK_ONLY
    }

    fn get(&self) -> Result<SeriesIter<'_, TimeSeries<Ensemble>>> {
        let raw = self.context.source.read_all(&self.context.request)?;
        debug!(
            variable = %self.context.request.variable,
            feature = %self.context.request.feature,
            raw_series = raw.len(),
            "Read ensemble forecasts"
        );
        Ok(Box::new(
            raw.into_iter().map(move |r| self.context.to_ensemble(r)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{
        InMemoryData, InMemorySource, LeftOrRightOrBaseline, RawEvent, UnitConversion,
    };
    use chrono::TimeZone;
    use verify_common::{DataType, Feature, Instant, TimeScaleFunction};

    fn t(hour: u32) -> Instant {
        Utc.with_ymd_and_hms(1985, 1, 1, hour, 0, 0).unwrap()
    }

    fn raw(id: i64, variable: &str, reference: Option<Instant>, values: &[(u32, RawValue)]) -> RawTimeSeries {
        RawTimeSeries {
            id,
            variable: variable.to_string(),
            feature: "DRRC2".to_string(),
            reference_time: reference,
            time_scale: None,
            unit: "CFS".to_string(),
            unit_id: None,
            member_labels: None,
            events: values
                .iter()
                .map(|(hour, value)| RawEvent {
                    valid_time: t(*hour),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    fn context(series: Vec<RawTimeSeries>, variable: &str, data_type: DataType) -> SourceContext {
        let source: Arc<dyn TimeSeriesSource> = Arc::new(InMemorySource::new(InMemoryData {
            series,
            unit_conversions: vec![UnitConversion {
                from_unit_id: 1,
                from_unit: "CFS".to_string(),
                to_unit: "CMS".to_string(),
                initial_offset: 0.0,
                factor: 2.0,
                final_offset: 0.0,
            }],
        }));
        let units = Arc::new(UnitMapper::new(source.as_ref(), "CMS").unwrap());
        let request = RetrievalRequest {
            project_id: 1,
            variable: variable.to_string(),
            feature: Feature::new("DRRC2"),
            side: LeftOrRightOrBaseline::Right,
            data_type,
            time_window: None,
            desired_time_scale: None,
        };
        SourceContext::new(source, request, units, None)
    }

    #[test]
    fn test_forecasts_by_id_and_in_bulk() {
        let retriever = SingleValuedForecastRetriever::new(context(
            vec![
                raw(1, "SQIN", Some(t(0)), &[(6, RawValue::Single(1.0))]),
                raw(2, "SQIN", Some(t(6)), &[(12, RawValue::Single(2.0))]),
                raw(3, "QINE", None, &[(6, RawValue::Single(3.0))]),
            ],
            "SQIN",
            DataType::SingleValuedForecasts,
        ));

        assert_eq!(retriever.get_all_identifiers().unwrap(), vec![1, 2]);
        let one = retriever.get_by_id(2).unwrap().unwrap();
        assert_eq!(one.events()[0].value, 4.0);
        assert_eq!(one.metadata().unit, "CMS");

        let all: Vec<_> = retriever.get().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(all.len(), 2);
        assert!(retriever.get_by_id(42).unwrap().is_none());
    }

    #[test]
    fn test_bulk_only_retrievers_report_unsupported() {
        let retriever = ObservationRetriever::new(context(vec![], "QINE", DataType::Observations));
        assert_eq!(retriever.capabilities(), Capabilities::BULK_ONLY);
        assert!(matches!(
            retriever.get_by_id(1),
            Err(RetrieverError::Unsupported { .. })
        ));
        assert!(matches!(
            retriever.get_by_ids(vec![1]).map(|_| ()),
            Err(RetrieverError::Unsupported { .. })
        ));
        assert_eq!(retriever.get().unwrap().count(), 0);
    }

    #[test]
    fn test_observations_are_consolidated() {
        let retriever = ObservationRetriever::new(context(
            vec![
                raw(1, "QINE", None, &[(6, RawValue::Single(1.0)), (12, RawValue::Single(2.0))]),
                raw(2, "QINE", None, &[(12, RawValue::Single(9.0)), (18, RawValue::Single(3.0))]),
            ],
            "QINE",
            DataType::Observations,
        ));

        let series: Vec<_> = retriever.get().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(series.len(), 1);
        let values: Vec<f64> = series[0].events().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_conflicting_observation_scales_fail() {
        let mut first = raw(1, "QINE", None, &[(6, RawValue::Single(1.0))]);
        first.time_scale = Some(TimeScale::new(Duration::hours(1), TimeScaleFunction::Mean).unwrap());
        let second = raw(2, "QINE", None, &[(12, RawValue::Single(1.0))]);

        let retriever =
            ObservationRetriever::new(context(vec![first, second], "QINE", DataType::Observations));
        assert!(matches!(retriever.get().map(|_| ()), Err(RetrieverError::DataAccess(_))));
    }

    #[test]
    fn test_ensemble_member_counts_must_agree() {
        let retriever = EnsembleForecastRetriever::new(context(
            vec![raw(
                1,
                "SQIN",
                Some(t(0)),
                &[
                    (6, RawValue::Members(vec![1.0, 2.0])),
                    (12, RawValue::Members(vec![1.0])),
                ],
            )],
            "SQIN",
            DataType::EnsembleForecasts,
        ));

        let results: Vec<_> = retriever.get().unwrap().collect();
        assert!(matches!(results[0], Err(RetrieverError::DataAccess(_))));
    }

    #[test]
    fn test_window_is_widened_by_desired_period() {
        let mut context = context(
            vec![raw(
                1,
                "QINE",
                None,
                &[(3, RawValue::Single(1.0)), (6, RawValue::Single(2.0)), (12, RawValue::Single(3.0))],
            )],
            "QINE",
            DataType::Observations,
        );
        context.request.time_window =
            Some(TimeWindow::unbounded().with_valid_times(t(7), t(13)).unwrap());
        context.request.desired_time_scale =
            Some(TimeScale::new(Duration::hours(3), TimeScaleFunction::Mean).unwrap());

        let retriever = ObservationRetriever::new(context);
        let series: Vec<_> = retriever.get().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(series[0].valid_times(), [t(6), t(12)].into_iter().collect());
    }
}
