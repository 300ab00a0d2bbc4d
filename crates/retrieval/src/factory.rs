//! Factories that bind retrievers to a declaration, feature and time window.

use crate::error::Result;
use crate::retriever::{
    EnsembleForecastRetriever, ObservationRetriever, Retriever, SingleValuedForecastRetriever,
    SourceContext,
};
use crate::source::{LeftOrRightOrBaseline, RetrievalRequest, TimeSeriesSource};
use crate::units::UnitMapper;
use std::sync::Arc;
use verify_common::{
    DataType, DatasetDeclaration, Ensemble, EvaluationDeclaration, Feature, TimeSeries, TimeWindow,
};

/// Shared retriever handle for time series of `T`.
pub type SeriesRetriever<T> = Arc<dyn Retriever<TimeSeries<T>>>;

/// Creates retrievers for each side of an evaluation.
///
/// `L` is the left value type and `R` the right (and baseline) value type.
pub trait RetrieverFactory<L: 'static, R: 'static>: Send + Sync {
    /// Left data for one time window, or for the whole period of record when
    /// `window` is `None` (used for climatology).
    fn left_retriever(&self, feature: &Feature, window: Option<&TimeWindow>) -> Result<SeriesRetriever<L>>;

    fn right_retriever(&self, feature: &Feature, window: &TimeWindow) -> Result<SeriesRetriever<R>>;

    /// Baseline data, when a baseline dataset is declared.
    fn baseline_retriever(
        &self,
        feature: &Feature,
        window: &TimeWindow,
    ) -> Result<Option<SeriesRetriever<R>>>;
}

#[derive(Clone)]
struct FactoryContext {
    source: Arc<dyn TimeSeriesSource>,
    declaration: Arc<EvaluationDeclaration>,
    units: Arc<UnitMapper>,
}

impl FactoryContext {
    fn context(
        &self,
        dataset: &DatasetDeclaration,
        side: LeftOrRightOrBaseline,
        feature: &Feature,
        window: Option<&TimeWindow>,
    ) -> SourceContext {
        let request = RetrievalRequest {
            project_id: self.declaration.project_id,
            variable: dataset.variable.clone(),
            feature: feature.clone(),
            side,
            data_type: dataset.data_type,
            time_window: window.copied(),
            desired_time_scale: self.declaration.time_scale,
        };
        SourceContext::new(
            Arc::clone(&self.source),
            request,
            Arc::clone(&self.units),
            self.declaration.value_constraints,
        )
    }

    fn left(&self, feature: &Feature, window: Option<&TimeWindow>) -> SeriesRetriever<f64> {
        // Observations are not issued at reference times, so only valid-time
        // bounds apply to the left side.
        let window = window.map(|w| TimeWindow {
            earliest_valid_time: w.earliest_valid_time,
            latest_valid_time: w.latest_valid_time,
            ..TimeWindow::unbounded()
        });
        let context = self.context(
            &self.declaration.left,
            LeftOrRightOrBaseline::Left,
            feature,
            window.as_ref(),
        );
        Arc::new(ObservationRetriever::new(context))
    }
}

/// Retrievers for single-valued forecast evaluations.
#[derive(Clone)]
pub struct SingleValuedRetrieverFactory {
    inner: FactoryContext,
}

impl SingleValuedRetrieverFactory {
    pub fn new(
        source: Arc<dyn TimeSeriesSource>,
        declaration: Arc<EvaluationDeclaration>,
        units: Arc<UnitMapper>,
    ) -> Self {
        Self {
            inner: FactoryContext {
                source,
                declaration,
                units,
            },
        }
    }

    fn forecasts(
        &self,
        dataset: &DatasetDeclaration,
        side: LeftOrRightOrBaseline,
        feature: &Feature,
        window: &TimeWindow,
    ) -> SeriesRetriever<f64> {
        let context = self.inner.context(dataset, side, feature, Some(window));
        match dataset.data_type {
            DataType::Observations => Arc::new(ObservationRetriever::new(context)),
            _ => Arc::new(SingleValuedForecastRetriever::new(context)),
        }
    }
}

impl RetrieverFactory<f64, f64> for SingleValuedRetrieverFactory {
    fn left_retriever(&self, feature: &Feature, window: Option<&TimeWindow>) -> Result<SeriesRetriever<f64>> {
        Ok(self.inner.left(feature, window))
    }

    fn right_retriever(&self, feature: &Feature, window: &TimeWindow) -> Result<SeriesRetriever<f64>> {
        Ok(self.forecasts(&self.inner.declaration.right, LeftOrRightOrBaseline::Right, feature, window))
    }

    fn baseline_retriever(
        &self,
        feature: &Feature,
        window: &TimeWindow,
    ) -> Result<Option<SeriesRetriever<f64>>> {
        Ok(self
            .inner
            .declaration
            .baseline_dataset()
            .map(|dataset| self.forecasts(dataset, LeftOrRightOrBaseline::Baseline, feature, window)))
    }
}

/// Retrievers for ensemble forecast evaluations.
#[derive(Clone)]
pub struct EnsembleRetrieverFactory {
    inner: FactoryContext,
}

impl EnsembleRetrieverFactory {
    pub fn new(
        source: Arc<dyn TimeSeriesSource>,
        declaration: Arc<EvaluationDeclaration>,
        units: Arc<UnitMapper>,
    ) -> Self {
        Self {
            inner: FactoryContext {
                source,
                declaration,
                units,
            },
        }
    }
}

impl RetrieverFactory<f64, Ensemble> for EnsembleRetrieverFactory {
    fn left_retriever(&self, feature: &Feature, window: Option<&TimeWindow>) -> Result<SeriesRetriever<f64>> {
        Ok(self.inner.left(feature, window))
    }

    fn right_retriever(&self, feature: &Feature, window: &TimeWindow) -> Result<SeriesRetriever<Ensemble>> {
        let context = self.inner.context(
            &self.inner.declaration.right,
            LeftOrRightOrBaseline::Right,
            feature,
            Some(window),
        );
        Ok(Arc::new(EnsembleForecastRetriever::new(context)))
    }

    fn baseline_retriever(
        &self,
        feature: &Feature,
        window: &TimeWindow,
    ) -> Result<Option<SeriesRetriever<Ensemble>>> {
        Ok(self.inner.declaration.baseline_dataset().map(|dataset| {
            let context = self.inner.context(dataset, LeftOrRightOrBaseline::Baseline, feature, Some(window));
            Arc::new(EnsembleForecastRetriever::new(context)) as SeriesRetriever<Ensemble>
        }))
    }
}
