//! Pool generation: one memoized supplier per time window of a feature.
//!
//! ```text
//! PoolsGenerator::suppliers(feature, windows)
//!      │
//!      ├─► climatology CachingRetriever   shared by every window (optional)
//!      │
//!      └─► for each window
//!               ├─► right / baseline retrievers bound to the window
//!               ├─► left retriever bound to the window (when no climatology)
//!               └─► PoolOfPairsSupplier   nothing read until get()
//! ```

mod ensemble;
mod single_valued;

pub use ensemble::EnsemblePoolGenerator;
pub use single_valued::SingleValuedPoolGenerator;

use crate::error::{PoolCreationError, PoolError};
use crate::pairing::TimeSeriesPairer;
use crate::persistence::BaselineGenerator;
use crate::supplier::{BaselineSource, PoolOfPairsSupplier};
use crate::upscale::{DoubleUpscaler, TimeSeriesUpscaler};
use retrieval::{CachingRetriever, RetrieverFactory, SeriesRetriever};
use std::sync::Arc;
use tracing::debug;
use verify_common::{
    EvaluationDeclaration, EvaluationDescription, Feature, PoolMetadata, TimeWindow,
};

/// Creates pool suppliers for the features of one evaluation.
pub struct PoolsGenerator<R: 'static> {
    declaration: Arc<EvaluationDeclaration>,
    evaluation: EvaluationDescription,
    factory: Arc<dyn RetrieverFactory<f64, R>>,
    right_upscaler: Arc<dyn TimeSeriesUpscaler<R>>,
    pairer: Arc<dyn TimeSeriesPairer<f64, R>>,
    generated_baseline: Option<Arc<dyn BaselineGenerator<f64, R>>>,
}

impl<R: Clone + Send + Sync + 'static> PoolsGenerator<R> {
    pub fn new(
        declaration: Arc<EvaluationDeclaration>,
        factory: Arc<dyn RetrieverFactory<f64, R>>,
        right_upscaler: Arc<dyn TimeSeriesUpscaler<R>>,
        pairer: Arc<dyn TimeSeriesPairer<f64, R>>,
        generated_baseline: Option<Arc<dyn BaselineGenerator<f64, R>>>,
    ) -> Self {
        let mut evaluation = EvaluationDescription::new(
            declaration.left.variable.clone(),
            declaration.right.variable.clone(),
            declaration.unit.clone(),
        );
        if let Some(baseline) = declaration.baseline_dataset() {
            evaluation = evaluation.with_baseline_variable(baseline.variable.clone());
        } else if generated_baseline.is_some() {
            evaluation = evaluation.with_baseline_variable(declaration.left.variable.clone());
        }

        Self {
            declaration,
            evaluation,
            factory,
            right_upscaler,
            pairer,
            generated_baseline,
        }
    }

    pub fn declaration(&self) -> &EvaluationDeclaration {
        &self.declaration
    }

    pub fn evaluation(&self) -> &EvaluationDescription {
        &self.evaluation
    }

    /// Whether suppliers read left data for the whole period of record.
    pub fn needs_climatology(&self) -> bool {
        self.declaration.has_probability_thresholds() || self.generated_baseline.is_some()
    }

    /// One supplier per window, in window order.
    pub fn suppliers(
        &self,
        feature: &Feature,
        windows: &[TimeWindow],
    ) -> Result<Vec<PoolOfPairsSupplier<f64, R>>, PoolCreationError> {
        let project_id = self.declaration.project_id;
        let wrap = |err: PoolError| PoolCreationError::new(project_id, feature.clone(), err);

        let climatology: Option<SeriesRetriever<f64>> = if self.needs_climatology() {
            let whole_record = self
                .factory
                .left_retriever(feature, None)
                .map_err(|e| wrap(e.into()))?;
            Some(Arc::new(CachingRetriever::new(whole_record)))
        } else {
            None
        };

        let mut suppliers = Vec::with_capacity(windows.len());
        for window in windows {
            let metadata = PoolMetadata::new(self.evaluation.clone(), feature.clone())
                .with_time_window(*window)
                .with_time_scale(self.declaration.time_scale);

            let right = self
                .factory
                .right_retriever(feature, window)
                .map_err(|e| wrap(e.into()))?;

            let mut builder = PoolOfPairsSupplier::builder()
                .project_id(project_id)
                .metadata(metadata.clone())
                .right(right)
                .left_upscaler(Arc::new(DoubleUpscaler::new()))
                .right_upscaler(Arc::clone(&self.right_upscaler))
                .pairer(Arc::clone(&self.pairer))
                .desired_time_scale(self.declaration.time_scale)
                .left_offset(self.declaration.left.time_shift())
                .right_offset(self.declaration.right.time_shift());

            builder = match &climatology {
                Some(climatology) => builder.climatology(Arc::clone(climatology)),
                None => builder.left(
                    self.factory
                        .left_retriever(feature, Some(window))
                        .map_err(|e| wrap(e.into()))?,
                ),
            };

            let baseline = self
                .factory
                .baseline_retriever(feature, window)
                .map_err(|e| wrap(e.into()))?;
            if let Some(retriever) = baseline {
                let offset = self
                    .declaration
                    .baseline_dataset()
                    .map(|d| d.time_shift())
                    .unwrap_or_else(chrono::Duration::zero);
                builder = builder
                    .baseline(BaselineSource::Retrieved(retriever))
                    .baseline_offset(offset)
                    .baseline_metadata(metadata.as_baseline());
            } else if let Some(generator) = &self.generated_baseline {
                builder = builder
                    .baseline(BaselineSource::Generated(Arc::clone(generator)))
                    .baseline_metadata(metadata.as_baseline());
            }

            suppliers.push(builder.build().map_err(|msg| wrap(PoolError::data_access(msg)))?);
        }

        debug!(
            feature = %feature,
            windows = windows.len(),
            climatology = climatology.is_some(),
            "Created pool suppliers"
        );
        Ok(suppliers)
    }
}
