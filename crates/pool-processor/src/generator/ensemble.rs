use super::PoolsGenerator;
use crate::pairing::PairerByExactTime;
use crate::upscale::EnsembleUpscaler;
use retrieval::RetrieverFactory;
use std::sync::Arc;
use verify_common::{Ensemble, EvaluationDeclaration};

/// Pools of observations paired with ensemble forecasts.
pub type EnsemblePoolGenerator = PoolsGenerator<Ensemble>;

impl PoolsGenerator<Ensemble> {
    /// Generated baselines are single-valued, so an ensemble evaluation only
    /// takes a baseline read from a dataset.
    pub fn ensemble(
        declaration: Arc<EvaluationDeclaration>,
        factory: Arc<dyn RetrieverFactory<f64, Ensemble>>,
    ) -> Self {
        Self::new(
            declaration,
            factory,
            Arc::new(EnsembleUpscaler::new()),
            Arc::new(PairerByExactTime::ensemble()),
            None,
        )
    }
}
