use super::PoolsGenerator;
use crate::pairing::PairerByExactTime;
use crate::persistence::{BaselineGenerator, PersistenceGenerator};
use crate::upscale::DoubleUpscaler;
use retrieval::RetrieverFactory;
use std::sync::Arc;
use verify_common::{EvaluationDeclaration, GeneratedBaseline};

/// Pools of single-valued pairs.
pub type SingleValuedPoolGenerator = PoolsGenerator<f64>;

impl PoolsGenerator<f64> {
    pub fn single_valued(
        declaration: Arc<EvaluationDeclaration>,
        factory: Arc<dyn RetrieverFactory<f64, f64>>,
    ) -> Self {
        let generated = declaration.generated_baseline().map(|baseline| match baseline {
            GeneratedBaseline::Persistence { order } => {
                Arc::new(PersistenceGenerator::single_valued(order)) as Arc<dyn BaselineGenerator<f64, f64>>
            }
        });
        Self::new(
            declaration,
            factory,
            Arc::new(DoubleUpscaler::new()),
            Arc::new(PairerByExactTime::single_valued()),
            generated,
        )
    }
}
