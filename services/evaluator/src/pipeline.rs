//! The evaluation pipeline: pools for every feature and time window, each
//! assembled and processed on a blocking task.

use chrono::Utc;
use futures::future::join_all;
use pool_processor::{EnsemblePoolGenerator, PoolOfPairsSupplier, PoolsGenerator, SingleValuedPoolGenerator};
use retrieval::{EnsembleRetrieverFactory, SingleValuedRetrieverFactory, TimeSeriesSource, UnitMapper};
use statistics::{
    get_metrics_and_thresholds_for_processing, BasicMetricLibrary, EnsembleStatisticsProcessor,
    ExecutorConfig, MetricLibrary, SingleValuedStatisticsProcessor, StatisticsProcessor,
    StatisticsStore, WorkerPools,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use verify_common::{DataType, EvaluationDeclaration, Feature, Pair, TimeSeries, TimeWindow};

use crate::config::EvaluatorConfig;
use crate::error::{EvaluatorError, Result};
use crate::output::{EvaluationOutput, PoolStatistics};
use crate::project::{load_declaration, load_source};

/// Runs one evaluation against one source.
pub struct Evaluator {
    declaration: Arc<EvaluationDeclaration>,
    source: Arc<dyn TimeSeriesSource>,
    pools: WorkerPools,
    library: Arc<dyn MetricLibrary>,
}

impl Evaluator {
    pub fn new(
        declaration: EvaluationDeclaration,
        source: Arc<dyn TimeSeriesSource>,
        executor: &ExecutorConfig,
    ) -> Result<Self> {
        Ok(Self {
            declaration: Arc::new(declaration),
            source,
            pools: WorkerPools::new(executor)?,
            library: Arc::new(BasicMetricLibrary),
        })
    }

    pub fn with_library(mut self, library: Arc<dyn MetricLibrary>) -> Self {
        self.library = library;
        self
    }

    pub fn declaration(&self) -> &EvaluationDeclaration {
        &self.declaration
    }

    pub async fn run(&self) -> Result<EvaluationOutput> {
        let started = std::time::Instant::now();
        let declaration = &self.declaration;
        let windows = declaration.time_windows()?;
        let groups = get_metrics_and_thresholds_for_processing(declaration, &BTreeMap::new())?;
        let units = Arc::new(UnitMapper::new(self.source.as_ref(), declaration.unit.clone())?);

        info!(
            project_id = declaration.project_id,
            features = declaration.features.len(),
            windows = windows.len(),
            metric_groups = groups.len(),
            data_type = ?declaration.right.data_type,
            "Starting evaluation"
        );

        let (evaluation_id, pools) = match declaration.right.data_type {
            DataType::SingleValuedForecasts => {
                let factory = SingleValuedRetrieverFactory::new(
                    Arc::clone(&self.source),
                    Arc::clone(declaration),
                    units,
                );
                let generator =
                    SingleValuedPoolGenerator::single_valued(Arc::clone(declaration), Arc::new(factory));
                let processors = groups
                    .into_iter()
                    .map(|group| SingleValuedStatisticsProcessor::new(group, self.pools.clone(), Arc::clone(&self.library)))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let evaluation_id = generator.evaluation().evaluation_id;
                (evaluation_id, evaluate(&generator, processors, &declaration.features, &windows).await?)
            }
            DataType::EnsembleForecasts => {
                let factory = EnsembleRetrieverFactory::new(
                    Arc::clone(&self.source),
                    Arc::clone(declaration),
                    units,
                );
                let generator = EnsemblePoolGenerator::ensemble(Arc::clone(declaration), Arc::new(factory));
                let processors = groups
                    .into_iter()
                    .map(|group| EnsembleStatisticsProcessor::new(group, self.pools.clone(), Arc::clone(&self.library)))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let evaluation_id = generator.evaluation().evaluation_id;
                (evaluation_id, evaluate(&generator, processors, &declaration.features, &windows).await?)
            }
            DataType::Observations => {
                return Err(EvaluatorError::InvalidProject("right data must be forecasts".to_string()));
            }
        };

        let output = EvaluationOutput {
            evaluation_id,
            project_id: declaration.project_id,
            measurement_unit: declaration.unit.clone(),
            completed_at: Utc::now(),
            pools,
        };

        info!(
            %evaluation_id,
            pools = output.pools.len(),
            statistics = output.statistic_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation complete"
        );
        Ok(output)
    }
}

/// Load the project and data named by the configuration and evaluate them.
pub async fn run_project(config: &EvaluatorConfig) -> Result<EvaluationOutput> {
    config.validate()?;
    let declaration = load_declaration(config.project_path()?)?;
    let source = load_source(config.data_path()?)?;
    Evaluator::new(declaration, Arc::new(source), &config.executor)?
        .run()
        .await
}

/// Assemble and process every pool, one blocking task per pool. Results keep
/// feature order, then time-window order.
async fn evaluate<R, P>(
    generator: &PoolsGenerator<R>,
    processors: Vec<P>,
    features: &[Feature],
    windows: &[TimeWindow],
) -> Result<Vec<PoolStatistics>>
where
    R: Clone + Send + Sync + 'static,
    P: StatisticsProcessor<TimeSeries<Pair<f64, R>>> + 'static,
{
    let processors = Arc::new(processors);
    let mut tasks = Vec::with_capacity(features.len() * windows.len());
    for feature in features {
        for supplier in generator.suppliers(feature, windows)? {
            let processors = Arc::clone(&processors);
            tasks.push(tokio::task::spawn_blocking(move || {
                evaluate_pool(&supplier, processors.as_slice())
            }));
        }
    }

    let mut pools = Vec::with_capacity(tasks.len());
    for joined in join_all(tasks).await {
        pools.push(joined??);
    }
    Ok(pools)
}

fn evaluate_pool<R, P>(supplier: &PoolOfPairsSupplier<f64, R>, processors: &[P]) -> Result<PoolStatistics>
where
    R: Clone + Send + Sync + 'static,
    P: StatisticsProcessor<TimeSeries<Pair<f64, R>>>,
{
    let pool = supplier.get()?;
    let mut statistics = StatisticsStore::new();
    for processor in processors {
        statistics = statistics.combine(processor.apply(pool.as_ref())?);
    }

    metrics::counter!("pools_evaluated_total").increment(1);
    debug!(
        feature = %supplier.metadata().feature,
        series = pool.len(),
        statistics = statistics.len(),
        "Evaluated pool"
    );

    Ok(PoolStatistics {
        feature: supplier.metadata().feature.clone(),
        time_window: supplier.time_window(),
        statistics,
    })
}
