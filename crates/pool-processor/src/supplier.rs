//! Lazily assembled, memoized pools of paired time series.
//!
//! A [`PoolOfPairsSupplier`] holds everything needed to build the pool for
//! one feature and one time window. Nothing is read until the first call to
//! [`PoolOfPairsSupplier::get`]; the assembled pool is then shared by every
//! later caller.

use crate::error::{PoolCreationError, PoolError, RescalingError, Result};
use crate::pairing::TimeSeriesPairer;
use crate::persistence::BaselineGenerator;
use crate::upscale::{is_change_of_scale_required, log_validation_events, TimeSeriesUpscaler};
use chrono::Duration;
use once_cell::sync::OnceCell;
use retrieval::SeriesRetriever;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use verify_common::{
    Climatology, Instant, Pair, Pool, PoolMetadata, TimeScale, TimeSeries, TimeWindow,
};

/// A pool of paired time series.
pub type PairedPool<L, R> = Pool<TimeSeries<Pair<L, R>>>;

type Upscaler<T> = Arc<dyn TimeSeriesUpscaler<T>>;

/// Where baseline data comes from.
pub enum BaselineSource<L, R> {
    /// Read from a declared baseline dataset.
    Retrieved(SeriesRetriever<R>),
    /// Synthesized from left data, using each right series as the template.
    Generated(Arc<dyn BaselineGenerator<L, R>>),
}

impl<L, R> Clone for BaselineSource<L, R> {
    fn clone(&self) -> Self {
        match self {
            Self::Retrieved(retriever) => Self::Retrieved(Arc::clone(retriever)),
            Self::Generated(generator) => Self::Generated(Arc::clone(generator)),
        }
    }
}

/// Builds the pool for one feature and time window exactly once.
pub struct PoolOfPairsSupplier<L: 'static, R: 'static> {
    project_id: i64,
    metadata: PoolMetadata,
    baseline_metadata: Option<PoolMetadata>,
    left: Option<SeriesRetriever<L>>,
    climatology: Option<SeriesRetriever<L>>,
    right: SeriesRetriever<R>,
    baseline: Option<BaselineSource<L, R>>,
    left_upscaler: Option<Upscaler<L>>,
    right_upscaler: Option<Upscaler<R>>,
    pairer: Arc<dyn TimeSeriesPairer<L, R>>,
    desired_time_scale: Option<TimeScale>,
    left_offset: Duration,
    right_offset: Duration,
    baseline_offset: Duration,
    pool: OnceCell<Arc<PairedPool<L, R>>>,
    assemblies: AtomicU64,
}

impl<L, R> PoolOfPairsSupplier<L, R>
where
    L: Clone + Into<f64> + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn builder() -> PoolOfPairsSupplierBuilder<L, R> {
        PoolOfPairsSupplierBuilder::default()
    }

    pub fn metadata(&self) -> &PoolMetadata {
        &self.metadata
    }

    pub fn time_window(&self) -> TimeWindow {
        self.metadata.time_window.unwrap_or_default()
    }

    /// Whether the pool has been assembled.
    pub fn is_assembled(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Number of successful assemblies; never more than one.
    pub fn assemblies(&self) -> u64 {
        self.assemblies.load(Ordering::Relaxed)
    }

    /// The pool, assembling it on first use.
    ///
    /// Concurrent first callers block while one of them assembles the pool. A
    /// failed assembly is not memoized.
    pub fn get(&self) -> std::result::Result<Arc<PairedPool<L, R>>, PoolCreationError> {
        self.pool
            .get_or_try_init(|| -> std::result::Result<_, PoolCreationError> {
                let pool = self.create_pool().map_err(|source| {
                    PoolCreationError::new(self.project_id, self.metadata.feature.clone(), source)
                })?;
                self.assemblies.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("pool_creations_total").increment(1);
                Ok(Arc::new(pool))
            })
            .map(Arc::clone)
    }

    fn create_pool(&self) -> Result<PairedPool<L, R>> {
        let window = self.time_window();
        let feature = &self.metadata.feature;

        let history = match &self.climatology {
            Some(climatology) => Some(self.read(climatology, self.left_offset)?),
            None => None,
        };
        let left = match (&self.left, &history) {
            (Some(left), _) => self.read(left, self.left_offset)?,
            (None, Some(history)) => history.clone(),
            (None, None) => {
                return Err(PoolError::data_access("no left data source was supplied"));
            }
        };
        let right = self.read(&self.right, self.right_offset)?;

        let mut main = Vec::new();
        let mut paired_right = Vec::new();
        for left_series in &left {
            for right_series in &right {
                let (upscaled_left, upscaled_right) = self.rescale_both(left_series, right_series)?;
                let paired = self.pairer.pair(&upscaled_left, &upscaled_right)?;
                main.push(paired.filter_by_time_window(&window));
                paired_right.push((upscaled_left, upscaled_right));
            }
        }

        let history_at_scale = match &history {
            Some(history) => Some(self.history_at_desired_scale(history)?),
            None => None,
        };

        let baseline = match &self.baseline {
            None => None,
            Some(BaselineSource::Retrieved(retriever)) => {
                let baseline = self.read(retriever, self.baseline_offset)?;
                let mut paired = Vec::new();
                for left_series in &left {
                    for baseline_series in &baseline {
                        let (upscaled_left, upscaled_baseline) =
                            self.rescale_both(left_series, baseline_series)?;
                        let pairs = self.pairer.pair(&upscaled_left, &upscaled_baseline)?;
                        paired.push(pairs.filter_by_time_window(&window));
                    }
                }
                Some(paired)
            }
            Some(BaselineSource::Generated(generator)) => {
                let source: Vec<TimeSeries<L>> = match &history_at_scale {
                    Some(history) => history.clone(),
                    None => left.clone(),
                };
                let mut paired = Vec::new();
                for (upscaled_left, template) in &paired_right {
                    for source_series in &source {
                        let generated = generator.generate(source_series, template);
                        let pairs = self.pairer.pair(upscaled_left, &generated)?;
                        paired.push(pairs.filter_by_time_window(&window));
                    }
                }
                Some(paired)
            }
        };

        let mut builder = Pool::builder()
            .add_data(main)
            .set_metadata(self.metadata.clone());

        if let Some(baseline) = baseline {
            let baseline_metadata = self
                .baseline_metadata
                .clone()
                .unwrap_or_else(|| self.metadata.as_baseline());
            builder = builder
                .add_baseline_data(baseline)
                .set_baseline_metadata(baseline_metadata);
        }

        if let Some(history) = &history_at_scale {
            let mut climatology = Climatology::new();
            climatology.add(
                feature.clone(),
                history
                    .iter()
                    .flat_map(|s| s.events().iter().map(|e| e.value.clone().into())),
            );
            builder = builder.set_climatology(climatology);
        }

        let pool = builder.build()?;
        info!(
            feature = %feature,
            time_window = %window,
            series = pool.len(),
            pairs = pool.event_count(),
            baseline = pool.has_baseline(),
            "Created pool"
        );
        Ok(pool)
    }

    fn read<T: 'static + Clone>(
        &self,
        retriever: &SeriesRetriever<T>,
        offset: Duration,
    ) -> Result<Vec<TimeSeries<T>>> {
        let series = retriever
            .get()?
            .map(|series| series.map(|s| s.with_valid_time_offset(offset)))
            .collect::<retrieval::Result<Vec<_>>>()?;
        debug!(
            retriever = retriever.name(),
            feature = %self.metadata.feature,
            series = series.len(),
            "Retrieved series"
        );
        Ok(series)
    }

    /// Upscale right first, aligned to left valid times when left is already
    /// at the desired scale, then left, aligned to the upscaled right times.
    fn rescale_both(
        &self,
        left: &TimeSeries<L>,
        right: &TimeSeries<R>,
    ) -> Result<(TimeSeries<L>, TimeSeries<R>)> {
        let Some(desired) = self.desired_time_scale else {
            return Ok((left.clone(), right.clone()));
        };

        let right_ends_at = if is_change_of_scale_required(left.time_scale(), desired) {
            BTreeSet::new()
        } else {
            left.valid_times()
        };
        let right = rescale("right", self.right_upscaler.as_ref(), right, desired, &right_ends_at)?;

        let left = rescale(
            "left",
            self.left_upscaler.as_ref(),
            left,
            desired,
            &right.valid_times(),
        )?;

        Ok((left, right))
    }

    fn history_at_desired_scale(&self, history: &[TimeSeries<L>]) -> Result<Vec<TimeSeries<L>>> {
        let Some(desired) = self.desired_time_scale else {
            return Ok(history.to_vec());
        };
        history
            .iter()
            .map(|series| {
                rescale(
                    "climatology",
                    self.left_upscaler.as_ref(),
                    series,
                    desired,
                    &BTreeSet::new(),
                )
            })
            .collect()
    }
}

fn rescale<T: Clone>(
    side: &'static str,
    upscaler: Option<&Upscaler<T>>,
    series: &TimeSeries<T>,
    desired: TimeScale,
    ends_at: &BTreeSet<Instant>,
) -> Result<TimeSeries<T>> {
    if series.is_empty() || !is_change_of_scale_required(series.time_scale(), desired) {
        return Ok(series.clone());
    }
    let Some(upscaler) = upscaler else {
        return Err(RescalingError::NoUpscaler {
            side,
            desired: desired.to_string(),
        }
        .into());
    };
    let rescaled = upscaler.upscale(series, desired, ends_at)?;
    log_validation_events(side, &rescaled.validation_events);
    Ok(rescaled.series)
}

/// Incremental construction of a [`PoolOfPairsSupplier`].
pub struct PoolOfPairsSupplierBuilder<L: 'static, R: 'static> {
    project_id: i64,
    metadata: Option<PoolMetadata>,
    baseline_metadata: Option<PoolMetadata>,
    left: Option<SeriesRetriever<L>>,
    climatology: Option<SeriesRetriever<L>>,
    right: Option<SeriesRetriever<R>>,
    baseline: Option<BaselineSource<L, R>>,
    left_upscaler: Option<Upscaler<L>>,
    right_upscaler: Option<Upscaler<R>>,
    pairer: Option<Arc<dyn TimeSeriesPairer<L, R>>>,
    desired_time_scale: Option<TimeScale>,
    left_offset: Duration,
    right_offset: Duration,
    baseline_offset: Duration,
}

impl<L: 'static, R: 'static> Default for PoolOfPairsSupplierBuilder<L, R> {
    fn default() -> Self {
        Self {
            project_id: 0,
            metadata: None,
            baseline_metadata: None,
            left: None,
            climatology: None,
            right: None,
            baseline: None,
            left_upscaler: None,
            right_upscaler: None,
            pairer: None,
            desired_time_scale: None,
            left_offset: Duration::zero(),
            right_offset: Duration::zero(),
            baseline_offset: Duration::zero(),
        }
    }
}

impl<L: 'static, R: 'static> PoolOfPairsSupplierBuilder<L, R> {
    pub fn project_id(mut self, project_id: i64) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn metadata(mut self, metadata: PoolMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn baseline_metadata(mut self, metadata: PoolMetadata) -> Self {
        self.baseline_metadata = Some(metadata);
        self
    }

    /// Left data for this window only.
    pub fn left(mut self, retriever: SeriesRetriever<L>) -> Self {
        self.left = Some(retriever);
        self
    }

    /// Left data for the whole period of record, shared across windows. Used
    /// for climatology, for generated baselines and, when no per-window left
    /// retriever is set, as the left data itself.
    pub fn climatology(mut self, retriever: SeriesRetriever<L>) -> Self {
        self.climatology = Some(retriever);
        self
    }

    pub fn right(mut self, retriever: SeriesRetriever<R>) -> Self {
        self.right = Some(retriever);
        self
    }

    pub fn baseline(mut self, baseline: BaselineSource<L, R>) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn left_upscaler(mut self, upscaler: Upscaler<L>) -> Self {
        self.left_upscaler = Some(upscaler);
        self
    }

    pub fn right_upscaler(mut self, upscaler: Upscaler<R>) -> Self {
        self.right_upscaler = Some(upscaler);
        self
    }

    pub fn pairer(mut self, pairer: Arc<dyn TimeSeriesPairer<L, R>>) -> Self {
        self.pairer = Some(pairer);
        self
    }

    pub fn desired_time_scale(mut self, time_scale: Option<TimeScale>) -> Self {
        self.desired_time_scale = time_scale;
        self
    }

    pub fn left_offset(mut self, offset: Duration) -> Self {
        self.left_offset = offset;
        self
    }

    pub fn right_offset(mut self, offset: Duration) -> Self {
        self.right_offset = offset;
        self
    }

    pub fn baseline_offset(mut self, offset: Duration) -> Self {
        self.baseline_offset = offset;
        self
    }

    /// Build the supplier. Requires metadata, right data and a pairer.
    pub fn build(self) -> std::result::Result<PoolOfPairsSupplier<L, R>, String> {
        let metadata = self.metadata.ok_or("pool metadata is required")?;
        let right = self.right.ok_or("a right retriever is required")?;
        let pairer = self.pairer.ok_or("a pairer is required")?;
        if self.left.is_none() && self.climatology.is_none() {
            return Err("a left or climatology retriever is required".to_string());
        }

        Ok(PoolOfPairsSupplier {
            project_id: self.project_id,
            metadata,
            baseline_metadata: self.baseline_metadata,
            left: self.left,
            climatology: self.climatology,
            right,
            baseline: self.baseline,
            left_upscaler: self.left_upscaler,
            right_upscaler: self.right_upscaler,
            pairer,
            desired_time_scale: self.desired_time_scale,
            left_offset: self.left_offset,
            right_offset: self.right_offset,
            baseline_offset: self.baseline_offset,
            pool: OnceCell::new(),
            assemblies: AtomicU64::new(0),
        })
    }
}
