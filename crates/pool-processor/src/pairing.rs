//! Exact-time pairing of left and right time series.

use crate::error::PairingError;
use std::sync::Arc;
use tracing::trace;
use verify_common::{Ensemble, Event, Pair, TimeSeries, TimeSeriesBuilder};

/// Admissibility test for one side of a pair.
pub type Admissible<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Pairs a left series with a right series.
pub trait TimeSeriesPairer<L, R>: Send + Sync {
    fn pair(
        &self,
        left: &TimeSeries<L>,
        right: &TimeSeries<R>,
    ) -> Result<TimeSeries<Pair<L, R>>, PairingError>;
}

/// Pairs events that share a valid time exactly, keeping a pair only when
/// both of its values are admissible.
///
/// The paired series takes its reference times, feature, unit and variable
/// from the right series.
pub struct PairerByExactTime<L, R> {
    left_admissible: Admissible<L>,
    right_admissible: Admissible<R>,
}

impl<L, R> Clone for PairerByExactTime<L, R> {
    fn clone(&self) -> Self {
        Self {
            left_admissible: Arc::clone(&self.left_admissible),
            right_admissible: Arc::clone(&self.right_admissible),
        }
    }
}

impl<L, R> PairerByExactTime<L, R> {
    pub fn new(left_admissible: Admissible<L>, right_admissible: Admissible<R>) -> Self {
        Self {
            left_admissible,
            right_admissible,
        }
    }
}

fn finite(value: &f64) -> bool {
    value.is_finite()
}

/// Lift a predicate on member values to a predicate that every member of an
/// ensemble must satisfy.
pub fn all_members(member: Admissible<f64>) -> Admissible<Ensemble> {
    Arc::new(move |ensemble: &Ensemble| {
        !ensemble.is_empty() && ensemble.members().iter().all(|m| member(m))
    })
}

impl PairerByExactTime<f64, f64> {
    /// Pairs of finite values.
    pub fn single_valued() -> Self {
        Self::new(Arc::new(finite), Arc::new(finite))
    }
}

impl PairerByExactTime<f64, Ensemble> {
    /// Finite observations paired with ensembles whose members are all finite.
    pub fn ensemble() -> Self {
        Self::new(Arc::new(finite), all_members(Arc::new(finite)))
    }
}

impl<L, R> TimeSeriesPairer<L, R> for PairerByExactTime<L, R>
where
    L: Clone + Send + Sync,
    R: Clone + Send + Sync,
{
    fn pair(
        &self,
        left: &TimeSeries<L>,
        right: &TimeSeries<R>,
    ) -> Result<TimeSeries<Pair<L, R>>, PairingError> {
        if let (Some(left_scale), Some(right_scale)) = (left.time_scale(), right.time_scale()) {
            if left_scale != right_scale
                && !(left_scale.is_instantaneous() && right_scale.is_instantaneous())
            {
                return Err(PairingError::MismatchedTimeScales {
                    left: left_scale.to_string(),
                    right: right_scale.to_string(),
                });
            }
        }

        let mut metadata = right.metadata().clone();
        if metadata.time_scale.is_none() {
            metadata.time_scale = left.time_scale();
        }

        let mut builder = TimeSeriesBuilder::new(metadata);
        let mut inadmissible = 0usize;
        for right_event in right.events() {
            let Some(left_event) = left.event_at(right_event.valid_time) else {
                continue;
            };
            if !(self.left_admissible)(&left_event.value) || !(self.right_admissible)(&right_event.value) {
                inadmissible += 1;
                continue;
            }
            // Right events are unique by valid time.
            let _ = builder.add_event(Event::new(
                right_event.valid_time,
                Pair::new(left_event.value.clone(), right_event.value.clone()),
            ));
        }

        trace!(
            feature = %right.metadata().feature,
            pairs = builder.len(),
            inadmissible,
            "Paired time series"
        );

        Ok(builder.build())
    }
}
