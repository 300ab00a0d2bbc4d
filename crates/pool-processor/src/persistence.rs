//! Baselines generated from left data rather than read from a source.

use crate::pairing::Admissible;
use std::sync::Arc;
use tracing::trace;
use verify_common::{Event, Instant, TimeSeries, TimeSeriesBuilder};

/// Synthesizes a baseline series shaped like a template, using a source series.
pub trait BaselineGenerator<L, R>: Send + Sync {
    fn generate(&self, source: &TimeSeries<L>, template: &TimeSeries<R>) -> TimeSeries<R>;
}

/// Persistence: the value observed `order` steps back is the forecast.
///
/// For a template with a reference time, the `order`-th most recent
/// admissible source value at or before the reference time is repeated at
/// every template valid time. Without a reference time, each valid time gets
/// the `order`-th most recent admissible source value strictly before it.
pub struct PersistenceGenerator<L, R> {
    order: usize,
    admissible: Admissible<L>,
    convert: Arc<dyn Fn(&L) -> R + Send + Sync>,
}

impl PersistenceGenerator<f64, f64> {
    pub fn single_valued(order: usize) -> Self {
        Self::new(order, Arc::new(|v: &f64| v.is_finite()), Arc::new(|v: &f64| *v))
    }
}

impl<L, R> PersistenceGenerator<L, R> {
    /// An `order` of zero is treated as one.
    pub fn new(
        order: usize,
        admissible: Admissible<L>,
        convert: Arc<dyn Fn(&L) -> R + Send + Sync>,
    ) -> Self {
        Self {
            order: order.max(1),
            admissible,
            convert,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// The `order`-th most recent admissible event among `events[..end]`.
    fn nth_most_recent<'a>(&self, events: &'a [Event<L>], end: usize) -> Option<&'a Event<L>> {
        events[..end]
            .iter()
            .rev()
            .filter(|e| (self.admissible)(&e.value))
            .nth(self.order - 1)
    }
}

impl<L, R> BaselineGenerator<L, R> for PersistenceGenerator<L, R>
where
    L: Clone + Send + Sync,
    R: Clone + Send + Sync,
{
    fn generate(&self, source: &TimeSeries<L>, template: &TimeSeries<R>) -> TimeSeries<R> {
        let mut builder = TimeSeriesBuilder::new(template.metadata().clone());
        if template.is_empty() {
            return builder.build();
        }

        let events = source.events();
        let at_or_before = |time: Instant| events.partition_point(|e| e.valid_time <= time);
        let strictly_before = |time: Instant| events.partition_point(|e| e.valid_time < time);

        match template.metadata().lead_reference_time() {
            Some(reference_time) => {
                let Some(persisted) = self.nth_most_recent(events, at_or_before(reference_time))
                else {
                    trace!(
                        reference_time = %reference_time,
                        source_events = events.len(),
                        "No persistence value for reference time"
                    );
                    return builder.build();
                };
                let value = (self.convert)(&persisted.value);
                for event in template.events() {
                    let _ = builder.add_event(Event::new(event.valid_time, value.clone()));
                }
            }
            None => {
                for event in template.events() {
                    if let Some(persisted) =
                        self.nth_most_recent(events, strictly_before(event.valid_time))
                    {
                        let _ = builder.add_event(Event::new(
                            event.valid_time,
                            (self.convert)(&persisted.value),
                        ));
                    }
                }
            }
        }

        builder.build()
    }
}
