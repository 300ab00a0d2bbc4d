//! Pool assembly from in-memory data through the pool generators.

use pool_processor::{
    EnsemblePoolGenerator, PairerByExactTime, PoolError, PoolOfPairsSupplier, RescalingError,
    SingleValuedPoolGenerator,
};
use retrieval::{
    Capabilities, EnsembleRetrieverFactory, InMemoryData, InMemorySource, RawEvent, RawTimeSeries,
    RawValue, Retriever, SeriesIter, SingleValuedRetrieverFactory, UnitMapper,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_utils::{
    create_hourly_observations, create_single_valued_forecast, ensemble_declaration, feature,
    forecast_metadata, names, pool_metadata, series_of, single_valued_declaration, t,
};
use verify_common::{
    BaselineDeclaration, EvaluationDeclaration, GeneratedBaseline, LeadWindowDeclaration, Pair,
    TimeScale, TimeScaleFunction, TimeSeries, TimeWindow,
};

fn raw(id: i64, variable: &str, reference_hour: Option<u32>, values: Vec<(u32, RawValue)>) -> RawTimeSeries {
    RawTimeSeries {
        id,
        variable: variable.to_string(),
        feature: names::FEATURE.to_string(),
        reference_time: reference_hour.map(t),
        time_scale: None,
        unit: names::UNIT.to_string(),
        unit_id: None,
        member_labels: None,
        events: values
            .into_iter()
            .map(|(hour, value)| RawEvent {
                valid_time: t(hour),
                value,
            })
            .collect(),
    }
}

fn single(values: &[(u32, f64)]) -> Vec<(u32, RawValue)> {
    values.iter().map(|(h, v)| (*h, RawValue::Single(*v))).collect()
}

fn hourly_observations(hours: std::ops::RangeInclusive<u32>) -> RawTimeSeries {
    let values: Vec<(u32, f64)> = hours.map(|h| (h, f64::from(h))).collect();
    raw(1, names::OBSERVED, None, single(&values))
}

fn single_valued_generator(
    declaration: EvaluationDeclaration,
    series: Vec<RawTimeSeries>,
) -> SingleValuedPoolGenerator {
    let source = Arc::new(InMemorySource::new(InMemoryData {
        series,
        unit_conversions: Vec::new(),
    }));
    let declaration = Arc::new(declaration);
    let units = Arc::new(UnitMapper::new(source.as_ref(), names::UNIT).unwrap());
    let factory = SingleValuedRetrieverFactory::new(source, Arc::clone(&declaration), units);
    SingleValuedPoolGenerator::single_valued(declaration, Arc::new(factory))
}

fn pairs_of(series: &TimeSeries<Pair<f64, f64>>) -> Vec<(f64, f64)> {
    series.events().iter().map(|e| (e.value.left, e.value.right)).collect()
}

#[test]
fn test_regression_pairs_from_in_memory_source() {
    let generator = single_valued_generator(
        single_valued_declaration(),
        vec![
            raw(1, names::OBSERVED, None, single(&[(6, 1.0), (12, 2.0), (18, 3.0)])),
            raw(2, names::SIMULATED, Some(0), single(&[(6, 6.0), (12, 7.0), (18, 8.0), (20, 9.0)])),
        ],
    );

    let suppliers = generator
        .suppliers(&feature(), &[TimeWindow::unbounded()])
        .unwrap();
    assert_eq!(suppliers.len(), 1);

    let pool = suppliers[0].get().unwrap();
    assert_eq!(pool.len(), 1);
    assert_eq!(pairs_of(&pool.get()[0]), vec![(1.0, 6.0), (2.0, 7.0), (3.0, 8.0)]);
    assert!(!pool.has_baseline());
    assert!(pool.climatology().is_none());
    assert_eq!(pool.metadata().time_window, Some(TimeWindow::unbounded()));
}

#[test]
fn test_lead_windows_are_right_open() {
    let declaration = EvaluationDeclaration {
        lead_windows: Some(LeadWindowDeclaration {
            minimum_hours: 0,
            maximum_hours: 6,
            width_hours: 3,
            frequency_hours: None,
        }),
        ..single_valued_declaration()
    };
    let windows = declaration.time_windows().unwrap();
    let forecast: Vec<(u32, f64)> = (1..=6).map(|h| (h, 10.0)).collect();
    let generator = single_valued_generator(
        declaration,
        vec![hourly_observations(1..=6), raw(2, names::SIMULATED, Some(0), single(&forecast))],
    );

    let suppliers = generator.suppliers(&feature(), &windows).unwrap();
    let counts: Vec<usize> = suppliers
        .iter()
        .map(|s| s.get().unwrap().event_count())
        .collect();
    // Leads 1h and 2h, then 3h to 5h
    assert_eq!(counts, vec![2, 3]);
}

#[test]
fn test_generated_persistence_baseline_and_climatology() {
    let declaration = EvaluationDeclaration {
        baseline: Some(BaselineDeclaration::Generated(GeneratedBaseline::Persistence { order: 1 })),
        ..single_valued_declaration()
    };
    let generator = single_valued_generator(
        declaration,
        vec![
            hourly_observations(1..=18),
            raw(2, names::SIMULATED, Some(6), single(&[(7, 10.0), (8, 10.0), (9, 10.0)])),
        ],
    );
    assert!(generator.needs_climatology());

    let pool = generator.suppliers(&feature(), &[TimeWindow::unbounded()]).unwrap()[0]
        .get()
        .unwrap();

    assert_eq!(pairs_of(&pool.get()[0]), vec![(7.0, 10.0), (8.0, 10.0), (9.0, 10.0)]);

    let baseline = pool.baseline_data().unwrap();
    assert!(baseline.metadata().is_baseline);
    assert_eq!(pairs_of(&baseline.get()[0]), vec![(7.0, 6.0), (8.0, 6.0), (9.0, 6.0)]);

    let climatology = pool.climatology().unwrap();
    assert_eq!(climatology.get(&feature()).map(|c| c.len()), Some(18));
}

#[test]
fn test_ensemble_pool() {
    let source = Arc::new(InMemorySource::new(InMemoryData {
        series: vec![
            raw(1, names::OBSERVED, None, single(&[(6, 1.0), (12, 2.0)])),
            raw(
                2,
                names::SIMULATED,
                Some(0),
                vec![
                    (6, RawValue::Members(vec![5.0, 6.0, 7.0])),
                    (12, RawValue::Members(vec![f64::NAN, 6.0, 7.0])),
                ],
            ),
        ],
        unit_conversions: Vec::new(),
    }));
    let declaration = Arc::new(ensemble_declaration());
    let units = Arc::new(UnitMapper::new(source.as_ref(), names::UNIT).unwrap());
    let factory = EnsembleRetrieverFactory::new(source, Arc::clone(&declaration), units);
    let generator = EnsemblePoolGenerator::ensemble(declaration, Arc::new(factory));

    let pool = generator.suppliers(&feature(), &[TimeWindow::unbounded()]).unwrap()[0]
        .get()
        .unwrap();

    // The second ensemble has a missing member and is not paired
    assert_eq!(pool.event_count(), 1);
    let pair = &pool.get()[0].events()[0].value;
    assert_eq!(pair.left, 1.0);
    assert_eq!(pair.right.members(), &[5.0, 6.0, 7.0]);
}

/// Serves fixed series and counts bulk reads.
struct CountingRetriever {
    series: Vec<TimeSeries<f64>>,
    calls: AtomicUsize,
}

impl CountingRetriever {
    fn new(series: TimeSeries<f64>) -> Arc<Self> {
        Arc::new(Self {
            series: vec![series],
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Retriever<TimeSeries<f64>> for CountingRetriever {
    fn name(&self) -> &'static str {
        "counting retriever"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BULK_ONLY
    }

    fn get(&self) -> retrieval::Result<SeriesIter<'_, TimeSeries<f64>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        Ok(Box::new(self.series.clone().into_iter().map(Ok)))
    }
}

#[test]
fn test_supplier_assembles_once_under_concurrency() {
    let left = CountingRetriever::new(create_hourly_observations(1, 12));
    let right = CountingRetriever::new(create_single_valued_forecast(0, 6, 1.0));

    let supplier: PoolOfPairsSupplier<f64, f64> = PoolOfPairsSupplier::builder()
        .project_id(1)
        .metadata(pool_metadata(TimeWindow::unbounded()))
        .left(left.clone())
        .right(right.clone())
        .pairer(Arc::new(PairerByExactTime::single_valued()))
        .build()
        .unwrap();
    assert!(!supplier.is_assembled());

    let pools: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| supplier.get().unwrap())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
    assert_eq!(pools[0].event_count(), 6);
    assert_eq!(left.calls(), 1);
    assert_eq!(right.calls(), 1);
    assert_eq!(supplier.assemblies(), 1);
    assert!(supplier.is_assembled());
}

#[test]
fn test_missing_upscaler_fails_and_is_not_memoized() {
    let instantaneous = Some(TimeScale::instantaneous());
    let left = create_hourly_observations(1, 12);
    let left = left.with_metadata(left.metadata().clone().with_time_scale(instantaneous));
    let right = series_of(
        forecast_metadata(t(0)).with_time_scale(instantaneous),
        &[(6, 1.0), (12, 2.0)],
    );
    let six_hour_mean = TimeScale::new(chrono::Duration::hours(6), TimeScaleFunction::Mean).unwrap();

    let supplier: PoolOfPairsSupplier<f64, f64> = PoolOfPairsSupplier::builder()
        .project_id(3)
        .metadata(pool_metadata(TimeWindow::unbounded()))
        .left(CountingRetriever::new(left))
        .right(CountingRetriever::new(right))
        .pairer(Arc::new(PairerByExactTime::single_valued()))
        .desired_time_scale(Some(six_hour_mean))
        .build()
        .unwrap();

    let err = supplier.get().unwrap_err();
    assert_eq!(err.project_id, 3);
    assert_eq!(err.feature, feature());
    assert!(matches!(
        err.source,
        PoolError::Rescaling(RescalingError::NoUpscaler { side: "right", .. })
    ));
    assert!(!supplier.is_assembled());
}

#[test]
fn test_builder_requires_left_data() {
    let result: Result<PoolOfPairsSupplier<f64, f64>, String> = PoolOfPairsSupplier::builder()
        .metadata(pool_metadata(TimeWindow::unbounded()))
        .right(CountingRetriever::new(create_single_valued_forecast(0, 1, 0.0)))
        .pairer(Arc::new(PairerByExactTime::single_valued()))
        .build();
    assert!(result.is_err());
}
