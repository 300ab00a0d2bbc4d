//! End-to-end tests of statistics processing on fixture pools.

use statistics::{
    get_metrics_and_thresholds_for_processing, BasicMetricLibrary, DeclarationError,
    EnsembleStatisticsProcessor, ExecutorConfig, MetricsAndThresholds,
    SingleValuedStatisticsProcessor, StatisticsError, StatisticsProcessor, StatisticsStore,
    ThresholdError, WorkerPools, MISSING_TIME_WINDOW,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use test_utils::{
    assert_approx_eq, create_ensemble_pairs, create_pairs, ensemble_pool, feature,
    pool_without_time_window, regression_pool, single_valued_declaration, single_valued_pool,
    single_valued_pool_with_climatology,
};
use verify_common::{
    MetricConstant, StatisticType, Threshold, ThresholdDeclaration, ThresholdOperator,
    ThresholdOrientation, ThresholdType,
};

fn pools() -> WorkerPools {
    WorkerPools::new(&ExecutorConfig {
        threshold_threads: 2,
        metric_threads: 3,
    })
    .unwrap()
}

fn metrics_and_thresholds(
    metrics: &[MetricConstant],
    thresholds: &[Threshold],
    minimum_sample_size: usize,
) -> MetricsAndThresholds {
    let mut declared: BTreeSet<Threshold> = thresholds.iter().cloned().collect();
    declared.insert(Threshold::all_data());
    MetricsAndThresholds::new(
        metrics.iter().copied().collect(),
        BTreeMap::from([(feature(), declared)]),
        minimum_sample_size,
    )
}

fn single_valued(metrics: &[MetricConstant], thresholds: &[Threshold]) -> SingleValuedStatisticsProcessor {
    SingleValuedStatisticsProcessor::new(
        metrics_and_thresholds(metrics, thresholds, 0),
        pools(),
        Arc::new(BasicMetricLibrary),
    )
    .unwrap()
}

fn score(store: &StatisticsStore, metric: MetricConstant) -> f64 {
    store
        .double_scores()
        .find(|s| s.metric == metric)
        .map(|s| s.value)
        .unwrap_or_else(|| panic!("no {metric} in {store:?}"))
}

#[test]
fn test_regression_errors_are_five() {
    let processor = single_valued(
        &[
            MetricConstant::SampleSize,
            MetricConstant::MeanError,
            MetricConstant::MeanAbsoluteError,
            MetricConstant::RootMeanSquareError,
        ],
        &[],
    );

    let store = processor.apply(&regression_pool()).unwrap();

    assert_eq!(score(&store, MetricConstant::SampleSize), 3.0);
    assert_approx_eq!(score(&store, MetricConstant::MeanError), 5.0, 1e-10);
    assert_approx_eq!(score(&store, MetricConstant::MeanAbsoluteError), 5.0, 1e-10);
    assert_approx_eq!(score(&store, MetricConstant::RootMeanSquareError), 5.0, 1e-10);
}

#[test]
fn test_empty_pool_yields_zero_sample_size_and_missing_scores() {
    let processor = single_valued(&[MetricConstant::SampleSize, MetricConstant::MeanError], &[]);

    let store = processor.apply(&single_valued_pool(vec![], None)).unwrap();

    assert_eq!(score(&store, MetricConstant::SampleSize), 0.0);
    assert!(score(&store, MetricConstant::MeanError).is_nan());
}

#[test]
fn test_pool_without_time_window_is_rejected() {
    let processor = single_valued(&[MetricConstant::MeanError], &[]);

    let error = processor.apply(&pool_without_time_window()).unwrap_err();

    assert_eq!(error, StatisticsError::InvalidInput(MISSING_TIME_WINDOW.to_string()));
    assert_eq!(error.to_string(), "Expected a non-null time window in the pool metadata.");
}

#[test]
fn test_each_threshold_yields_its_own_statistics() {
    let above = Threshold::value(1.5, ThresholdOperator::Greater, ThresholdOrientation::Left);
    let processor = single_valued(&[MetricConstant::SampleSize, MetricConstant::MeanError], &[above.clone()]);

    let store = processor.apply(&regression_pool()).unwrap();

    let sample_sizes: Vec<(Threshold, f64)> = store
        .double_scores()
        .filter(|s| s.metric == MetricConstant::SampleSize)
        .map(|s| (s.metadata.thresholds.clone().unwrap().first, s.value))
        .collect();
    assert_eq!(sample_sizes, vec![(Threshold::all_data(), 3.0), (above, 2.0)]);
}

#[test]
fn test_below_minimum_sample_size_only_sample_size_is_computed() {
    let processor = SingleValuedStatisticsProcessor::new(
        metrics_and_thresholds(&[MetricConstant::SampleSize, MetricConstant::MeanError], &[], 5),
        pools(),
        Arc::new(BasicMetricLibrary),
    )
    .unwrap();

    let store = processor.apply(&regression_pool()).unwrap();

    let metrics: Vec<_> = store.double_scores().map(|s| s.metric).collect();
    assert_eq!(metrics, vec![MetricConstant::SampleSize]);
}

#[test]
fn test_skill_score_uses_baseline() {
    let processor = single_valued(&[MetricConstant::MeanSquareErrorSkillScore], &[]);
    // Main errors are all 1, baseline errors are all 2.
    let main = create_pairs(0, &[(1.0, 2.0), (2.0, 3.0)]);
    let baseline = create_pairs(0, &[(1.0, 3.0), (2.0, 4.0)]);

    let store = processor.apply(&single_valued_pool(vec![main], Some(vec![baseline]))).unwrap();

    assert_approx_eq!(score(&store, MetricConstant::MeanSquareErrorSkillScore), 0.75, 1e-12);
}

#[test]
fn test_probability_threshold_resolved_from_climatology() {
    let median = Threshold::probability(0.5, ThresholdOperator::Greater, ThresholdOrientation::Left).unwrap();
    let processor = single_valued(&[MetricConstant::SampleSize], &[median]);
    let pool = single_valued_pool_with_climatology(
        vec![create_pairs(0, &[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0)])],
        vec![1.0, 2.0, 3.0, 4.0],
    );

    let store = processor.apply(&pool).unwrap();

    let quantile = store
        .double_scores()
        .find(|s| s.metadata.thresholds.as_ref().is_some_and(|t| t.first.is_quantile()))
        .unwrap();
    assert_eq!(quantile.value, 2.0);
    assert_eq!(quantile.metadata.thresholds.as_ref().unwrap().first.values().map(|b| b.lower), Some(2.5));
}

#[test]
fn test_probability_threshold_without_climatology_fails() {
    let median = Threshold::probability(0.5, ThresholdOperator::Greater, ThresholdOrientation::Left).unwrap();
    let processor = single_valued(&[MetricConstant::SampleSize], &[median]);

    assert_eq!(
        processor.apply(&regression_pool()),
        Err(StatisticsError::Threshold(ThresholdError::MissingClimatology { feature: feature() }))
    );
}

#[test]
fn test_threshold_metrics_require_declared_thresholds() {
    let mut declaration = single_valued_declaration();
    declaration.metrics.insert(MetricConstant::ThreatScore);

    assert_eq!(
        get_metrics_and_thresholds_for_processing(&declaration, &BTreeMap::new()),
        Err(DeclarationError::MissingThresholds {
            metric: MetricConstant::ThreatScore
        })
    );

    declaration.thresholds.push(ThresholdDeclaration {
        kind: ThresholdType::Value,
        values: vec![2.5],
        operator: ThresholdOperator::Greater,
        orientation: ThresholdOrientation::Left,
        unit: None,
    });
    let groups = get_metrics_and_thresholds_for_processing(&declaration, &BTreeMap::new()).unwrap();

    let stores: Vec<StatisticsStore> = groups
        .into_iter()
        .map(|group| {
            SingleValuedStatisticsProcessor::new(group, pools(), Arc::new(BasicMetricLibrary))
                .unwrap()
                .apply(&regression_pool())
                .unwrap()
        })
        .collect();
    let combined = stores.into_iter().fold(StatisticsStore::new(), StatisticsStore::combine);

    // Mean error for all data and for > 2.5; threat score for > 2.5 only,
    // with one hit and two false alarms.
    assert_eq!(combined.double_scores().filter(|s| s.metric == MetricConstant::MeanError).count(), 2);
    assert_approx_eq!(score(&combined, MetricConstant::ThreatScore), 1.0 / 3.0, 1e-12);
}

#[test]
fn test_event_metrics_without_event_thresholds_are_rejected() {
    let all_data_only = || metrics_and_thresholds(&[MetricConstant::ThreatScore], &[], 0);
    let expected = DeclarationError::MissingThresholds {
        metric: MetricConstant::ThreatScore,
    };

    let rejected = SingleValuedStatisticsProcessor::new(all_data_only(), pools(), Arc::new(BasicMetricLibrary));
    assert_eq!(rejected.err(), Some(expected.clone()));

    let ensemble = EnsembleStatisticsProcessor::new(
        metrics_and_thresholds(&[MetricConstant::BrierScore, MetricConstant::MeanError], &[], 0),
        pools(),
        Arc::new(BasicMetricLibrary),
    );
    assert_eq!(
        ensemble.err(),
        Some(DeclarationError::MissingThresholds {
            metric: MetricConstant::BrierScore
        })
    );

    // A classifier alone does not define an event.
    let classified = all_data_only()
        .with_classifiers(BTreeSet::from([Threshold::classifier(0.5, ThresholdOperator::Greater).unwrap()]));
    assert_eq!(
        EnsembleStatisticsProcessor::new(classified, pools(), Arc::new(BasicMetricLibrary)).err(),
        Some(expected)
    );

    let above = Threshold::value(2.5, ThresholdOperator::Greater, ThresholdOrientation::Left);
    assert!(SingleValuedStatisticsProcessor::new(
        metrics_and_thresholds(&[MetricConstant::ThreatScore], &[above], 0),
        pools(),
        Arc::new(BasicMetricLibrary),
    )
    .is_ok());
}

#[test]
fn test_combine_is_associative() {
    let processor = single_valued(
        &[
            MetricConstant::MeanError,
            MetricConstant::QuantileQuantileDiagram,
            MetricConstant::BoxPlotOfErrors,
        ],
        &[],
    );
    let a = processor.apply(&regression_pool()).unwrap();
    let b = processor.apply(&single_valued_pool(vec![create_pairs(0, &[(1.0, 2.0)])], None)).unwrap();
    let c = processor.apply(&single_valued_pool(vec![], None)).unwrap();

    let left = a.clone().combine(b.clone()).combine(c.clone());
    let right = a.combine(b.combine(c));

    assert_eq!(left.statistic_types(), right.statistic_types());
    for statistic_type in StatisticType::ALL {
        assert_eq!(left.get(statistic_type).len(), right.get(statistic_type).len());
    }
    assert_eq!(left.len(), 9);
}

#[test]
fn test_ensemble_pool_statistics() {
    let processor = EnsembleStatisticsProcessor::new(
        metrics_and_thresholds(
            &[
                MetricConstant::SampleSize,
                MetricConstant::ContinuousRankedProbabilityScore,
                MetricConstant::ContinuousRankedProbabilitySkillScore,
                MetricConstant::RankHistogram,
                MetricConstant::MeanError,
            ],
            &[],
            0,
        ),
        pools(),
        Arc::new(BasicMetricLibrary),
    )
    .unwrap();
    let pool = ensemble_pool(
        vec![create_ensemble_pairs(0, &[(1.0, vec![4.0]), (2.0, vec![1.0, 3.0])])],
        vec![1.0, 2.0],
    );

    let store = processor.apply(&pool).unwrap();

    // No baseline, so no skill score.
    assert!(store
        .double_scores()
        .all(|s| s.metric != MetricConstant::ContinuousRankedProbabilitySkillScore));
    assert_eq!(score(&store, MetricConstant::SampleSize), 2.0);
    // CRPS: 3 for the single member; 1 - 0.5 = 0.5 for the pair of members.
    assert_approx_eq!(score(&store, MetricConstant::ContinuousRankedProbabilityScore), 1.75, 1e-12);
    // Ensemble means 4 and 2 against 1 and 2.
    assert_approx_eq!(score(&store, MetricConstant::MeanError), 1.5, 1e-12);
    assert_eq!(store.diagrams().count(), 1);
}
