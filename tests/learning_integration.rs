use adaptevo::config::{ContextConfig, NegativeLearningConfig, TemporalConfig};
use adaptevo::engines::generation::Genome;
use adaptevo::learning::{ContextSystem, Dimension, FailureOutcome, NegativeLearning, TemporalSystem};
use adaptevo::strategy::{transfer_sources, ParamSource, SimilarityMatrix, SynthesisRequest, SynthesisStrategy};
use adaptevo::Severity;
use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

const EPSILON: f64 = 1e-9;

fn assets() -> ContextSystem {
    let dims = vec![Dimension::new("asset", &["BTC", "ETH", "SOL"]).unwrap()];
    ContextSystem::new(2, dims, ContextConfig::default()).unwrap()
}

#[test]
fn test_context_learn_then_sample() {
    let dims = vec![Dimension::new("asset", &["BTC", "ETH"]).unwrap()];
    let mut system = ContextSystem::new(3, dims, ContextConfig::default()).unwrap();

    for _ in 0..3 {
        system.learn(&["BTC"], &[0.1, 0.2, 0.3], 0.9).unwrap();
    }

    let mut rng = StdRng::seed_from_u64(42);
    let sampled = system.sample(&["BTC"], 0.0, &mut rng).unwrap();
    for (got, want) in sampled.iter().zip([0.1, 0.2, 0.3]) {
        assert!((got - want).abs() < EPSILON, "sampled {} expected {}", got, want);
    }

    let stats = system.get_stats(&["BTC"]).unwrap();
    assert_eq!(stats.total_experiences, 3);
    assert!(system.has_data(&["BTC"]));
    assert!(!system.has_data(&["ETH"]));

    // Unknown contexts still sample inside the unit interval.
    let fresh = system.sample(&["ETH"], 0.5, &mut rng).unwrap();
    assert_eq!(fresh.len(), 3);
    assert!(fresh.iter().all(|v| (0.0..1.0).contains(v)));
}

#[test]
fn test_invalid_context_values_are_rejected() {
    let mut system = assets();
    assert!(system.learn(&["DOGE"], &[0.1, 0.2], 1.0).is_err());
    assert!(system.learn(&["BTC"], &[0.1], 1.0).is_err());
    assert!(system.learn(&["BTC"], &[0.1, 0.2], f64::NAN).is_err());
    assert_eq!(system.count(), 0);
}

#[test]
fn test_better_fitness_pulls_the_mean() {
    let mut system = assets();
    system.learn(&["BTC"], &[0.0, 0.0], 0.1).unwrap();
    system.learn(&["BTC"], &[1.0, 1.0], 0.9).unwrap();

    let means = system.get_stats(&["BTC"]).unwrap().means();
    assert!(means[0] > 0.5, "high-fitness sample should dominate, got {}", means[0]);
}

#[test]
fn test_query_best_and_csv_export() {
    let mut system = assets();
    for _ in 0..3 {
        system.learn(&["BTC"], &[0.2, 0.8], 0.9).unwrap();
        system.learn(&["ETH"], &[0.3, 0.7], 0.4).unwrap();
    }
    system.learn(&["SOL"], &[0.9, 0.1], 1.5).unwrap();

    let best: Vec<&str> = system.query_best("", 3).iter().map(|s| s.key.as_str()).collect();
    assert_eq!(best, vec!["BTC", "ETH"]);

    let mut out = Vec::new();
    system.export_csv(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("context,experiences,confidence"));
    assert_eq!(lines.count(), 3);
}

#[test]
fn test_context_failure_memory() {
    let mut system = assets();
    let bad = Genome::from_bytes(&[7u8; 16]);
    let outcome = system.record_failure(&["BTC"], &bad, -0.95, 0).unwrap();
    assert_eq!(outcome, FailureOutcome::Recorded(Severity::Fatal));

    assert!(system.check_penalty(&["BTC"], &bad) > 0.0);
    assert!(system.is_forbidden(&["BTC"], &bad, 0.5));
    // Failures are kept per context.
    assert_eq!(system.check_penalty(&["ETH"], &bad), 0.0);
    assert_eq!(system.failure_count(&["BTC"]), 1);
}

#[test]
fn test_negative_learning_penalizes_lookalikes() {
    let mut negative = NegativeLearning::new(NegativeLearningConfig::default()).unwrap();
    let bad = Genome::from_bytes(&[1u8; 20]);
    negative.record_failure(&bad, -0.6, 1).unwrap();

    let mut close = bad.clone();
    close.as_bytes_mut()[0] = 2;
    let far = Genome::from_bytes(&[200u8; 20]);

    assert!(negative.adjust_fitness(&close, 1.0) < 1.0);
    assert_eq!(negative.adjust_fitness(&far, 1.0), 1.0);

    // Repeating the same mistake raises the penalty.
    let first = negative.check_penalty(&bad);
    negative.record_failure(&bad, -0.6, 2).unwrap();
    assert!(negative.check_penalty(&bad) > first);

    // Penalties fade as generations pass.
    let before = negative.check_penalty(&bad);
    negative.set_generation(40);
    assert!(negative.check_penalty(&bad) < before);
}

#[test]
fn test_temporal_trend_and_organic_mean() {
    let mut temporal = TemporalSystem::new(2, TemporalConfig::default()).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    for day in 0..5 {
        let ts = start + Duration::days(day);
        temporal.learn("BTC", &[0.1 * day as f64, 0.5], 1.0, ts).unwrap();
    }
    assert_eq!(temporal.bucket_count("BTC"), 5);

    let trend = temporal.get_trend("BTC").unwrap();
    assert!((trend[0] - 0.1).abs() < 1e-9);
    assert_eq!(temporal.trend_direction(trend[0]), 1);
    assert_eq!(temporal.trend_direction(trend[1]), 0);

    let weighted = temporal.get_weighted_mean("BTC").unwrap();
    let organic = temporal.get_organic_mean("BTC").unwrap();
    assert!((weighted[0] - 0.2).abs() < 1e-9);
    assert!(organic.params[0] > weighted[0], "recent buckets should weigh more");
    assert!((organic.params[1] - 0.5).abs() < 1e-9);
    assert!(organic.confidence > 0.0 && organic.confidence <= 1.0);

    assert!(temporal.detect_regime_change("BTC", 1, 0.1));
    assert!(!temporal.detect_regime_change("BTC", 1, 0.5));

    let removed = temporal.prune_old(start + Duration::days(5), Duration::days(2));
    assert_eq!(removed, 3);
    assert_eq!(temporal.bucket_count("BTC"), 2);
}

#[test]
fn test_transfer_between_similar_contexts() {
    let mut system = assets();
    for _ in 0..5 {
        system.learn(&["BTC"], &[0.2, 0.8], 0.9).unwrap();
        system.learn(&["ETH"], &[0.25, 0.75], 0.8).unwrap();
        system.learn(&["SOL"], &[0.9, 0.1], 0.7).unwrap();
    }

    let matrix = SimilarityMatrix::from_contexts(&system, 1.0).unwrap();
    assert_eq!(matrix.find_nearest("BTC"), Some("ETH"));

    let close_only = transfer_sources(&system, "BTC", &matrix, 0.5);
    assert_eq!(close_only.len(), 1);
    assert_eq!(close_only[0].context_id.as_deref(), Some("ETH"));

    let every = transfer_sources(&system, "BTC", &matrix, 0.0);
    assert_eq!(every.len(), 2);

    let mut request = SynthesisRequest::new(SynthesisStrategy::Nearest, 2).with_target_context("BTC");
    for source in every {
        request.add_source(source).unwrap();
    }
    let mut rng = StdRng::seed_from_u64(3);
    let result = request.execute(Some(&matrix), &mut rng).unwrap();
    assert!((result.parameters[0] - 0.25).abs() < 1e-9);
    assert_eq!(request.output(), Some(&result));
}

#[test]
fn test_synthesis_blends_context_and_temporal_sources() {
    let mut system = assets();
    for _ in 0..4 {
        system.learn(&["BTC"], &[0.2, 0.6], 1.0).unwrap();
    }
    let mut temporal = TemporalSystem::new(2, TemporalConfig::default()).unwrap();
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    for day in 0..4 {
        temporal
            .learn("BTC", &[0.4, 0.6], 1.0, start + Duration::days(day))
            .unwrap();
    }

    let context = system.get_stats(&["BTC"]).unwrap();
    let organic = temporal.get_organic_mean("BTC").unwrap();

    let mut request = SynthesisRequest::new(SynthesisStrategy::Weighted, 2);
    request
        .add_source(ParamSource::new(context.means(), context.confidence, context.best_fitness).with_context("context"))
        .unwrap();
    request
        .add_source(ParamSource::new(organic.params.clone(), organic.confidence, 1.0).with_context("temporal"))
        .unwrap();

    let mut rng = StdRng::seed_from_u64(9);
    let result = request.execute(None, &mut rng).unwrap();
    assert!(result.parameters[0] >= 0.2 - 1e-9 && result.parameters[0] <= 0.4 + 1e-9);
    assert!((result.parameters[1] - 0.6).abs() < 1e-9);
    assert!(result.confidence > 0.0 && result.confidence <= 1.0);

    let empty = SynthesisRequest::new(SynthesisStrategy::Average, 2).execute(None, &mut rng);
    assert!(empty.is_err());
}
