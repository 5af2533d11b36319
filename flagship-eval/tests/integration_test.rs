//! Integration tests for flagship-eval

use flagship_eval::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

const ENGINE_SALT: &str = "ZW5naW5lLmVuYWJsZQ==";

fn engine_flag() -> Flag {
    Flag::new("engine.enable", ENGINE_SALT)
        .with_name("New recommendations engine")
        .with_version(2)
        .with_variation(Variation::new(true, 93.0))
        .with_variation(Variation::new(false, 7.0))
}

/// Chi-square statistic of `points` over ten equal-width bins.
fn chi_square(points: &[f64]) -> f64 {
    let mut bins = [0usize; 10];
    for point in points {
        assert!((0.0..1.0).contains(point));
        bins[(point * 10.0) as usize] += 1;
    }
    let expected = points.len() as f64 / 10.0;
    bins.iter()
        .map(|&observed| (observed as f64 - expected).powi(2) / expected)
        .sum()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("flagship_eval=debug"))
        .with_test_writer()
        .try_init();
}

// 9 degrees of freedom, p = 0.001
const CHI_SQUARE_CRITICAL: f64 = 27.88;

// =============================================================================
// Bucketing
// =============================================================================

#[test]
fn test_bucketing_is_deterministic() {
    let context = EvaluationContext::builder("anyUser")
        .secondary("sec")
        .build()
        .unwrap();

    let first = bucket(&context, "engine.enable", ENGINE_SALT);
    for _ in 0..100 {
        assert_eq!(bucket(&context, "engine.enable", ENGINE_SALT), first);
    }

    // Same inputs on a freshly built context
    let rebuilt = EvaluationContext::builder("anyUser")
        .secondary("sec")
        .build()
        .unwrap();
    assert_eq!(bucket(&rebuilt, "engine.enable", ENGINE_SALT), first);
}

#[test]
fn test_bucketing_is_uniform_over_fixed_sample() {
    let points: Vec<f64> = (0..10_000)
        .map(|i| bucket(&EvaluationContext::new(format!("ctx-{i}")), "uniform.flag", "c2FsdA=="))
        .collect();

    assert!(chi_square(&points) < CHI_SQUARE_CRITICAL);
}

#[test]
fn test_bucketing_is_uniform_over_random_keys() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let points: Vec<f64> = (0..10_000)
        .map(|_| {
            let key = format!("{:016x}", rng.random::<u64>());
            bucket(&EvaluationContext::new(key), "uniform.flag", "c2FsdA==")
        })
        .collect();

    assert!(chi_square(&points) < CHI_SQUARE_CRITICAL);
}

// =============================================================================
// Rollout
// =============================================================================

#[test]
fn test_rollout_respects_weights() {
    let flag = engine_flag();
    let default = json!(null);
    let samples = 100_000;

    let enabled = (0..samples)
        .filter(|i| {
            let context = EvaluationContext::new(format!("user-{i}"));
            flag.evaluate(&context, &default).unwrap() == &json!(true)
        })
        .count();

    let share = enabled as f64 / samples as f64;
    assert!((share - 0.93).abs() < 0.005, "share was {share}");
}

#[test]
fn test_default_fallback_scenarios() {
    let empty = Evaluator::new(Arc::new(InMemoryFlagStore::new()));
    let user = EvaluationContext::new("anyUser");
    assert!(!empty.toggle("any.flag", &user, false).unwrap());

    let store = InMemoryFlagStore::new();
    store.init(HashMap::from([("engine.enable".to_string(), engine_flag())]));
    let evaluator = Evaluator::new(Arc::new(store));

    // bucket ~0.44 < 0.93
    assert!(evaluator.toggle("engine.enable", &user, false).unwrap());

    // bucket ~0.956: 0.93 <= b < 1.0
    let late = EvaluationContext::new("user-25");
    assert!(bucket(&late, "engine.enable", ENGINE_SALT) >= 0.93);
    assert!(!evaluator.toggle("engine.enable", &late, true).unwrap());
}

#[test]
fn test_off_flag_ignores_targets_and_rollout() {
    let flag = Flag::new("off", "salt")
        .with_on(false)
        .with_variation(
            Variation::new(true, 100.0)
                .with_user_target(TargetRule::keys(["anyUser"]))
                .with_target(TargetRule::is_in("", vec![])),
        );

    for key in ["anyUser", "user-1", "user-25"] {
        let context = EvaluationContext::new(key);
        assert_eq!(flag.evaluate(&context, &json!("dflt")).unwrap(), &json!("dflt"));
    }
}

#[test]
fn test_user_target_short_circuits_rollout() {
    let flag = Flag::new("engine.enable", ENGINE_SALT)
        .with_variation(Variation::new(true, 93.0))
        .with_variation(
            Variation::new(false, 7.0).with_user_target(TargetRule::keys(["anyUser"])),
        );

    let context = EvaluationContext::new("anyUser");
    assert!(bucket(&context, "engine.enable", ENGINE_SALT) < 0.93);
    assert_eq!(flag.evaluate(&context, &json!(null)).unwrap(), &json!(false));
}

#[test]
fn test_list_attribute_rules() {
    let rule = TargetRule::is_in("bizzle", vec!["cripps".into()]);

    let matching = EvaluationContext::builder("anyUser")
        .custom("bizzle", vec!["cripps", "crupps"])
        .build()
        .unwrap();
    let other = EvaluationContext::builder("anyUser")
        .custom("bizzle", vec!["cruupps", "crupps"])
        .build()
        .unwrap();

    assert!(rule.matches(&matching).unwrap());
    assert!(!rule.matches(&other).unwrap());
}

#[test]
fn test_remote_flag_set_evaluates() {
    let payload = include_str!("fixtures/latest_features.json");
    let flags: HashMap<String, Flag> = serde_json::from_str(payload).unwrap();

    let store = Arc::new(InMemoryFlagStore::new());
    store.init(flags);
    let evaluator = Evaluator::new(store);

    let justin = EvaluationContext::new("justin@persistiq.com");
    let detail = evaluator
        .variation_detail("zentasks.gravatar", &justin, json!(false))
        .unwrap();
    assert_eq!(detail.value, json!(true));
    assert_eq!(detail.reason, Reason::TargetMatch { rule_index: None });
    assert_eq!(detail.version, Some(52));

    // Ranked customers are restricted by an empty value set.
    let ranked = EvaluationContext::builder("someone")
        .custom("customer_rank", "gold")
        .build()
        .unwrap();
    assert!(!evaluator.toggle("zentasks.gravatar", &ranked, true).unwrap());

    // Unranked customers match the empty customer_rank rule vacuously.
    let unranked = EvaluationContext::new("someone");
    assert!(evaluator.toggle("zentasks.gravatar", &unranked, false).unwrap());
}

// =============================================================================
// Store
// =============================================================================

#[test]
fn test_version_monotonicity_under_random_writes() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(42);
    let store = InMemoryFlagStore::new();
    let mut stored_version: HashMap<&str, u64> = HashMap::new();
    let keys = ["a", "b", "c"];

    for _ in 0..5_000 {
        let key = keys[rng.random_range(0..keys.len())];
        let version = rng.random_range(1..200u64);
        let before = stored_version.get(key).copied();

        let outcome = if rng.random_bool(0.7) {
            store.upsert(key, Flag::new(key, "salt").with_version(version))
        } else {
            store.delete(key, version)
        };

        match before {
            Some(current) if version <= current => {
                assert_eq!(outcome, WriteOutcome::Stale);
            }
            _ => {
                assert_eq!(outcome, WriteOutcome::Applied);
                stored_version.insert(key, version);
            }
        }

        if let Some(flag) = store.get(key) {
            assert_eq!(Some(flag.version), stored_version.get(key).copied());
        }
    }
}

#[test]
fn test_tombstone_precedence() {
    init_tracing();
    let store = InMemoryFlagStore::new();
    store.upsert("f", Flag::new("f", "salt").with_version(1));

    store.delete("f", 10);
    for version in 1..=10 {
        assert_eq!(
            store.upsert("f", Flag::new("f", "salt").with_version(version)),
            WriteOutcome::Stale
        );
    }
    assert!(store.get("f").is_none());
    assert!(!store.all().contains_key("f"));
}

#[test]
fn test_concurrent_evaluation_during_refresh() {
    init_tracing();
    let store = Arc::new(InMemoryFlagStore::new());
    store.init(HashMap::from([("engine.enable".to_string(), engine_flag())]));
    let evaluator = Evaluator::new(Arc::clone(&store));

    let refresher = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for round in 0..200u64 {
                let flag = engine_flag().with_version(round + 3);
                store.init(HashMap::from([("engine.enable".to_string(), flag)]));
            }
        })
    };

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let evaluator = evaluator.clone();
            thread::spawn(move || {
                let user = EvaluationContext::new("anyUser");
                for i in 0..500 {
                    let key = if (worker + i) % 2 == 0 { "engine.enable" } else { "missing" };
                    let expected = key == "engine.enable";
                    assert_eq!(evaluator.toggle(key, &user, false).unwrap(), expected);
                }
            })
        })
        .collect();

    refresher.join().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }
}
