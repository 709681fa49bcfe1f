//! Property-based tests for the engine and the telemetry sinks.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use scenario_harness::core::{
    EngineBuilder, EngineError, Guard, Key, Matcher, Relation, RunConfig, State,
};
use scenario_harness::telemetry::{MemorySink, TelemetryRecord, TelemetrySink};

fn arbitrary_relation() -> impl Strategy<Value = Relation> {
    prop_oneof![
        Just(Relation::GreaterThan),
        Just(Relation::GreaterOrEqual),
        Just(Relation::LessThan),
        Just(Relation::LessOrEqual),
        Just(Relation::Equal),
        Just(Relation::NotEqual),
    ]
}

/// Countdown graph: `Count` loops while the counter stays positive.
fn countdown_outcome(start: i64) -> Result<(Key, i64, usize), EngineError> {
    let mut builder = EngineBuilder::<i64>::new();
    let count = builder.add_state(State::new("Count", |_ctx, n: i64| {
        let next = n - 1;
        if next > 0 {
            Ok((Key::from(next), next))
        } else {
            Ok((Key::EXHAUSTED, next))
        }
    }));
    let done = builder.add_state(State::new("Done", |_ctx, n: i64| Ok((Key::from(n), n))).ending());
    builder
        .add_transition(count, Matcher::guard(Guard::greater_than(0)), count)
        .add_transition(count, Key::EXHAUSTED, done);

    let outcome = builder
        .build()
        .expect("countdown graph is valid")
        .run(start, &RunConfig::default())?;
    Ok((outcome.key, outcome.payload, outcome.steps))
}

proptest! {
    #[test]
    fn guard_agrees_with_its_relation(
        relation in arbitrary_relation(),
        threshold in -1_000i64..1_000,
        value in -1_000i64..1_000,
    ) {
        let guard = Guard::specialized(relation, threshold);
        prop_assert_eq!(guard.matches(&Key::from(value)), Ok(relation.apply(value, threshold)));
    }

    #[test]
    fn unspecialized_guard_never_matches(value in any::<i64>()) {
        prop_assert!(Guard::new().matches(&Key::from(value)).is_err());
    }

    #[test]
    fn guard_rejects_boolean_keys(relation in arbitrary_relation(), flag in any::<bool>()) {
        let guard = Guard::specialized(relation, 0);
        prop_assert!(guard.matches(&Key::from(flag)).is_err());
    }

    #[test]
    fn first_registered_match_wins(key in -5i64..5) {
        // Both entries accept every key >= 0; only the earlier one may be taken.
        let mut builder = EngineBuilder::<i64>::new();
        let start = builder.add_state(State::new("Start", move |_ctx, n: i64| Ok((Key::from(key), n))));
        let first = builder.add_state(State::new("First", |_ctx, n: i64| Ok((Key::from(true), n))).ending());
        let second = builder.add_state(State::new("Second", |_ctx, n: i64| Ok((Key::from(true), n))).ending());
        let other = builder.add_state(State::new("Other", |_ctx, n: i64| Ok((Key::from(true), n))).ending());
        builder
            .add_transition(start, Matcher::guard(Guard::greater_or_equal(0)), first)
            .add_transition(start, Matcher::guard(Guard::greater_than(-1)), second)
            .add_transition(start, Matcher::guard(Guard::less_than(0)), other);

        let outcome = builder.build().unwrap().run(0, &RunConfig::default()).unwrap();

        let expected = if key >= 0 { "First" } else { "Other" };
        prop_assert_eq!(outcome.final_state.as_str(), expected);
    }

    #[test]
    fn countdown_always_terminates(start in -50i64..200) {
        let (key, payload, steps) = countdown_outcome(start).unwrap();

        let expected_steps = (if start > 1 { start as usize } else { 1 }) + 1;
        prop_assert_eq!(steps, expected_steps);
        prop_assert_eq!(payload, start.min(1) - 1);
        prop_assert_eq!(key, Key::from(payload));
    }

    #[test]
    fn countdown_is_deterministic(start in 0i64..100) {
        prop_assert_eq!(
            countdown_outcome(start).unwrap(),
            countdown_outcome(start).unwrap()
        );
    }

    #[test]
    fn unmatched_key_is_fatal_not_a_silent_loop(key in 1i64..100) {
        let mut builder = EngineBuilder::<()>::new();
        let a = builder.add_state(State::new("A", move |_ctx, ()| Ok((Key::from(key), ()))));
        let b = builder.add_state(State::new("B", |_ctx, ()| Ok((Key::from(true), ()))).ending());
        builder.add_transition(a, 0, b);

        let error = builder.build().unwrap().run((), &RunConfig::default()).unwrap_err();

        let is_unresolved = matches!(
            error,
            EngineError::UnresolvedTransition { ref state, key: k, candidates: 1 }
                if state == "A" && k == Key::from(key)
        );
        prop_assert!(is_unresolved);
    }

    #[test]
    fn read_latest_is_newest_first(offsets in prop::collection::vec(0i64..1_000, 1..30), n in 1usize..10) {
        let sink = MemorySink::new();
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for offset in &offsets {
            sink.write(
                TelemetryRecord::new("T")
                    .field("offset", *offset as f64)
                    .at(base + Duration::seconds(*offset)),
            )
            .unwrap();
        }

        let latest = sink.read_latest("T", n).unwrap();

        prop_assert_eq!(latest.len(), n.min(offsets.len()));
        prop_assert!(latest.windows(2).all(|pair| pair[0].timestamp >= pair[1].timestamp));
        let newest = offsets.iter().max().copied().unwrap_or_default();
        prop_assert_eq!(latest[0].field_value("offset"), Some(newest as f64));
    }
}
