//! Scenario harness: a hierarchical state-machine engine for scripted tests
//!
//! Test scenarios alternate a trained control policy with injected random
//! behavior against a controlled process, log telemetry while they run, and
//! can hand control back to the policy when a safety check fails.
//!
//! # Core Concepts
//!
//! - **Engine**: Run-to-completion dispatcher over a graph of states
//! - **State**: An action plus an ordered transition table, optionally bound to a parameter
//! - **Matcher**: Exact key equality or a relational [`Guard`](core::Guard)
//! - **Nested composition**: An action may build and run a child engine
//! - **Telemetry**: Append-only measurement tables with dump-and-purge teardown
//! - **Monitor**: Distance-trend safety check deciding who drives next
//!
//! # Example
//!
//! ```rust
//! use scenario_harness::core::{EngineBuilder, Guard, Key, Matcher, RunConfig, State};
//!
//! let mut builder = EngineBuilder::<i64>::new();
//! let a = builder.add_state(State::new("A", |_ctx, counter: i64| {
//!     let next = counter - 1;
//!     if next > 0 {
//!         Ok((Key::from(next), next))
//!     } else {
//!         Ok((Key::EXHAUSTED, next))
//!     }
//! }));
//! let b = builder.add_state(State::new("B", |_ctx, n: i64| Ok((Key::from(42), n))).ending());
//! builder
//!     .add_transition(a, Matcher::guard(Guard::greater_than(0)), a)
//!     .add_transition(a, Key::EXHAUSTED, b);
//!
//! let outcome = builder.build().unwrap().run(3, &RunConfig::default()).unwrap();
//! assert_eq!(outcome.key, Key::from(42));
//! assert_eq!(outcome.history.get_path(), vec!["A", "A", "A", "B"]);
//! ```

pub mod config;
pub mod core;
pub mod monitor;
pub mod scenario;
pub mod sim;
pub mod teardown;
pub mod telemetry;

// Re-export commonly used types
pub use crate::core::{Engine, EngineBuilder, EngineError, Guard, Key, Matcher, RunConfig, State};
pub use crate::telemetry::{SharedSink, TelemetryRecord, TelemetrySink};
