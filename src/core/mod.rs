//! The state-machine engine.
//!
//! This module contains the dispatcher and everything it is built from:
//! - Keys returned by actions and the matchers tested against them
//! - Guards specialized with one relation and threshold
//! - States, the builder that validates a graph, and the engine that runs it
//! - Nested composition of child engines
//!
//! Resolution is literal: a state's transitions are tried in the order they
//! were added and the first accepting entry wins.

mod builder;
mod engine;
mod error;
mod guard;
mod history;
mod key;
mod matcher;
mod nested;
mod state;

pub use builder::EngineBuilder;
pub use engine::{Engine, RunConfig, RunOutcome};
pub use error::{ActionError, BuildError, ConfigurationError, EngineError};
pub use guard::{Guard, Relation};
pub use history::{StateHistory, StateTransition};
pub use key::{Key, KeyKind};
pub use matcher::{first_match, Matcher, Transition};
pub use nested::nested;
pub use state::{ActionResult, State, StateId, StepContext};
