//! States: an action, an optional bound parameter, and a transition table.
//!
//! A state is registered with exactly one engine, which hands back a
//! [`StateId`]. Transitions refer to other states through these handles,
//! so a state never owns its neighbours.

use super::engine::RunConfig;
use super::error::{ActionError, ConfigurationError};
use super::key::{Key, KeyKind};
use super::matcher::Transition;
use std::fmt;
use uuid::Uuid;

/// What an action hands back: the transition key and the next payload.
pub type ActionResult<P> = Result<(Key, P), ActionError>;

type BoxedAction<P, C> = Box<dyn FnMut(&StepContext<'_, C>, P) -> ActionResult<P>>;

/// Non-owning handle to a state inside one engine's registry.
///
/// The handle remembers which registry issued it, so using it with a
/// different engine is detected as an unregistered state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateId {
    registry: Uuid,
    index: usize,
}

impl StateId {
    pub(crate) fn new(registry: Uuid, index: usize) -> Self {
        Self { registry, index }
    }

    pub(crate) fn registry(&self) -> Uuid {
        self.registry
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

/// Everything an action can see besides its payload.
pub struct StepContext<'a, C> {
    param: Option<&'a C>,
    config: &'a RunConfig,
    depth: usize,
    state: &'a str,
}

impl<'a, C> StepContext<'a, C> {
    pub(crate) fn new(
        param: Option<&'a C>,
        config: &'a RunConfig,
        depth: usize,
        state: &'a str,
    ) -> Self {
        Self {
            param,
            config,
            depth,
            state,
        }
    }

    /// The parameter bound to the running state, if any.
    pub fn param(&self) -> Option<&'a C> {
        self.param
    }

    /// The bound parameter, or a configuration error naming the state.
    pub fn require_param(&self) -> Result<&'a C, ConfigurationError> {
        self.param.ok_or_else(|| ConfigurationError::MissingParameter {
            state: self.state.to_string(),
        })
    }

    /// Configuration of the run this step belongs to.
    pub fn config(&self) -> &'a RunConfig {
        self.config
    }

    /// Nesting depth: 0 for a top-level engine, +1 per child engine.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn state_name(&self) -> &'a str {
        self.state
    }
}

/// A named unit pairing an action with an ordered transition table.
///
/// `P` is the payload threaded through the run and `C` the type of the
/// parameter a state may have bound to it (for example a telemetry
/// recorder). States without a bound parameter see `None`.
///
/// # Example
///
/// ```rust
/// use scenario_harness::core::{Key, State};
///
/// let countdown: State<i64> = State::new("Countdown", |_ctx, counter: i64| {
///     if counter > 0 {
///         Ok((Key::from(counter - 1), counter - 1))
///     } else {
///         Ok((Key::EXHAUSTED, counter))
///     }
/// });
///
/// assert_eq!(countdown.name(), "Countdown");
/// assert!(!countdown.is_ending());
/// ```
pub struct State<P, C = ()> {
    pub(crate) name: String,
    pub(crate) action: BoxedAction<P, C>,
    pub(crate) param: Option<C>,
    pub(crate) ending: bool,
    pub(crate) key_kind: Option<KeyKind>,
    pub(crate) transitions: Vec<Transition>,
}

impl<P, C> State<P, C> {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnMut(&StepContext<'_, C>, P) -> ActionResult<P> + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(action),
            param: None,
            ending: false,
            key_kind: None,
            transitions: Vec::new(),
        }
    }

    /// Mark the state as ending: the run returns right after its action.
    pub fn ending(mut self) -> Self {
        self.ending = true;
        self
    }

    /// Bind a parameter handed to every invocation of the action.
    pub fn bind(mut self, param: C) -> Self {
        self.param = Some(param);
        self
    }

    /// Declare the kind of key the action returns.
    ///
    /// Lets the builder reject guard transitions on boolean-keyed states
    /// before the run starts.
    pub fn returns(mut self, kind: KeyKind) -> Self {
        self.key_kind = Some(kind);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ending(&self) -> bool {
        self.ending
    }

    pub fn param(&self) -> Option<&C> {
        self.param.as_ref()
    }

    pub fn key_kind(&self) -> Option<KeyKind> {
        self.key_kind
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

impl<P, C> fmt::Debug for State<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("ending", &self.ending)
            .field("bound", &self.param.is_some())
            .field("key_kind", &self.key_kind)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}
