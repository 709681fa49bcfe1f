//! Scenario configuration: presets, JSON loading and validation.

use crate::core::RunConfig;
use crate::telemetry::validate_table;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown pace '{0}' (expected slow, medium, fast or breakneck)")]
    UnknownPace(String),

    #[error("Unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Inter-step delay presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pace {
    /// 4 ms between steps
    Slow,
    /// 2 ms between steps
    #[default]
    Medium,
    /// 1 ms between steps
    Fast,
    /// No delay
    Breakneck,
}

impl Pace {
    pub fn step_delay(&self) -> Duration {
        match self {
            Self::Slow => Duration::from_millis(4),
            Self::Medium => Duration::from_millis(2),
            Self::Fast => Duration::from_millis(1),
            Self::Breakneck => Duration::ZERO,
        }
    }
}

impl FromStr for Pace {
    type Err = ConfigError;

    /// Accepts the preset names and the menu digits `1`, `2`, `3` and `9`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" | "1" => Ok(Self::Slow),
            "medium" | "2" => Ok(Self::Medium),
            "fast" | "3" => Ok(Self::Fast),
            "breakneck" | "9" => Ok(Self::Breakneck),
            _ => Err(ConfigError::UnknownPace(s.to_string())),
        }
    }
}

/// The scripted test graphs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Primary and fault driving take turns, one episode each
    #[default]
    Alternating,
    /// Alternating, logging every step
    LoggedAlternating,
    /// A primary episode, a nested run of fault episodes, two more primary episodes
    Nested,
    /// Nested, logging every step
    NestedLogged,
    /// Fault driving under the distance-trend monitor
    Supervised,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 5] = [
        Self::Alternating,
        Self::LoggedAlternating,
        Self::Nested,
        Self::NestedLogged,
        Self::Supervised,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alternating => "alternating",
            Self::LoggedAlternating => "logged-alternating",
            Self::Nested => "nested",
            Self::NestedLogged => "nested-logged",
            Self::Supervised => "supervised",
        }
    }

    /// Whether the scenario writes telemetry and needs a teardown.
    pub fn is_logged(&self) -> bool {
        matches!(
            self,
            Self::LoggedAlternating | Self::NestedLogged | Self::Supervised
        )
    }

    pub fn default_table(&self) -> &'static str {
        match self {
            Self::Alternating | Self::LoggedAlternating => "AlternatingTest",
            Self::Nested | Self::NestedLogged => "NestedTest",
            Self::Supervised => "SupervisedTest",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = ConfigError;

    /// Accepts the kebab-case names and the menu numbers `1` to `5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if let Ok(number) = wanted.parse::<usize>() {
            return number
                .checked_sub(1)
                .and_then(|index| Self::ALL.get(index).copied())
                .ok_or_else(|| ConfigError::UnknownScenario(s.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownScenario(s.to_string()))
    }
}

/// Everything needed to run one scenario.
///
/// # Example
///
/// ```rust
/// use scenario_harness::config::{Pace, ScenarioConfig, ScenarioKind};
///
/// let config: ScenarioConfig =
///     serde_json::from_str(r#"{ "scenario": "nested", "pace": "breakneck", "fault_episodes": 2 }"#)
///         .unwrap();
///
/// assert_eq!(config.scenario, ScenarioKind::Nested);
/// assert_eq!(config.pace, Pace::Breakneck);
/// assert_eq!(config.table(), "NestedTest");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub scenario: ScenarioKind,
    pub pace: Pace,
    /// Random episodes run by the nested child engine
    pub fault_episodes: i64,
    /// Fallback steps between safety checks
    pub intervention: i64,
    /// Stop after this many completed episodes; run until interrupted otherwise
    pub episodes: Option<usize>,
    /// Telemetry table; defaults per scenario
    pub table: Option<String>,
    /// Seed of the stand-in environment
    pub seed: u64,
    /// Abort a run after this many engine steps
    pub max_steps: Option<usize>,
    /// Directory for the file-backed sink; memory otherwise
    pub telemetry_dir: Option<PathBuf>,
    /// Keep the transition history of the top-level run
    pub record_history: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            scenario: ScenarioKind::default(),
            pace: Pace::default(),
            fault_episodes: 3,
            intervention: 25,
            episodes: None,
            table: None,
            seed: 0,
            max_steps: None,
            telemetry_dir: None,
            record_history: false,
        }
    }
}

impl ScenarioConfig {
    /// Load from a JSON file; missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn table(&self) -> &str {
        self.table
            .as_deref()
            .unwrap_or_else(|| self.scenario.default_table())
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = vec![
            check(
                self.intervention >= 1,
                format!("intervention must be at least 1, got {}", self.intervention),
            ),
            check(
                self.fault_episodes >= 0,
                format!(
                    "fault_episodes must not be negative, got {}",
                    self.fault_episodes
                ),
            ),
            check(
                validate_table(self.table()).is_ok(),
                format!(
                    "table '{}' must be non-empty letters, digits, '_' or '-'",
                    self.table()
                ),
            ),
            check(
                self.episodes != Some(0),
                "episodes must be positive when set".to_string(),
            ),
            check(
                !self.record_history || self.is_bounded(),
                format!(
                    "record_history needs episodes or max_steps: {} only stops when interrupted",
                    self.scenario
                ),
            ),
        ];

        match Validation::all_vec(checks) {
            Validation::Success(_) => Ok(()),
            Validation::Failure(errors) => {
                Err(ConfigError::Invalid(errors.iter().cloned().collect()))
            }
        }
    }

    /// True when the run ends without an interrupt.
    pub fn is_bounded(&self) -> bool {
        self.episodes.is_some()
            || self.max_steps.is_some()
            || matches!(self.scenario, ScenarioKind::Nested | ScenarioKind::NestedLogged)
    }

    /// Engine settings for this scenario.
    pub fn run_config(&self) -> RunConfig {
        let config = RunConfig::paced(self.pace.step_delay()).with_history(self.record_history);
        match self.max_steps {
            Some(limit) => config.with_max_steps(limit),
            None => config,
        }
    }
}

fn check(condition: bool, problem: String) -> Validation<(), NonEmptyVec<String>> {
    if condition {
        Validation::success(())
    } else {
        Validation::fail(problem)
    }
}
