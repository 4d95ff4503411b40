//! Scenario files for the hammer driver.
//!
//! A scenario is a YAML description of one concurrent run: how many worker
//! threads, how many iterations per thread, and which registered functions
//! to hammer with which arguments.
//!
//! ```yaml
//! name: nested-add
//! threads: 8
//! iterations: 1000
//! targets:
//!   - function: AddCaller
//!     args: [2, 3]
//!   - function: ConcatCaller
//!     args: ["thread", "safe"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use recalc_addin_protocol::{Target, Variant};

use crate::types::{RecalcError, RecalcResult};

fn default_threads() -> usize {
    4
}

fn default_iterations() -> usize {
    100
}

/// One argument value in a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioArg {
    Num(f64),
    Text(String),
}

impl ScenarioArg {
    pub fn to_variant(&self) -> Variant {
        match self {
            Self::Num(value) => Variant::num(*value),
            Self::Text(text) => Variant::text(text.as_str()),
        }
    }
}

/// One function to hammer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTarget {
    pub function: String,
    #[serde(default)]
    pub args: Vec<ScenarioArg>,
}

impl ScenarioTarget {
    pub fn target(&self) -> Target {
        Target::Name(self.function.clone())
    }

    pub fn arg_variants(&self) -> Vec<Variant> {
        self.args.iter().map(ScenarioArg::to_variant).collect()
    }
}

/// A complete hammer scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    pub targets: Vec<ScenarioTarget>,
}

impl ScenarioConfig {
    pub fn from_yaml(contents: &str) -> RecalcResult<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> RecalcResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    fn validate(&self) -> RecalcResult<()> {
        if self.targets.is_empty() {
            return Err(RecalcError::Scenario(format!(
                "scenario '{}' has no targets",
                self.name
            )));
        }
        if self.threads == 0 {
            return Err(RecalcError::Scenario(format!(
                "scenario '{}' needs at least one thread",
                self.name
            )));
        }
        Ok(())
    }
}
