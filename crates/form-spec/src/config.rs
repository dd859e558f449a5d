use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_MAX_FORMULA_LEN: usize = 1024;
const DEFAULT_MAX_FORMULA_NODES: usize = 256;
const DEFAULT_MAX_FORMULA_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("engine limit '{0}' must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Bounds applied to user-authored formulas so a pathological expression
/// cannot stall an edit loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    /// Maximum formula length in characters.
    #[serde(default = "default_max_formula_len")]
    pub max_formula_len: usize,
    /// Maximum number of expression nodes after parsing.
    #[serde(default = "default_max_formula_nodes")]
    pub max_formula_nodes: usize,
    /// Maximum height of the parsed expression tree; parentheses count as a
    /// level.
    #[serde(default = "default_max_formula_depth")]
    pub max_formula_depth: usize,
}

fn default_max_formula_len() -> usize {
    DEFAULT_MAX_FORMULA_LEN
}

fn default_max_formula_nodes() -> usize {
    DEFAULT_MAX_FORMULA_NODES
}

fn default_max_formula_depth() -> usize {
    DEFAULT_MAX_FORMULA_DEPTH
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_formula_len: DEFAULT_MAX_FORMULA_LEN,
            max_formula_nodes: DEFAULT_MAX_FORMULA_NODES,
            max_formula_depth: DEFAULT_MAX_FORMULA_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON config document. Blank input yields the defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = if json.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_json::from_str(json)?
        };
        config.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.max_formula_len == 0 {
            return Err(ConfigError::ZeroLimit("max_formula_len"));
        }
        if self.max_formula_nodes == 0 {
            return Err(ConfigError::ZeroLimit("max_formula_nodes"));
        }
        if self.max_formula_depth == 0 {
            return Err(ConfigError::ZeroLimit("max_formula_depth"));
        }
        Ok(self)
    }
}
