// ─────────────────────────────────────────────────────────────────────
// TARDIS-RS — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

/// Internal jumps allowed in one activation walk unless configured otherwise.
pub const DEFAULT_MAX_JUMPS: usize = 10_000;

/// What normalization does with a level whose outgoing weight in a shell is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroWeightPolicy {
    /// Leave the block column at zero.
    #[default]
    LeaveZero,
    /// Fail the solve with `TardisError::ZeroWeightBlock`.
    Reject,
}

/// Macro atom solver configuration.
///
/// Every field is optional in JSON; `{}` deserializes to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroAtomConfig {
    /// Compute coefficients and block references on the first solve (default: true)
    #[serde(default = "default_true")]
    pub initialize: bool,
    /// Rescale each level's outgoing probabilities to unit sum (default: true)
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default)]
    pub zero_weight_policy: ZeroWeightPolicy,
    /// Upper bound on internal jumps in one activation walk (default: 10000)
    #[serde(default = "default_max_jumps")]
    pub max_jumps: usize,
}

fn default_true() -> bool {
    true
}
fn default_max_jumps() -> usize {
    DEFAULT_MAX_JUMPS
}

impl Default for MacroAtomConfig {
    fn default() -> Self {
        MacroAtomConfig {
            initialize: default_true(),
            normalize: default_true(),
            zero_weight_policy: ZeroWeightPolicy::default(),
            max_jumps: default_max_jumps(),
        }
    }
}

impl MacroAtomConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> crate::error::TardisResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> crate::error::TardisResult<Self> {
        let config: Self = serde_json::from_str(contents)?;
        if config.max_jumps == 0 {
            return Err(crate::error::TardisError::ConfigError(
                "max_jumps must be > 0".to_string(),
            ));
        }
        Ok(config)
    }
}
