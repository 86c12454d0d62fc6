/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under the MIT license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;

/// Knobs of the abstract interpreter. Missing fields take their default when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Iterations of a cycle head that join before widening starts.
    pub widen_delay: u32,
    /// Upper bound on narrowing iterations once widening has stabilized.
    pub narrowing_passes: u32,
    /// Upper bound on widening iterations of a cycle head. Reaching it
    /// forces every still growing binding to top.
    pub max_cycle_iterations: u32,
    /// Functions analysed from their entry. When none of them exists, every
    /// defined function without callers is used.
    pub entry_functions: Vec<String>,
    /// Havoc the memory reachable by a skipped recursive callee. When false
    /// only the return value is set to top.
    pub skip_recursive_as_top: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            widen_delay: 1,
            narrowing_passes: 3,
            max_cycle_iterations: 64,
            entry_functions: vec!["main".to_owned()],
            skip_recursive_as_top: true,
        }
    }
}

impl AnalysisOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = AnalysisOptions::from_json(r#"{ "widen_delay": 3 }"#).unwrap();
        assert_eq!(options.widen_delay, 3);
        assert_eq!(options.narrowing_passes, 3);
        assert_eq!(options.entry_functions, vec!["main".to_owned()]);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(AnalysisOptions::from_json("{ widen_delay: }").is_err());
    }
}
