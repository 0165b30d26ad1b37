//! Compiler configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::BcmdError;

/// Default name of the independent variable
pub const DEFAULT_INDEPENDENT: &str = "t";

/// Options controlling analysis and code generation
///
/// All fields have defaults, so a JSON configuration only needs to name the
/// options it changes:
///
/// ```ignore
/// let config = CompilerConfig::from_json(r#"{ "name": "bsx", "debug": true }"#)?;
/// assert_eq!(config.independent, "t");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Model name written into the generated source
    pub name: String,

    /// Drop symbols that nothing required depends on
    pub omit_unused: bool,

    /// Emit per-symbol `fprintf` traces in every generated function
    pub debug: bool,

    /// Independent variable name, unless overridden by an `independent` directive
    pub independent: String,

    /// Directories searched for source and import files
    pub model_path: Vec<PathBuf>,

    /// Treat ambiguous assignment pairings as errors instead of guessing
    pub strict_assignments: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            name: "model".to_string(),
            omit_unused: false,
            debug: false,
            independent: DEFAULT_INDEPENDENT.to_string(),
            model_path: vec![PathBuf::from("."), PathBuf::from("models")],
            strict_assignments: false,
        }
    }
}

impl CompilerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, BcmdError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn omit_unused(mut self, omit: bool) -> Self {
        self.omit_unused = omit;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn independent(mut self, name: impl Into<String>) -> Self {
        self.independent = name.into();
        self
    }

    pub fn strict_assignments(mut self, strict: bool) -> Self {
        self.strict_assignments = strict;
        self
    }

    pub fn model_path(mut self, path: Vec<PathBuf>) -> Self {
        self.model_path = path;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.independent, "t");
        assert!(!config.omit_unused);
        assert!(!config.debug);
        assert!(!config.strict_assignments);
    }

    #[test]
    fn test_partial_json() {
        let config = CompilerConfig::from_json(r#"{ "name": "bsx", "omit_unused": true }"#)
            .expect("Should parse partial config");
        assert_eq!(config.name, "bsx");
        assert!(config.omit_unused);
        assert_eq!(config.independent, DEFAULT_INDEPENDENT);
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result = CompilerConfig::from_json(r#"{ "verbose": 7 }"#);
        assert!(matches!(result, Err(BcmdError::Parse(_))));
    }
}
