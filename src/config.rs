//! Aggregate configuration for compilation and grammar expansion

use crate::error::Result;
use crate::grammar::ExpansionConfig;
use crate::search_space::CompilerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by the library entry points and the CLI
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub compiler: CompilerConfig,
    pub expansion: ExpansionConfig,
}

impl ComposeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compiler(mut self, compiler: CompilerConfig) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_expansion(mut self, expansion: ExpansionConfig) -> Self {
        self.expansion = expansion;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.compiler.validate()?;
        self.expansion.validate()
    }

    /// Load a configuration from a JSON file; missing sections take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
