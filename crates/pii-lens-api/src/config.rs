use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pii_lens_core::{
    Catalog, CorrectionTable, Engine, KernelError, DEFAULT_CATEGORIES, DEFAULT_FUZZY_PADDING,
};
use pii_lens_oracle::OracleConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_INPUT_CHARS: usize = 200_000;

/// Deployment configuration, usually read from a YAML file. Every field is optional.
///
/// ```yaml
/// catalog: [NAME, EMAIL, PHONE]
/// corrections:
///   contact_email: EMAIL
/// fuzzy_padding: 2
/// max_input_chars: 200000
/// oracle:
///   base_url: http://127.0.0.1:8088
///   timeout_ms: 30000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    #[serde(default = "default_catalog")]
    pub catalog: Vec<String>,
    /// Merged over the built-in correction table; entries here win.
    #[serde(default)]
    pub corrections: BTreeMap<String, String>,
    #[serde(default = "default_fuzzy_padding")]
    pub fuzzy_padding: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default)]
    pub oracle: Option<OracleConfig>,
}

fn default_catalog() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|category| (*category).to_string()).collect()
}

fn default_fuzzy_padding() -> usize {
    DEFAULT_FUZZY_PADDING
}

fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            corrections: BTreeMap::new(),
            fuzzy_padding: default_fuzzy_padding(),
            max_input_chars: default_max_input_chars(),
            oracle: None,
        }
    }
}

impl ScanConfig {
    /// # Errors
    /// Returns an error when the YAML is malformed or carries unknown keys.
    pub fn from_yaml_str(body: &str) -> Result<Self> {
        serde_yaml::from_str(body).context("invalid scan configuration")
    }

    /// # Errors
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&body)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// # Errors
    /// Returns [`KernelError::Validation`] when the configured catalog is empty or invalid.
    pub fn engine(&self) -> Result<Engine, KernelError> {
        let catalog = Catalog::new(&self.catalog)?;
        let mut corrections = CorrectionTable::default();
        corrections.extend(&self.corrections);
        Ok(Engine::new(catalog, corrections, self.fuzzy_padding))
    }
}
