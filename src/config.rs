//! Generator configuration (v0.1)
//!
//! Read from `gh-gen.yml` at the project root. Every key is optional:
//!
//! ```yaml
//! output-directory: .github/workflows
//! trusted-owners: [actions, astral-sh]
//! uses:
//!   checkout: actions/checkout@v4
//!   setup-uv:
//!     uses: astral-sh/setup-uv@v5
//!     name: Set up uv
//!     pin: 0c5e2b8115b80b4c7c5ddf6ffdd634974642d182
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GhgenError;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "gh-gen.yml";

/// Default output directory for generated workflows.
pub const DEFAULT_OUTPUT_DIRECTORY: &str = ".github/workflows";

static ACTION_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.-]+/[\w./-]+@[\w./-]+$").expect("valid regex"));

static COMMIT_SHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{40}$").expect("valid regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    /// Where generated files go (`.github/workflows` by default)
    #[serde(default)]
    pub output_directory: Option<PathBuf>,

    /// Owners whose actions may be referenced by tag rather than commit
    #[serde(default = "default_trusted_owners")]
    pub trusted_owners: Vec<String>,

    /// Short action names usable with `uses`
    #[serde(default)]
    pub uses: BTreeMap<String, UsesEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_directory: None,
            trusted_owners: default_trusted_owners(),
            uses: BTreeMap::new(),
        }
    }
}

fn default_trusted_owners() -> Vec<String> {
    vec!["actions".to_string()]
}

/// A catalog entry: either a bare reference or a detailed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsesEntry {
    Short(String),
    Detailed(DetailedUses),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedUses {
    pub uses: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Commit replacing the reference's tag
    #[serde(default)]
    pub pin: Option<String>,
}

impl Config {
    /// Load a configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, GhgenError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|details| GhgenError::InvalidConfig {
            path: path.to_path_buf(),
            details,
        })
    }

    /// Parse configuration text; an empty document yields the defaults.
    pub fn parse(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn output_directory(&self) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIRECTORY))
    }

    /// Build the action catalog, validating every reference.
    pub fn catalog(&self) -> Result<Catalog, GhgenError> {
        let mut entries = BTreeMap::new();
        for (name, entry) in &self.uses {
            let resolved = match entry {
                UsesEntry::Short(uses) => CatalogEntry {
                    uses: uses.clone(),
                    name: None,
                },
                UsesEntry::Detailed(detailed) => CatalogEntry {
                    uses: pinned(&detailed.uses, detailed.pin.as_deref()),
                    name: detailed.name.clone(),
                },
            };
            if !is_valid_reference(&resolved.uses) {
                return Err(GhgenError::InvalidCatalogEntry {
                    name: name.clone(),
                    uses: resolved.uses,
                });
            }
            entries.insert(name.clone(), resolved);
        }
        Ok(Catalog {
            entries,
            trusted_owners: self.trusted_owners.clone(),
        })
    }
}

fn pinned(uses: &str, pin: Option<&str>) -> String {
    match (pin, uses.split_once('@')) {
        (Some(pin), Some((repository, _))) => format!("{repository}@{pin}"),
        (Some(pin), None) => format!("{uses}@{pin}"),
        (None, _) => uses.to_string(),
    }
}

/// Local actions, docker images, or `owner/repo[/path]@ref`.
fn is_valid_reference(uses: &str) -> bool {
    uses.starts_with("./") || uses.starts_with("docker://") || ACTION_REF.is_match(uses)
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub uses: String,
    pub name: Option<String>,
}

/// Short action names resolved by step `uses`.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
    trusted_owners: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            trusted_owners: default_trusted_owners(),
        }
    }
}

impl Catalog {
    /// Register an entry directly.
    pub fn insert(&mut self, name: impl Into<String>, uses: impl Into<String>) {
        self.entries.insert(
            name.into(),
            CatalogEntry {
                uses: uses.into(),
                name: None,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    /// Resolve a step `uses` argument: catalog names map to their entry,
    /// anything else is taken as a literal reference.
    pub fn resolve(&self, reference: &str) -> CatalogEntry {
        self.entries
            .get(reference)
            .cloned()
            .unwrap_or_else(|| CatalogEntry {
                uses: reference.to_string(),
                name: None,
            })
    }

    /// Whether a reference points at a remote action from an untrusted owner
    /// without being pinned to a full commit.
    pub fn is_unpinned(&self, uses: &str) -> bool {
        if uses.starts_with("./") || uses.starts_with("docker://") {
            return false;
        }
        let Some((repository, reference)) = uses.split_once('@') else {
            return true;
        };
        let owner = repository.split('/').next().unwrap_or_default();
        let trusted = self.trusted_owners.iter().any(|t| t == owner);
        !trusted && !COMMIT_SHA.is_match(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.trusted_owners, vec!["actions"]);
        assert_eq!(config.output_directory(), PathBuf::from(".github/workflows"));
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
output-directory: ci/out
trusted-owners: [actions, astral-sh]
uses:
  checkout: actions/checkout@v4
  setup-uv:
    uses: astral-sh/setup-uv@v5
    name: Set up uv
"#,
        )
        .unwrap();
        assert_eq!(config.output_directory(), PathBuf::from("ci/out"));
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.resolve("checkout").uses, "actions/checkout@v4");
        let setup = catalog.resolve("setup-uv");
        assert_eq!(setup.uses, "astral-sh/setup-uv@v5");
        assert_eq!(setup.name.as_deref(), Some("Set up uv"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let error = Config::parse("outputs: x").unwrap_err();
        assert!(error.contains("unknown field"));
    }

    #[test]
    fn test_pin_replaces_reference() {
        let config = Config::parse(
            "uses:\n  cache:\n    uses: actions/cache@v4\n    pin: 0123456789abcdef0123456789abcdef01234567\n",
        )
        .unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(
            catalog.resolve("cache").uses,
            "actions/cache@0123456789abcdef0123456789abcdef01234567"
        );
    }

    #[test]
    fn test_invalid_catalog_entry() {
        let config = Config::parse("uses:\n  broken: not a reference\n").unwrap();
        let error = config.catalog().unwrap_err();
        assert!(matches!(error, GhgenError::InvalidCatalogEntry { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_resolve_unknown_is_literal() {
        let catalog = Catalog::default();
        let entry = catalog.resolve("./my_action");
        assert_eq!(entry.uses, "./my_action");
        assert!(entry.name.is_none());
    }

    #[test]
    fn test_unpinned_detection() {
        let catalog = Catalog::default();
        assert!(!catalog.is_unpinned("actions/checkout@v4"));
        assert!(!catalog.is_unpinned("./local"));
        assert!(catalog.is_unpinned("someone/tool@v1"));
        assert!(!catalog.is_unpinned("someone/tool@0123456789abcdef0123456789abcdef01234567"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert!(config.uses.is_empty());
    }
}
