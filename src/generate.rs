//! Workflow generation (v0.1)
//!
//! Renders registered [`Definition`]s to `<output-directory>/<id>.yml`, or
//! compares them against the files already on disk in check mode.
//!
//! Files are written to `<id>.yml.tmp` first and renamed over the target, so
//! a failed run never leaves a half-written workflow behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use similar::TextDiff;

use crate::builder::{build_with, is_valid_id, Gen, Workflow};
use crate::config::{Catalog, Config};
use crate::error::GhgenError;

// ============================================================================
// DEFINITIONS
// ============================================================================

/// A workflow known to the generator.
#[derive(Clone, Copy)]
pub struct Definition {
    pub id: &'static str,
    /// Source file of the construction function, shown in the header comment
    pub source: &'static str,
    pub build: fn(&Gen),
}

impl Definition {
    pub const fn new(id: &'static str, source: &'static str, build: fn(&Gen)) -> Self {
        Self { id, source, build }
    }

    /// File name part of `source`.
    pub fn file_name(&self) -> &str {
        Path::new(self.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(self.source)
    }

    pub fn header(&self) -> String {
        format!("# generated from {}::{}\n", self.file_name(), self.id)
    }
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Definition")
            .field("id", &self.id)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Declare a [`Definition`] whose source is the current file.
///
/// ```ignore
/// const CHECK: Definition = ghgen::definition!("check", check);
/// ```
#[macro_export]
macro_rules! definition {
    ($id:literal, $build:expr) => {
        $crate::generate::Definition::new($id, file!(), $build)
    };
}

/// Pick the definitions named in `ids`, or all of them when `ids` is empty.
pub fn select<'a>(
    definitions: &'a [Definition],
    ids: &[String],
) -> Result<Vec<&'a Definition>, GhgenError> {
    if definitions.is_empty() {
        return Err(GhgenError::NoWorkflows);
    }
    if ids.is_empty() {
        return Ok(definitions.iter().collect());
    }
    ids.iter()
        .map(|id| {
            if !is_valid_id(id) {
                return Err(GhgenError::InvalidId { id: id.clone() });
            }
            definitions
                .iter()
                .find(|definition| definition.id == id)
                .ok_or_else(|| GhgenError::UnknownWorkflow {
                    id: id.clone(),
                    available: definitions
                        .iter()
                        .map(|definition| definition.id)
                        .collect::<Vec<_>>()
                        .join(", "),
                })
        })
        .collect()
}

// ============================================================================
// GENERATOR
// ============================================================================

pub struct Generator {
    catalog: Catalog,
    output_directory: PathBuf,
}

impl Generator {
    pub fn new(catalog: Catalog, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            output_directory: output_directory.into(),
        }
    }

    /// Generator for a loaded configuration, validating its catalog.
    pub fn from_config(config: &Config) -> Result<Self, GhgenError> {
        Ok(Self::new(config.catalog()?, config.output_directory()))
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn output_path(&self, definition: &Definition) -> PathBuf {
        self.output_directory.join(format!("{}.yml", definition.id))
    }

    pub fn build(&self, definition: &Definition) -> Result<Workflow, GhgenError> {
        build_with(definition.id, &self.catalog, definition.build).map_err(|errors| {
            GhgenError::Build {
                id: definition.id.to_string(),
                errors,
            }
        })
    }

    /// Full file content: header comment followed by the YAML document.
    pub fn render(&self, definition: &Definition) -> Result<String, GhgenError> {
        let workflow = self.build(definition)?;
        Ok(format!("{}{}", definition.header(), workflow.to_yaml()))
    }

    /// The workflow as a single-line JSON document.
    pub fn to_json(&self, definition: &Definition) -> Result<String, GhgenError> {
        let workflow = self.build(definition)?;
        Ok(serde_json::to_string(&workflow.to_generic())?)
    }

    /// Write the workflow file, replacing any previous version.
    pub fn write(&self, definition: &Definition) -> Result<PathBuf> {
        let content = self.render(definition)?;
        fs::create_dir_all(&self.output_directory).with_context(|| {
            format!(
                "failed to create output directory {}",
                self.output_directory.display()
            )
        })?;
        let output = self.output_path(definition);
        let tmp = output.with_extension("yml.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, &output) {
            // leave no tmp file behind
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("failed to replace {}", output.display()));
        }
        tracing::info!(workflow = definition.id, path = %output.display(), "wrote workflow");
        Ok(output)
    }

    /// Compare the workflow file with what would be generated, writing
    /// nothing. A missing file counts as empty.
    pub fn check(&self, definition: &Definition) -> Result<PathBuf> {
        let content = self.render(definition)?;
        let output = self.output_path(definition);
        let current = match fs::read_to_string(&output) {
            Ok(current) => current,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", output.display()))
            }
        };
        if current == content {
            tracing::debug!(workflow = definition.id, "up to date");
            return Ok(output);
        }
        let diff = unified_diff(&current, &content, &output);
        Err(GhgenError::OutOfDate { path: output, diff }.into())
    }
}

/// Unified diff from the file on disk to the generated content.
pub fn unified_diff(current: &str, generated: &str, path: &Path) -> String {
    let name = path.display().to_string();
    let diff = TextDiff::from_lines(current, generated);
    let mut unified = diff.unified_diff();
    unified
        .context_radius(3)
        .header(&name, &format!("{name} (generated)"));
    unified.to_string()
}
