//! Error types with fix suggestions (v0.1)

use std::fmt;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

// ============================================================================
// BUILD ERRORS
// ============================================================================

/// One problem found while building a workflow, keyed to the user call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub file: String,
    pub line: u32,
    pub workflow_id: Option<String>,
    pub message: String,
}

impl Error {
    pub fn at(
        location: &Location<'_>,
        workflow_id: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            workflow_id: workflow_id.map(String::from),
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.workflow_id.as_deref().unwrap_or("None");
        write!(f, "{}:{} [{}] {}", self.file, self.line, id, self.message)
    }
}

/// Every error accumulated while building one workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    pub errors: Vec<Error>,
}

impl GenerationError {
    pub fn new(errors: Vec<Error>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            write!(f, "\n{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GenerationError {}

// ============================================================================
// TOOL ERRORS
// ============================================================================

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum GhgenError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Configuration errors (GHGEN-010 to GHGEN-012)
    // ─────────────────────────────────────────────────────────────
    #[error("GHGEN-010: Invalid configuration in {path}: {details}")]
    InvalidConfig { path: PathBuf, details: String },

    #[error("GHGEN-011: Catalog entry '{name}' has an invalid reference '{uses}'")]
    InvalidCatalogEntry { name: String, uses: String },

    #[error("GHGEN-012: Invalid identifier '{id}'")]
    InvalidId { id: String },

    // ─────────────────────────────────────────────────────────────
    // Generation errors (GHGEN-020 to GHGEN-023)
    // ─────────────────────────────────────────────────────────────
    #[error("GHGEN-020: Unknown workflow '{id}' (available: {available})")]
    UnknownWorkflow { id: String, available: String },

    #[error("GHGEN-021: No workflows found")]
    NoWorkflows,

    #[error("GHGEN-022: Workflow '{id}' failed to build:{errors}")]
    Build { id: String, errors: GenerationError },

    #[error("GHGEN-023: {path} is out of date")]
    OutOfDate { path: PathBuf, diff: String },
}

impl FixSuggestion for GhgenError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            GhgenError::Json(_) => None,
            GhgenError::Io(_) => Some("Check file path and permissions"),
            GhgenError::InvalidConfig { .. } => Some(
                "Allowed keys are output-directory, trusted-owners and uses",
            ),
            GhgenError::InvalidCatalogEntry { .. } => {
                Some("Use the owner/repo@ref form, or a local ./path")
            }
            GhgenError::InvalidId { .. } => {
                Some("Identifiers start with a letter or _ and contain only letters, digits, - and _")
            }
            GhgenError::UnknownWorkflow { .. } => {
                Some("Run without arguments to generate every workflow")
            }
            GhgenError::NoWorkflows => Some("Register at least one workflow definition"),
            GhgenError::Build { .. } => Some("Fix the call sites listed above"),
            GhgenError::OutOfDate { .. } => Some("Run ghgen without --check to regenerate"),
        }
    }
}
