//! ghgen - GitHub Actions workflows generated from Rust code
//!
//! ```ignore
//! let workflow = ghgen::build("check", |w| {
//!     w.on().pull_request().branches(["main"]);
//!     w.uses("actions/checkout@v4");
//!     w.run("cargo test");
//! })?;
//! print!("{}", workflow.to_yaml());
//! ```

pub mod builder;
pub mod config;
pub mod contexts;
pub mod element;
pub mod error;
pub mod expr;
pub mod generate;
pub mod generic;
pub mod rules;
pub mod schema;
pub mod template;
pub mod validator;
pub mod workflow;
pub mod workflows;

pub use builder::{build, build_with, Gen, JobHandle, Step, Workflow};
pub use config::{Catalog, Config};
pub use contexts::functions;
pub use element::Value;
pub use error::{Error, FixSuggestion, GenerationError, GhgenError};
pub use expr::{AsExpr, Expr};
pub use generate::{Definition, Generator};
pub use generic::Generic;
