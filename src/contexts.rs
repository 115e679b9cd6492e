//! Workflow runtime contexts and expression functions
//!
//! Each context root comes with a [`Shape`] describing which attributes may be
//! navigated from it. Closed shapes reject unknown names; maps accept any key.

use crate::expr::{Expr, Operand, NEEDS_MARKER};
use crate::schema::key;

/// Navigable structure of a context node.
#[derive(Debug)]
pub enum Shape {
    /// Scalar value, no attributes
    Leaf,
    /// Anything goes below this point
    Open,
    /// Arbitrary keys, each with the same shape
    Map(&'static Shape),
    /// Fixed set of attributes
    Closed(&'static [(&'static str, Shape)]),
}

impl Shape {
    /// Resolve an attribute name, returning the rendered segment and its shape.
    pub(crate) fn child(&'static self, name: &str) -> Option<(String, &'static Shape)> {
        match self {
            Shape::Leaf => None,
            Shape::Open => Some((name.to_string(), &Shape::Open)),
            Shape::Map(element) => Some((name.to_string(), *element)),
            Shape::Closed(fields) => {
                let dashed = key(name, false);
                fields
                    .iter()
                    .find(|(field, _)| *field == name)
                    .or_else(|| fields.iter().find(|(field, _)| *field == dashed))
                    .map(|(field, shape)| (field.to_string(), shape))
            }
        }
    }

    /// Shape of a wildcard or indexed element.
    pub(crate) fn element(&'static self) -> Option<&'static Shape> {
        match self {
            Shape::Leaf => None,
            Shape::Open => Some(&Shape::Open),
            Shape::Map(element) => Some(*element),
            Shape::Closed(_) => Some(&Shape::Open),
        }
    }

    pub(crate) fn describe_fields(&self) -> String {
        match self {
            Shape::Closed(fields) => {
                let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
                format!(", expected one of: {}", names.join(", "))
            }
            _ => String::new(),
        }
    }
}

const OUTPUTS: Shape = Shape::Map(&Shape::Leaf);

static GITHUB: Shape = Shape::Closed(&[
    ("action", Shape::Leaf),
    ("action_path", Shape::Leaf),
    ("action_ref", Shape::Leaf),
    ("action_repository", Shape::Leaf),
    ("action_status", Shape::Leaf),
    ("actor", Shape::Leaf),
    ("actor_id", Shape::Leaf),
    ("api_url", Shape::Leaf),
    ("base_ref", Shape::Leaf),
    ("env", Shape::Leaf),
    ("event", Shape::Open),
    ("event_name", Shape::Leaf),
    ("event_path", Shape::Leaf),
    ("graphql_url", Shape::Leaf),
    ("head_ref", Shape::Leaf),
    ("job", Shape::Leaf),
    ("path", Shape::Leaf),
    ("ref", Shape::Leaf),
    ("ref_name", Shape::Leaf),
    ("ref_protected", Shape::Leaf),
    ("ref_type", Shape::Leaf),
    ("repository", Shape::Leaf),
    ("repository_id", Shape::Leaf),
    ("repository_owner", Shape::Leaf),
    ("repository_owner_id", Shape::Leaf),
    ("repositoryUrl", Shape::Leaf),
    ("retention_days", Shape::Leaf),
    ("run_id", Shape::Leaf),
    ("run_number", Shape::Leaf),
    ("run_attempt", Shape::Leaf),
    ("secret_source", Shape::Leaf),
    ("server_url", Shape::Leaf),
    ("sha", Shape::Leaf),
    ("token", Shape::Leaf),
    ("triggering_actor", Shape::Leaf),
    ("workflow", Shape::Leaf),
    ("workflow_ref", Shape::Leaf),
    ("workflow_sha", Shape::Leaf),
    ("workspace", Shape::Leaf),
]);

static ENV: Shape = Shape::Map(&Shape::Leaf);

static VARS: Shape = Shape::Map(&Shape::Leaf);

static JOB: Shape = Shape::Closed(&[
    (
        "container",
        Shape::Closed(&[("id", Shape::Leaf), ("network", Shape::Leaf)]),
    ),
    (
        "services",
        Shape::Map(&Shape::Closed(&[
            ("id", Shape::Leaf),
            ("network", Shape::Leaf),
            ("ports", OUTPUTS),
        ])),
    ),
    ("status", Shape::Leaf),
]);

static JOBS: Shape = Shape::Map(&Shape::Closed(&[("result", Shape::Leaf), ("outputs", OUTPUTS)]));

static STEPS: Shape = Shape::Map(&Shape::Closed(&[
    ("outputs", OUTPUTS),
    ("conclusion", Shape::Leaf),
    ("outcome", Shape::Leaf),
]));

static RUNNER: Shape = Shape::Closed(&[
    ("name", Shape::Leaf),
    ("os", Shape::Leaf),
    ("arch", Shape::Leaf),
    ("temp", Shape::Leaf),
    ("tool_cache", Shape::Leaf),
    ("debug", Shape::Leaf),
    ("environment", Shape::Leaf),
]);

static SECRETS: Shape = Shape::Map(&Shape::Leaf);

static STRATEGY: Shape = Shape::Closed(&[
    ("fail-fast", Shape::Leaf),
    ("job-index", Shape::Leaf),
    ("job-total", Shape::Leaf),
    ("max-parallel", Shape::Leaf),
]);

static MATRIX: Shape = Shape::Map(&Shape::Open);

pub(crate) static NEEDS: Shape =
    Shape::Map(&Shape::Closed(&[("result", Shape::Leaf), ("outputs", OUTPUTS)]));

static INPUTS: Shape = Shape::Map(&Shape::Leaf);

/// `github` context
pub fn github() -> Expr {
    Expr::root("github", &GITHUB)
}

/// `env` context
pub fn env() -> Expr {
    Expr::root("env", &ENV)
}

/// `vars` context
pub fn vars() -> Expr {
    Expr::root("vars", &VARS)
}

/// `job` context (the running job, not a job handle)
pub fn job() -> Expr {
    Expr::root("job", &JOB)
}

/// `jobs` context, only available in `workflow_call` outputs
pub fn jobs() -> Expr {
    Expr::root("jobs", &JOBS)
}

/// `steps` context
pub fn steps() -> Expr {
    Expr::root("steps", &STEPS)
}

/// `runner` context
pub fn runner() -> Expr {
    Expr::root("runner", &RUNNER)
}

/// `secrets` context
pub fn secrets() -> Expr {
    Expr::root("secrets", &SECRETS)
}

/// `strategy` context
pub fn strategy() -> Expr {
    Expr::root("strategy", &STRATEGY)
}

/// `matrix` context
pub fn matrix() -> Expr {
    Expr::root("matrix", &MATRIX)
}

/// `needs` context
pub fn needs() -> Expr {
    Expr::root("needs", &NEEDS)
}

/// `inputs` context
pub fn inputs() -> Expr {
    Expr::root("inputs", &INPUTS)
}

/// `needs.<id>` as produced by job handles.
pub(crate) fn job_handle(id: &str) -> Expr {
    Expr::root(NEEDS_MARKER, &NEEDS).field(id)
}

/// Path-expression for a context element given as plain segments.
pub(crate) fn context_path(root: &str, rest: &[&str]) -> Expr {
    let mut expr = match root {
        "steps" => steps(),
        "inputs" => inputs(),
        "secrets" => secrets(),
        "job" => job(),
        "strategy" => strategy(),
        "matrix" => matrix(),
        _ => Expr::root(root, &Shape::Open),
    };
    for segment in rest {
        expr = expr.field(segment);
    }
    expr
}

/// Built-in expression functions
pub mod functions {
    use super::*;

    /// `always()`
    pub fn always() -> Expr {
        Expr::function("always", Vec::new())
    }

    /// `success()`
    pub fn success() -> Expr {
        Expr::function("success", Vec::new())
    }

    /// `failure()`
    pub fn failure() -> Expr {
        Expr::function("failure", Vec::new())
    }

    /// `cancelled()`
    pub fn cancelled() -> Expr {
        Expr::function("cancelled", Vec::new())
    }

    #[track_caller]
    pub fn contains(search: impl Into<Operand>, item: impl Into<Operand>) -> Expr {
        Expr::function("contains", vec![search.into(), item.into()])
    }

    #[track_caller]
    pub fn starts_with(search: impl Into<Operand>, item: impl Into<Operand>) -> Expr {
        Expr::function("startsWith", vec![search.into(), item.into()])
    }

    #[track_caller]
    pub fn ends_with(search: impl Into<Operand>, item: impl Into<Operand>) -> Expr {
        Expr::function("endsWith", vec![search.into(), item.into()])
    }

    /// `format(template, args...)`
    #[track_caller]
    pub fn format(template: impl Into<Operand>, args: Vec<Operand>) -> Expr {
        let mut all = vec![template.into()];
        all.extend(args);
        Expr::function("format", all)
    }

    #[track_caller]
    pub fn join(array: impl Into<Operand>, separator: impl Into<Operand>) -> Expr {
        Expr::function("join", vec![array.into(), separator.into()])
    }

    #[track_caller]
    pub fn to_json(value: impl Into<Operand>) -> Expr {
        Expr::function("toJSON", vec![value.into()])
    }

    #[track_caller]
    pub fn from_json(value: impl Into<Operand>) -> Expr {
        Expr::function("fromJson", vec![value.into()])
    }

    #[track_caller]
    pub fn hash_files(patterns: Vec<Operand>) -> Expr {
        Expr::function("hashFiles", patterns)
    }
}
