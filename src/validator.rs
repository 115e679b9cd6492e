//! Context-path validation
//!
//! Three grammars built on [`RuleSet`] check the context paths referenced by
//! every value written into a workflow:
//! 1. availability: which contexts may be used at a given position
//! 2. step references: `steps.<id>` must name a step visible from there
//! 3. matrix keys: `matrix.<key>` must be declared by the job's matrix
//!
//! Grammar 1 also collects the jobs referenced through `needs.<id>`, which
//! the builder adds to the current job's `needs`.

use std::fmt;

use crate::element::Value;
use crate::rules::{RuleSet, PLACEHOLDER};
use crate::template;

/// Where in the workflow a value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Workflow,
    Trigger,
    WorkflowCallOutput,
    Job,
    JobOutputs,
    /// Step at this index in its job
    Step(usize),
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Workflow => f.write_str("a workflow field"),
            Position::Trigger => f.write_str("a trigger"),
            Position::WorkflowCallOutput => f.write_str("a `workflow_call` output"),
            Position::Job => f.write_str("a job field"),
            Position::JobOutputs => f.write_str("job outputs"),
            Position::Step(_) => f.write_str("a step"),
        }
    }
}

/// Matrix declared by the current job.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MatrixKeys {
    #[default]
    Missing,
    /// Matrix given as an expression, keys unknown
    Dynamic,
    Keys(Vec<String>),
}

/// What the rules need to know about the surroundings of a write, plus
/// what they report back.
#[derive(Debug, Clone)]
pub struct RuleEnv {
    pub position: Position,
    pub job: Option<String>,
    /// Jobs defined so far in the workflow
    pub jobs: Vec<String>,
    /// Step ids visible from the position
    pub steps: Vec<String>,
    /// Declared input ids
    pub inputs: Vec<String>,
    pub matrix: MatrixKeys,
    /// Jobs referenced through `needs.<id>`
    pub needs: Vec<String>,
    pub messages: Vec<String>,
}

impl RuleEnv {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            job: None,
            jobs: Vec::new(),
            steps: Vec::new(),
            inputs: Vec::new(),
            matrix: MatrixKeys::Missing,
            needs: Vec::new(),
            messages: Vec::new(),
        }
    }

    fn job_name(&self) -> &str {
        self.job.as_deref().unwrap_or("?")
    }

    fn require(&mut self, context: &str, allowed: bool) -> bool {
        if !allowed {
            self.messages
                .push(format!("`{context}` cannot be used in {}", self.position));
        }
        allowed
    }

    fn fail(&mut self, message: String) -> bool {
        self.messages.push(message);
        false
    }

    fn in_job(&self) -> bool {
        matches!(
            self.position,
            Position::Job | Position::JobOutputs | Position::Step(_)
        )
    }

    fn in_step(&self) -> bool {
        matches!(self.position, Position::JobOutputs | Position::Step(_))
    }

    fn need(&mut self, id: &str) -> bool {
        if id == PLACEHOLDER {
            return true;
        }
        if self.job.as_deref() == Some(id) {
            return self.fail(format!("job `{id}` cannot need itself"));
        }
        if !self.jobs.iter().any(|job| job == id) {
            return self.fail(format!(
                "`needs.{id}` refers to an unknown job, jobs must be defined before being referenced"
            ));
        }
        if !self.needs.iter().any(|job| job == id) {
            self.needs.push(id.to_string());
        }
        true
    }
}

// ============================================================================
// GRAMMARS
// ============================================================================

/// Grammar 1: context availability by position.
pub fn availability() -> RuleSet<RuleEnv> {
    RuleSet::<RuleEnv>::new()
        .rule("needs", |_, env| {
            let allowed = env.in_job();
            env.require("needs", allowed)
        })
        .rule("needs.*", |captures, env| env.need(captures[0]))
        .rule("jobs", |_, env| {
            let allowed = env.position == Position::WorkflowCallOutput;
            env.require("jobs", allowed)
        })
        .rule("jobs.*", |captures, env| {
            let id = captures[0];
            if id == PLACEHOLDER || env.jobs.iter().any(|job| job == id) {
                true
            } else {
                env.fail(format!("`jobs.{id}` refers to an unknown job"))
            }
        })
        .rule("steps", |_, env| {
            let allowed = env.in_step();
            env.require("steps", allowed)
        })
        .rule("job", |_, env| {
            let allowed = env.in_step();
            env.require("job", allowed)
        })
        .rule("runner", |_, env| {
            let allowed = matches!(env.position, Position::Step(_));
            env.require("runner", allowed)
        })
        .rule("env", |_, env| {
            let allowed = env.in_step();
            env.require("env", allowed)
        })
        .rule("strategy", |_, env| {
            let allowed = env.in_job();
            env.require("strategy", allowed)
        })
        .rule("matrix", |_, env| {
            let allowed = env.in_job();
            env.require("matrix", allowed)
        })
        .rule("secrets", |_, env| {
            let allowed = !matches!(
                env.position,
                Position::Trigger | Position::WorkflowCallOutput
            );
            env.require("secrets", allowed)
        })
        .rule("inputs.*", |captures, env| {
            let id = captures[0];
            if id == PLACEHOLDER || env.inputs.iter().any(|input| input == id) {
                true
            } else {
                env.fail(format!(
                    "input `{id}` is not declared on `workflow_dispatch` or `workflow_call`"
                ))
            }
        })
}

/// Grammar 2: `steps.<id>` must name a step visible from the position.
pub fn step_references() -> RuleSet<RuleEnv> {
    RuleSet::<RuleEnv>::new().rule("steps.*", |captures, env| {
        let id = captures[0];
        if id == PLACEHOLDER || env.steps.iter().any(|step| step == id) {
            return true;
        }
        let message = match env.position {
            Position::Step(_) => format!(
                "step `{id}` is not defined before this step in job `{}`",
                env.job_name()
            ),
            _ => format!("step `{id}` is not defined in job `{}`", env.job_name()),
        };
        env.fail(message)
    })
}

/// Grammar 3: `matrix.<key>` must be declared by the job's matrix.
pub fn matrix_keys() -> RuleSet<RuleEnv> {
    RuleSet::<RuleEnv>::new()
        .rule("matrix", |_, env| {
            if env.matrix == MatrixKeys::Missing {
                let message = format!(
                    "`matrix` is used in job `{}` which has no `strategy.matrix`",
                    env.job_name()
                );
                return env.fail(message);
            }
            true
        })
        .rule("matrix.*", |captures, env| {
            let key = captures[0];
            let known = match &env.matrix {
                MatrixKeys::Missing => false,
                MatrixKeys::Dynamic => true,
                MatrixKeys::Keys(keys) => key == PLACEHOLDER || keys.iter().any(|k| k == key),
            };
            if known {
                return true;
            }
            let message = format!(
                "`matrix.{key}` is not a key of the matrix of job `{}`",
                env.job_name()
            );
            env.fail(message)
        })
}

/// Run all grammars in order, stopping at the first that rejects.
pub fn check(refs: &[Vec<String>], env: &mut RuleEnv) -> bool {
    [availability(), step_references(), matrix_keys()]
        .iter()
        .all(|grammar| grammar.validate(refs, env))
}

/// Context paths referenced by a value, through expressions and
/// interpolated strings at any depth.
pub fn references(value: &Value) -> Vec<Vec<String>> {
    let mut refs = Vec::new();
    collect(value, &mut refs);
    refs
}

fn collect(value: &Value, refs: &mut Vec<Vec<String>>) {
    match value {
        Value::Expr(expr) => refs.extend(expr.refs().iter().cloned()),
        Value::Str(text) => refs.extend(template::references(text)),
        Value::List(items) => items.iter().for_each(|item| collect(item, refs)),
        Value::Map(entries) => entries.iter().for_each(|(_, item)| collect(item, refs)),
        Value::Element(element) => {
            for name in element.schema().fields.iter().map(|field| field.name) {
                if let Some(item) = element.get(name) {
                    collect(item, refs);
                }
            }
        }
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => {}
    }
}
