//! Job builders
//!
//! Job-level calls apply to the job opened by the enclosing [`Gen::job`],
//! or to the implicit job when used directly in a workflow body.

use std::fmt;

use crate::contexts::job_handle;
use crate::element::Value;
use crate::expr::{AsExpr, Expr};

use super::step::Step;
use super::{Gen, Path, Scope};

/// Handle returned by [`Gen::job`], reading back as `needs.<id>`.
///
/// Referencing it from another job adds the job to that job's `needs`.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: String,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `needs.<id>.result`
    pub fn result(&self) -> Expr {
        job_handle(&self.id).field("result")
    }

    /// `needs.<id>.outputs`
    pub fn outputs(&self) -> Expr {
        job_handle(&self.id).field("outputs")
    }

    /// `needs.<id>.outputs.<name>`
    pub fn output(&self, name: &str) -> Expr {
        self.outputs().field(name)
    }
}

impl AsExpr for JobHandle {
    fn as_expr(&self) -> Expr {
        job_handle(&self.id)
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_expr())
    }
}

impl Gen {
    /// Declare a job; calls made inside `f` apply to it.
    #[track_caller]
    pub fn job(&self, id: &str, f: impl FnOnce(&Gen)) -> JobHandle {
        self.ctx.enter();
        let root = self.ctx.open_job(id);
        tracing::debug!(workflow = %self.ctx.workflow_id, job = id, "building job");
        let saved = self.ctx.enter_job(root);
        f(self);
        self.ctx.leave_job(saved);
        JobHandle { id: id.to_string() }
    }

    /// Root of the current job, creating the implicit one if needed.
    fn job_root(&self, what: &str) -> Option<Path> {
        self.ctx.scope(Scope::Job, what).map(Path::new)
    }

    #[track_caller]
    pub fn runs_on(&self, runner: impl Into<Value>) -> &Self {
        self.ctx.enter();
        let Some(path) = self.job_root("runs_on") else {
            return self;
        };
        if self.ctx.has(&path, "uses") {
            let job = path.root().job_id().unwrap_or_default();
            self.ctx.error(format!(
                "job `{job}` cannot set `runs-on` as it has already specified `uses` (with `call`)"
            ));
            return self;
        }
        self.ctx.update(&path, "runs_on", runner);
        self
    }

    /// Job condition, emitted without `${{ }}`.
    #[track_caller]
    pub fn if_(&self, condition: impl Into<Value>) -> &Self {
        self.ctx.enter();
        if let Some(path) = self.job_root("if_") {
            self.ctx.update(&path, "if_", condition);
        }
        self
    }

    #[track_caller]
    pub fn timeout_minutes(&self, minutes: impl Into<Value>) -> &Self {
        self.ctx.enter();
        if let Some(path) = self.job_root("timeout_minutes") {
            self.ctx.update(&path, "timeout_minutes", minutes);
        }
        self
    }

    /// Named outputs of the current job.
    #[track_caller]
    pub fn outputs<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.ctx.enter();
        if let Some(path) = self.job_root("outputs") {
            self.ctx.update(&path, "outputs", Value::map(pairs));
        }
        self
    }

    /// Re-export every output declared on a step under the same names.
    #[track_caller]
    pub fn outputs_of(&self, step: &Step) -> &Self {
        self.ctx.enter();
        let Some(path) = self.job_root("outputs") else {
            return self;
        };
        let names = step.declared_outputs();
        if names.is_empty() {
            self.ctx.error(format!(
                "step `{}` passed to `outputs`, but no outputs were declared on it. Use `returns()` to do so",
                step.ensure_id()
            ));
            return self;
        }
        let outputs: Vec<(String, Value)> = names
            .into_iter()
            .map(|name| {
                let value = Value::Expr(step.output(&name));
                (name, value)
            })
            .collect();
        self.ctx.update(&path, "outputs", Value::Map(outputs));
        self
    }

    /// Output named after the last segment of a context path, e.g.
    /// `matrix.a` becomes output `a`.
    #[track_caller]
    pub fn output(&self, value: impl AsExpr) -> &Self {
        self.ctx.enter();
        let Some(path) = self.job_root("outputs") else {
            return self;
        };
        let expr = value.as_expr();
        if !expr.settle() {
            return self;
        }
        match expr.path().and_then(|segments| segments.last()) {
            Some(name) => {
                let name = name.clone();
                self.ctx
                    .update(&path, "outputs", Value::map([(name, expr)]));
            }
            None => self.ctx.error(format!(
                "unsupported unnamed output `{expr}`, must be a context field or a step"
            )),
        }
        self
    }

    /// Jobs the current job depends on.
    #[track_caller]
    pub fn needs<J: AsExpr>(&self, jobs: impl IntoIterator<Item = J>) -> &Self {
        self.ctx.enter();
        if let Some(path) = self.job_root("needs") {
            let jobs = jobs.into_iter().map(|job| job.as_expr()).collect();
            self.ctx.needs(path.root(), jobs);
        }
        self
    }

    /// Make the current job call a reusable workflow.
    #[track_caller]
    pub fn call(&self, target: &str) -> &Self {
        self.ctx.enter();
        let Some(path) = self.job_root("uses") else {
            return self;
        };
        let job = path.root().job_id().unwrap_or_default().to_string();
        if self.ctx.has(&path, "uses") {
            self.ctx
                .error(format!("job `{job}` has already specified `uses` (with `call`)"));
        } else if self.ctx.has(&path, "steps") {
            self.ctx
                .error(format!("job `{job}` specifies both `uses` (with `call`) and steps"));
        } else if self.ctx.has(&path, "runs_on") {
            self.ctx.error(format!(
                "job `{job}` specifies both `uses` (with `call`) and `runs-on`"
            ));
        } else {
            self.ctx.update(&path, "uses", target);
        }
        self
    }

    /// Arguments of the reusable workflow call, keys taken verbatim.
    #[track_caller]
    pub fn with<K, V>(&self, args: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.ctx.enter();
        let Some(path) = self.job_root("with") else {
            return self;
        };
        if !self.ctx.has(&path, "uses") {
            let job = path.root().job_id().unwrap_or_default();
            self.ctx.error(format!(
                "job `{job}` must specify `uses` (via `call`) in order to specify `with`"
            ));
            return self;
        }
        self.ctx.update(&path, "with_", Value::map(args));
        self
    }

    /// Pass every secret of the caller to the called workflow.
    #[track_caller]
    pub fn secrets_inherit(&self) -> &Self {
        self.ctx.enter();
        if let Some(path) = self.job_root("secrets") {
            self.ctx.update(&path, "secrets", "inherit");
        }
        self
    }

    /// Secrets passed to the called workflow.
    #[track_caller]
    pub fn secrets<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.ctx.enter();
        if let Some(path) = self.job_root("secrets") {
            self.ctx.update(&path, "secrets", Value::map(pairs));
        }
        self
    }
}
