//! Trigger builders
//!
//! [`Gen::on`] returns an [`On`] handle; each trigger method creates the
//! trigger on first use and returns a handle configuring it. Repeated calls
//! merge into the same trigger.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::element::Value;
use crate::expr::{AsExpr, Expr};
use crate::schema::Ty;
use crate::template::dedent;
use crate::workflow::ON;

use super::{Context, Entry, Path, Target};

static INTERPOLATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{\{(.*?)\}\}").expect("valid regex"));
static NEEDS_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w.-])needs\.").expect("valid regex"));

/// Rewrite `needs.<job>` references inside the interpolations of `text`.
fn needs_to_jobs(text: &str) -> String {
    INTERPOLATION
        .replace_all(text, |caps: &Captures| {
            format!("${{{{{}}}}}", NEEDS_PATH.replace_all(&caps[1], "${1}jobs."))
        })
        .into_owned()
}

fn strings<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Value {
    Value::List(items.into_iter().map(|item| Value::Str(item.into())).collect())
}

// ============================================================================
// ON
// ============================================================================

/// Handle to the `on` section of the workflow.
#[derive(Clone)]
pub struct On {
    target: Target,
}

impl On {
    pub(crate) fn new(ctx: &Rc<Context>, path: Option<Path>) -> Self {
        Self {
            target: Target::new(ctx, path),
        }
    }

    fn trigger(&self, name: &'static str) -> Target {
        let path = self.target.path().map(|on| on.field(name));
        Target::new(self.target.ctx(), path)
    }

    fn present(&self, name: &str) -> bool {
        self.target
            .path()
            .is_some_and(|on| self.target.ctx().has(on, name))
    }

    #[track_caller]
    pub fn pull_request(&self) -> PullRequest {
        self.target.ctx().enter();
        PullRequest {
            target: self.trigger("pull_request"),
        }
    }

    #[track_caller]
    pub fn pull_request_target(&self) -> PullRequest {
        self.target.ctx().enter();
        PullRequest {
            target: self.trigger("pull_request_target"),
        }
    }

    #[track_caller]
    pub fn push(&self) -> Push {
        self.target.ctx().enter();
        Push {
            target: self.trigger("push"),
        }
    }

    #[track_caller]
    pub fn workflow_dispatch(&self) -> WorkflowDispatch {
        self.target.ctx().enter();
        WorkflowDispatch {
            target: self.trigger("workflow_dispatch"),
        }
    }

    #[track_caller]
    pub fn workflow_call(&self) -> WorkflowCall {
        self.target.ctx().enter();
        WorkflowCall {
            target: self.trigger("workflow_call"),
        }
    }

    /// Add a cron schedule.
    #[track_caller]
    pub fn schedule(&self, cron: &str) -> &Self {
        let ctx = self.target.ctx();
        ctx.enter();
        let paths = self.target.path().cloned().into_iter().collect();
        Entry::append(ctx, paths, "schedule", "schedule").set("cron", cron);
        self
    }

    /// Any other trigger, by its YAML name.
    #[track_caller]
    pub fn event(&self, name: &str) -> Event {
        let ctx = self.target.ctx();
        ctx.enter();
        let field = match ON.field(name) {
            Some((_, field)) if matches!(field.ty, Ty::Record(_)) => Some(field),
            Some(_) => {
                ctx.error(format!(
                    "trigger `{name}` has its own method, use `on().{name}(...)`"
                ));
                None
            }
            None => {
                ctx.error(format!("unknown trigger `{name}`"));
                None
            }
        };
        match field {
            Some(field) => Event {
                target: self.trigger(field.name),
                name: field.name,
                typed: field
                    .ty
                    .record()
                    .is_some_and(|record| record.field("types").is_some()),
            },
            None => Event {
                target: Target::new(ctx, None),
                name: "",
                typed: true,
            },
        }
    }

    /// Declare an input on every `workflow_call` and `workflow_dispatch`
    /// trigger already set.
    #[track_caller]
    pub fn input(&self) -> Input {
        let ctx = self.target.ctx();
        ctx.enter();
        let paths: Vec<Path> = match self.target.path() {
            Some(on) => ["workflow_call", "workflow_dispatch"]
                .into_iter()
                .filter(|trigger| self.present(trigger))
                .map(|trigger| on.field(trigger))
                .collect(),
            None => Vec::new(),
        };
        if paths.is_empty() && self.target.path().is_some() {
            ctx.error(
                "`on.input` must be used after setting either `on.workflow_call` or `on.workflow_dispatch`",
            );
        }
        Input::append(ctx, paths)
    }
}

// ============================================================================
// TRIGGERS
// ============================================================================

/// Branch and path filters shared by `pull_request` and `push`.
macro_rules! filters {
    ($handle:ident) => {
        impl $handle {
            #[track_caller]
            pub fn branches<S: Into<String>>(&self, branches: impl IntoIterator<Item = S>) -> &Self {
                self.target.ctx().enter();
                self.target.set("branches", strings(branches));
                self
            }

            #[track_caller]
            pub fn ignore_branches<S: Into<String>>(
                &self,
                branches: impl IntoIterator<Item = S>,
            ) -> &Self {
                self.target.ctx().enter();
                self.target.set("branches_ignore", strings(branches));
                self
            }

            #[track_caller]
            pub fn paths<S: Into<String>>(&self, paths: impl IntoIterator<Item = S>) -> &Self {
                self.target.ctx().enter();
                self.target.set("paths", strings(paths));
                self
            }

            #[track_caller]
            pub fn ignore_paths<S: Into<String>>(&self, paths: impl IntoIterator<Item = S>) -> &Self {
                self.target.ctx().enter();
                self.target.set("paths_ignore", strings(paths));
                self
            }
        }
    };
}

/// `pull_request` or `pull_request_target`.
#[derive(Clone)]
pub struct PullRequest {
    target: Target,
}

impl PullRequest {
    /// Activity types, checked against the ones GitHub knows.
    #[track_caller]
    pub fn types<S: Into<String>>(&self, types: impl IntoIterator<Item = S>) -> &Self {
        self.target.ctx().enter();
        self.target.set("types", strings(types));
        self
    }
}

filters!(PullRequest);

#[derive(Clone)]
pub struct Push {
    target: Target,
}

impl Push {
    #[track_caller]
    pub fn tags<S: Into<String>>(&self, tags: impl IntoIterator<Item = S>) -> &Self {
        self.target.ctx().enter();
        self.target.set("tags", strings(tags));
        self
    }

    #[track_caller]
    pub fn ignore_tags<S: Into<String>>(&self, tags: impl IntoIterator<Item = S>) -> &Self {
        self.target.ctx().enter();
        self.target.set("tags_ignore", strings(tags));
        self
    }
}

filters!(Push);

/// A trigger set through [`On::event`].
#[derive(Clone)]
pub struct Event {
    target: Target,
    name: &'static str,
    typed: bool,
}

impl Event {
    #[track_caller]
    pub fn types<S: Into<String>>(&self, types: impl IntoIterator<Item = S>) -> &Self {
        let ctx = self.target.ctx();
        ctx.enter();
        if self.typed {
            self.target.set("types", strings(types));
        } else {
            ctx.error(format!("trigger `{}` does not accept `types`", self.name));
        }
        self
    }
}

#[derive(Clone)]
pub struct WorkflowDispatch {
    target: Target,
}

impl WorkflowDispatch {
    /// Declare an input of this trigger only.
    #[track_caller]
    pub fn input(&self) -> Input {
        self.target.ctx().enter();
        Input::append(self.target.ctx(), self.target.path().cloned().into_iter().collect())
    }
}

#[derive(Clone)]
pub struct WorkflowCall {
    target: Target,
}

impl WorkflowCall {
    /// Declare an input of this trigger only.
    #[track_caller]
    pub fn input(&self) -> Input {
        self.target.ctx().enter();
        Input::append(self.target.ctx(), self.paths())
    }

    #[track_caller]
    pub fn secret(&self) -> Secret {
        self.target.ctx().enter();
        Secret {
            entry: Entry::keyed(self.target.ctx(), self.paths(), "secrets", "secret"),
        }
    }

    /// Declare an output; its value is set with [`Output::value`], usually
    /// once the jobs producing it exist.
    #[track_caller]
    pub fn output(&self) -> Output {
        self.target.ctx().enter();
        Output {
            entry: Entry::keyed(self.target.ctx(), self.paths(), "outputs", "output"),
        }
    }

    fn paths(&self) -> Vec<Path> {
        self.target.path().cloned().into_iter().collect()
    }
}

// ============================================================================
// INPUTS, SECRETS, OUTPUTS
// ============================================================================

/// Input of `workflow_dispatch` and/or `workflow_call`, reading back as
/// `inputs.<id>`.
#[derive(Clone)]
pub struct Input {
    entry: Entry,
}

impl Input {
    fn append(ctx: &Rc<Context>, paths: Vec<Path>) -> Self {
        Self {
            entry: Entry::keyed(ctx, paths, "inputs", "input"),
        }
    }

    #[track_caller]
    pub fn id(&self, id: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.set_id(id);
        self
    }

    /// Derive the id from a name; underscores become dashes.
    #[track_caller]
    pub fn id_hint(&self, hint: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.id_hint(hint);
        self
    }

    #[track_caller]
    pub fn description(&self, text: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("description", dedent(text));
        self
    }

    #[track_caller]
    pub fn required(&self, required: bool) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("required", required);
        self
    }

    /// One of `boolean`, `choice`, `number`, `environment` or `string`.
    #[track_caller]
    pub fn type_(&self, ty: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("type_", ty);
        self.infer_type();
        self
    }

    /// Choices; makes the input a `choice` one.
    #[track_caller]
    pub fn options<S: Into<String>>(&self, options: impl IntoIterator<Item = S>) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("options", strings(options));
        self.infer_type();
        self
    }

    /// Default value; the type follows it unless options are set.
    #[track_caller]
    pub fn default(&self, value: impl Into<Value>) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("default", value);
        self.infer_type();
        self
    }

    fn infer_type(&self) {
        let from_default = match self.entry.get("default") {
            Some(Value::Bool(_)) => Some("boolean"),
            Some(Value::Int(_) | Value::Float(_)) => Some("number"),
            Some(Value::Str(_)) => Some("string"),
            Some(Value::Map(_)) => Some("environment"),
            _ => None,
        };
        let has_options = matches!(self.entry.get("options"), Some(Value::List(items)) if !items.is_empty());
        let ty = if has_options { Some("choice") } else { from_default };
        if let Some(ty) = ty {
            self.entry.store("type_", Value::from(ty));
        }
    }
}

impl AsExpr for Input {
    fn as_expr(&self) -> Expr {
        self.entry.context("inputs", &[])
    }
}

/// Secret of `workflow_call`, reading back as `secrets.<id>`.
#[derive(Clone)]
pub struct Secret {
    entry: Entry,
}

impl Secret {
    #[track_caller]
    pub fn id(&self, id: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.set_id(id);
        self
    }

    #[track_caller]
    pub fn id_hint(&self, hint: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.id_hint(hint);
        self
    }

    #[track_caller]
    pub fn description(&self, text: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("description", dedent(text));
        self
    }

    #[track_caller]
    pub fn required(&self, required: bool) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("required", required);
        self
    }
}

impl AsExpr for Secret {
    fn as_expr(&self) -> Expr {
        self.entry.context("secrets", &[])
    }
}

/// Output of `workflow_call`.
#[derive(Clone)]
pub struct Output {
    entry: Entry,
}

impl Output {
    #[track_caller]
    pub fn id(&self, id: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.set_id(id);
        self
    }

    #[track_caller]
    pub fn id_hint(&self, hint: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.id_hint(hint);
        self
    }

    #[track_caller]
    pub fn description(&self, text: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("description", dedent(text));
        self
    }

    /// Value of the output. Job handle references (`needs.<job>...`) are
    /// rewritten to the `jobs.<job>...` form valid at workflow level.
    #[track_caller]
    pub fn value(&self, value: impl Into<Value>) -> &Self {
        self.entry.ctx().enter();
        self.entry.ensure_id();
        let value = match value.into() {
            Value::Expr(expr) => Value::Expr(expr.needs_to_jobs()),
            Value::Str(text) => Value::Str(needs_to_jobs(&text)),
            other => other,
        };
        self.entry.set("value", value);
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{build, Gen};
    use crate::expr::AsExpr;

    fn yaml(f: impl FnOnce(&Gen)) -> String {
        match build("test", f) {
            Ok(workflow) => workflow.to_yaml(),
            Err(e) => panic!("unexpected errors:{e}"),
        }
    }

    fn messages(f: impl FnOnce(&Gen)) -> Vec<String> {
        match build("test", f) {
            Ok(_) => Vec::new(),
            Err(e) => e.errors.into_iter().map(|error| error.message).collect(),
        }
    }

    #[test]
    fn test_pull_request() {
        let out = yaml(|w| {
            w.on()
                .pull_request()
                .types(["opened", "reopened"])
                .branches(["main", "dev/*"])
                .ignore_branches(["dev/ignore"])
                .paths(["foo/**"])
                .ignore_paths(["foo/bar/**"]);
            w.run("");
        });
        assert_eq!(
            out,
            r#"on:
  pull_request:
    types:
    - opened
    - reopened
    branches:
    - main
    - dev/*
    branches-ignore:
    - dev/ignore
    paths:
    - foo/**
    paths-ignore:
    - foo/bar/**
jobs:
  test:
    runs-on: ubuntu-latest
    steps:
    - run: ''
"#
        );
    }

    #[test]
    fn test_merge() {
        let out = yaml(|w| {
            w.on().pull_request().branches(["main"]);
            w.on().pull_request().paths(["foo/**"]);
            w.run("");
        });
        assert!(out.starts_with("on:\n  pull_request:\n    branches:\n    - main\n    paths:\n    - foo/**\n"));
    }

    #[test]
    fn test_push_and_schedule() {
        let out = yaml(|w| {
            w.on().push().branches(["main"]).tags(["v*"]).ignore_tags(["v0*"]);
            w.on().schedule("0 0 * * *").schedule("0 12 * * 1");
            w.run("");
        });
        assert!(out.starts_with(
            "on:\n  push:\n    branches:\n    - main\n    tags:\n    - v*\n    tags-ignore:\n    - v0*\n  schedule:\n  - cron: 0 0 * * *\n  - cron: 0 12 * * 1\n"
        ));
    }

    #[test]
    fn test_event() {
        let out = yaml(|w| {
            w.on().event("release").types(["published"]);
            w.on().event("workflow_run").types(["completed"]);
            w.on().event("create");
            w.run("");
        });
        assert!(out.starts_with(
            "on:\n  create: {}\n  release:\n    types:\n    - published\n  workflow_run:\n    types:\n    - completed\n"
        ));
    }

    #[test]
    fn test_event_errors() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.on().event("nope");
            w.on().event("create").types(["created"]);
            w.on().event("schedule");
            w.run("");
        });
        assert_eq!(
            errors,
            vec![
                "unknown trigger `nope`",
                "trigger `create` does not accept `types`",
                "trigger `schedule` has its own method, use `on().schedule(...)`",
            ]
        );
    }

    #[test]
    fn test_inputs() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.on().workflow_call();
            let foo = w.on().input();
            foo.id("foo").description("a foo").required(true);
            let bar = w.on().input();
            bar.id("bar").default(42);
            let baz = w.on().input();
            baz.id("baz").default(true);
            w.run(format!(
                "echo {}\necho {}\necho {}",
                foo.as_expr(),
                bar.as_expr(),
                baz.as_expr()
            ));
        });
        let inputs = "    inputs:\n      foo:\n        description: a foo\n        required: true\n        type: string\n      bar:\n        required: false\n        default: 42\n        type: number\n      baz:\n        required: false\n        default: true\n        type: boolean\n";
        assert!(out.starts_with(&format!(
            "on:\n  workflow_call:\n{inputs}  workflow_dispatch:\n{inputs}"
        )));
        assert!(out.contains(
            "    - run: |\n        echo ${{ inputs.foo }}\n        echo ${{ inputs.bar }}\n        echo ${{ inputs.baz }}\n"
        ));
    }

    #[test]
    fn test_input_ids() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            let first = w.on().input();
            first.id_hint("my_input");
            let second = w.on().input();
            second.id("my_other_input");
            let third = w.on().input();
            w.run(format!(
                "echo {} {} {}",
                first.as_expr(),
                second.as_expr(),
                third.as_expr()
            ));
        });
        assert!(out.starts_with(
            "on:\n  workflow_dispatch:\n    inputs:\n      my-input:\n        required: false\n        type: string\n      my_other_input:\n        required: false\n        type: string\n      input-1:\n"
        ));
        assert!(out.contains(
            "run: echo ${{ inputs.my-input }} ${{ inputs.my_other_input }} ${{ inputs.input-1 }}"
        ));
    }

    #[test]
    fn test_configured_entries_without_id_are_named() {
        let out = yaml(|w| {
            w.on().workflow_dispatch().input().required(true);
            w.on().workflow_call().secret().description("token");
            w.on().workflow_dispatch().input();
            w.run("");
        });
        assert!(out.contains("    inputs:\n      input-1:\n        required: true\n        type: string\n"));
        assert!(out.contains("    secrets:\n      secret-1:\n        description: token\n"));
        assert!(!out.contains("input-2"));
    }

    #[test]
    fn test_unnamed_output_without_value() {
        let errors = messages(|w| {
            w.on().workflow_call().output().description("result");
            w.run("");
        });
        assert_eq!(
            errors,
            vec!["workflow `test` has no value set for output-1, use `outputs` to set them"]
        );
    }

    #[test]
    fn test_different_inputs() {
        let out = yaml(|w| {
            let a = w.on().workflow_call().input();
            a.id("a");
            let b = w.on().workflow_dispatch().input();
            b.id("b");
            w.run(format!("echo {} {}", a.as_expr(), b.as_expr()));
        });
        assert!(out.starts_with(
            "on:\n  workflow_call:\n    inputs:\n      a:\n        required: false\n        type: string\n  workflow_dispatch:\n    inputs:\n      b:\n"
        ));
    }

    #[test]
    fn test_input_without_trigger() {
        let errors = messages(|w| {
            w.on().push();
            let input = w.on().input();
            w.run(format!("echo {}", input.as_expr()));
        });
        assert_eq!(
            errors,
            vec!["`on.input` must be used after setting either `on.workflow_call` or `on.workflow_dispatch`"]
        );
    }

    #[test]
    fn test_workflow_call() {
        let out = yaml(|w| {
            let call = w.on().workflow_call();
            let token = call.secret();
            token.id("token").required(true);
            let auth = call.secret();
            auth.id("auth").description("auth if provided");
            let foo = call.input();
            foo.id("foo").required(true);
            let bar = call.input();
            bar.id("bar").type_("boolean");
            let baz = call.input();
            baz.id("baz").options(["a", "b", "c"]).default("b");
            w.run(format!(
                "echo {}\necho {}\necho {}",
                foo.as_expr(),
                bar.as_expr(),
                baz.as_expr()
            ))
            .if_(token.as_expr() & &auth);
        });
        assert_eq!(
            out,
            r#"on:
  workflow_call:
    inputs:
      foo:
        required: true
        type: string
      bar:
        required: false
        type: boolean
      baz:
        required: false
        default: b
        type: choice
        options:
        - a
        - b
        - c
    secrets:
      token:
        required: true
      auth:
        description: auth if provided
        required: false
jobs:
  test:
    runs-on: ubuntu-latest
    steps:
    - if: secrets.token && secrets.auth
      run: |
        echo ${{ inputs.foo }}
        echo ${{ inputs.bar }}
        echo ${{ inputs.baz }}
"#
        );
    }

    #[test]
    fn test_workflow_outputs() {
        let out = yaml(|w| {
            let call = w.on().workflow_call();
            let one = call.output();
            one.description("bla bla");
            let two = call.output();
            two.id("TWO");
            let j1 = w.job("j1", |w| {
                w.outputs([("one", 1), ("two", 2)]);
            });
            let j2 = w.job("j2", |w| {
                w.outputs([("three", 3)]);
            });
            one.id("one").value(j1.output("one"));
            two.value(j2.result().eq("success").and(j1.output("two")).or(j2.output("three")));
        });
        assert_eq!(
            out,
            r#"on:
  workflow_call:
    outputs:
      one:
        description: bla bla
        value: ${{ jobs.j1.outputs.one }}
      TWO:
        value: ${{ jobs.j2.result == 'success' && jobs.j1.outputs.two || jobs.j2.outputs.three }}
jobs:
  j1:
    outputs:
      one: 1
      two: 2
  j2:
    outputs:
      three: 3
"#
        );
    }

    #[test]
    fn test_workflow_output_from_rendered_string() {
        let out = yaml(|w| {
            let call = w.on().workflow_call();
            let j = w.job("j", |w| {
                w.outputs([("x", 1)]);
            });
            call.output()
                .id("o")
                .value(format!("v{} and {}", j.output("x"), j.result()));
        });
        assert!(out.contains(
            "        value: v${{ jobs.j.outputs.x }} and ${{ jobs.j.result }}\n"
        ));
    }

    #[test]
    fn test_needs_to_jobs_inside_interpolations_only() {
        assert_eq!(
            super::needs_to_jobs("needs.a ${{ needs.a.result }} ${{ x.needs.b }}"),
            "needs.a ${{ jobs.a.result }} ${{ x.needs.b }}"
        );
    }

    #[test]
    fn test_output_without_value() {
        let errors = messages(|w| {
            let call = w.on().workflow_call();
            call.output().id("result");
            w.run("");
        });
        assert_eq!(
            errors,
            vec!["workflow `test` has no value set for result, use `outputs` to set them"]
        );
    }

    #[test]
    fn test_secrets_not_allowed_in_triggers() {
        let errors = messages(|w| {
            let call = w.on().workflow_call();
            let token = call.secret();
            token.id("token");
            call.input().id("x").description(&format!("{}", token.as_expr()));
            w.run("");
        });
        assert_eq!(errors, vec!["`secrets` cannot be used in a trigger"]);
    }
}
