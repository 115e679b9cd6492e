//! Step builders
//!
//! A step is created by [`Gen::step`], [`Gen::run`] or [`Gen::uses`] and
//! appended to the current job. The returned [`Step`] keeps configuring the
//! same entry and reads back as `steps.<id>` in expressions.

use crate::element::Value;
use crate::expr::{AsExpr, Expr};
use crate::template::dedent;

use super::{Entry, Gen, Path, Scope};

/// Handle to a step of the current job.
#[derive(Clone)]
pub struct Step {
    entry: Entry,
}

impl Gen {
    /// Add a named step.
    #[track_caller]
    pub fn step(&self, name: impl Into<Value>) -> Step {
        self.ctx.enter();
        let step = self.new_step();
        step.entry.set("name", name);
        step
    }

    /// Add a step running a shell command.
    #[track_caller]
    pub fn run(&self, code: impl Into<Value>) -> Step {
        self.ctx.enter();
        let step = self.new_step();
        step.run(code);
        step
    }

    /// Add a step using an action, by catalog name or reference.
    #[track_caller]
    pub fn uses(&self, action: &str) -> Step {
        self.ctx.enter();
        let step = self.new_step();
        step.uses(action);
        step
    }

    fn new_step(&self) -> Step {
        let root = self.ctx.scope(Scope::Job, "steps");
        let paths = match root {
            Some(root) => {
                let path = Path::new(root);
                let has_steps = self.ctx.has(&path, "steps");
                if self.ctx.has(&path, "uses") && !has_steps {
                    let job = path.root().job_id().unwrap_or_default();
                    self.ctx.error(format!(
                        "job `{job}` adds steps when `uses` is already set (by `call`)"
                    ));
                }
                vec![path]
            }
            None => Vec::new(),
        };
        Step {
            entry: Entry::append(&self.ctx, paths, "steps", "step"),
        }
    }
}

/// Display name derived from an action reference:
/// `actions/setup-python@v5` → `Setup python`.
fn humanize(reference: &str) -> String {
    let name = reference.rsplit('/').next().unwrap_or(reference);
    let name = name.split('@').next().unwrap_or(name);
    let words = name.replace(['-', '_'], " ").trim().to_lowercase();
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Scalar rendering inside generated shell code.
fn shell_text(value: &Value) -> String {
    match value {
        Value::Str(text) => text.clone(),
        Value::Expr(expr) => expr.to_string(),
        Value::Bool(value) => value.to_string(),
        Value::Int(value) => value.to_string(),
        Value::Float(value) => value.to_string(),
        other => other.repr(),
    }
}

impl Step {
    #[track_caller]
    pub fn name(&self, name: impl Into<Value>) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("name", name);
        self
    }

    /// Set an explicit id.
    #[track_caller]
    pub fn id(&self, id: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.set_id(id);
        self
    }

    /// Derive the id from a name, adding a `-<n>` suffix if already taken.
    #[track_caller]
    pub fn id_hint(&self, hint: &str) -> &Self {
        self.entry.ctx().enter();
        self.entry.id_hint(hint);
        self
    }

    #[track_caller]
    pub fn if_(&self, condition: impl Into<Value>) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("if_", condition);
        self
    }

    #[track_caller]
    pub fn continue_on_error(&self, value: impl Into<Value>) -> &Self {
        self.entry.ctx().enter();
        self.entry.set("continue_on_error", value);
        self
    }

    #[track_caller]
    pub fn env<K, V>(&self, vars: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.entry.ctx().enter();
        self.entry.set("env", Value::map(vars));
        self
    }

    /// Shell code; blank edge lines are trimmed and the text dedented.
    #[track_caller]
    pub fn run(&self, code: impl Into<Value>) -> &Self {
        let ctx = self.entry.ctx();
        ctx.enter();
        if self.entry.has("uses") || self.entry.has("with_") {
            ctx.error("cannot turn a `uses` step into a `run` one");
            return self;
        }
        let code = match code.into() {
            Value::Str(text) => Value::Str(dedent(&text)),
            other => other,
        };
        self.entry.set("run", code);
        self
    }

    /// Action to use, resolved through the catalog. Without a name the step
    /// is named after the catalog entry or the action itself.
    #[track_caller]
    pub fn uses(&self, action: &str) -> &Self {
        let ctx = self.entry.ctx();
        ctx.enter();
        if self.entry.has("run") {
            ctx.error("cannot turn a `run` step into a `uses` one");
            return self;
        }
        let resolved = ctx.catalog().resolve(action);
        if ctx.catalog().is_unpinned(&resolved.uses) {
            tracing::warn!(
                uses = %resolved.uses,
                "action is not pinned to a commit and its owner is not trusted"
            );
        }
        self.entry.set("uses", resolved.uses.as_str());
        if !self.entry.has("name") {
            let name = resolved
                .name
                .unwrap_or_else(|| humanize(&resolved.uses));
            if !name.is_empty() {
                self.entry.set("name", name);
            }
        }
        self
    }

    /// Action arguments, keys taken verbatim.
    #[track_caller]
    pub fn with<K, V>(&self, args: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let ctx = self.entry.ctx();
        ctx.enter();
        if self.entry.has("run") {
            ctx.error("cannot turn a `run` step into a `uses` one");
            return self;
        }
        self.entry.set("with_", Value::map(args));
        self
    }

    /// Declare outputs set by the step itself.
    #[track_caller]
    pub fn returns<S: Into<String>>(&self, names: impl IntoIterator<Item = S>) -> &Self {
        self.entry.ctx().enter();
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.entry.set("outputs", names);
        self
    }

    /// Declare outputs and append the shell lines writing them to
    /// `$GITHUB_OUTPUT`.
    #[track_caller]
    pub fn returns_values<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let ctx = self.entry.ctx();
        ctx.enter();
        let pairs: Vec<(String, Value)> = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        let names: Vec<String> = pairs.iter().map(|(name, _)| name.clone()).collect();
        self.entry.set("outputs", names);
        if pairs.is_empty() {
            return self;
        }
        if self.entry.has("uses") || self.entry.has("with_") {
            ctx.error("cannot turn a `uses` step into a `run` one");
            return self;
        }
        let code = pairs
            .iter()
            .map(|(name, value)| format!("echo {name}={} >> $GITHUB_OUTPUT", shell_text(value)))
            .collect::<Vec<_>>()
            .join("\n");
        let Some(path) = self.entry.path() else {
            return self;
        };
        if !ctx.validate(&path, "run", &Value::Str(code.clone())) {
            return self;
        }
        let code = match self.entry.get("run") {
            Some(previous) => format!("{}\n{code}", shell_text(&previous).trim_end()),
            None => code,
        };
        ctx.store(&path, "run", Value::Str(code));
        self
    }

    /// Jobs this step relies on. They are added to the job's `needs` and
    /// noted in a comment above the step.
    #[track_caller]
    pub fn needs<J: AsExpr>(&self, jobs: impl IntoIterator<Item = J>) -> &Self {
        let ctx = self.entry.ctx();
        ctx.enter();
        let Some(path) = self.entry.path() else {
            return self;
        };
        let jobs: Vec<Expr> = jobs.into_iter().map(|job| job.as_expr()).collect();
        if let Some(ids) = ctx.needs(path.root(), jobs) {
            self.entry.set("needs", ids);
        }
        self
    }

    /// `steps.<id>.outputs`
    pub fn outputs(&self) -> Expr {
        self.entry.context("steps", &["outputs"])
    }

    /// `steps.<id>.outputs.<name>`
    pub fn output(&self, name: &str) -> Expr {
        self.entry.context("steps", &["outputs", name])
    }

    /// `steps.<id>.outcome`
    pub fn outcome(&self) -> Expr {
        self.entry.context("steps", &["outcome"])
    }

    /// `steps.<id>.conclusion`
    pub fn conclusion(&self) -> Expr {
        self.entry.context("steps", &["conclusion"])
    }

    /// Outputs declared with [`Step::returns`] or [`Step::returns_values`].
    pub(crate) fn declared_outputs(&self) -> Vec<String> {
        self.entry
            .get("outputs")
            .and_then(|outputs| {
                outputs
                    .as_list()
                    .map(|names| names.iter().filter_map(Value::as_str).map(String::from).collect())
            })
            .unwrap_or_default()
    }

    pub(crate) fn ensure_id(&self) -> String {
        self.entry.ensure_id()
    }
}

impl AsExpr for Step {
    fn as_expr(&self) -> Expr {
        self.entry.context("steps", &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::config::Catalog;
    use crate::contexts::functions::failure;
    use crate::contexts::{inputs, steps};

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
    fn test_humanize() {
        assert_eq!(humanize("actions/checkout@v4"), "Checkout");
        assert_eq!(humanize("./my_action"), "My action");
        assert_eq!(humanize("actions/setup-python@v5"), "Setup python");
    }

    #[test]
    fn test_steps() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.job("my_job", |w| {
                w.run("echo hello").name("salutations");
                w.run("echo $WHO").env([("WHO", "world")]);
                w.step("catastrophe").run("echo oh no").if_(failure());
                w.uses("actions/checkout@v4").with([("ref", "dev")]);
                w.uses("./my_action")
                    .with([("arg-1", "foo"), ("arg_2", "bar")])
                    .with([("arg_3", "baz")]);
                w.run("one").continue_on_error(true);
                w.run("two").continue_on_error("value");
            });
        });
        assert_eq!(
            out,
            r#"on:
  workflow_dispatch: {}
jobs:
  my_job:
    runs-on: ubuntu-latest
    steps:
    - name: salutations
      run: echo hello
    - run: echo $WHO
      env:
        WHO: world
    - name: catastrophe
      if: failure()
      run: echo oh no
    - name: Checkout
      uses: actions/checkout@v4
      with:
        ref: dev
    - name: My action
      uses: ./my_action
      with:
        arg-1: foo
        arg_2: bar
        arg_3: baz
    - continue-on-error: true
      run: one
    - continue-on-error: value
      run: two
"#
        );
    }

    #[test]
    fn test_multiline_run_code_dedented() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.run(
                "
                echo one
                echo two
                echo three
            ",
            );
        });
        assert!(out.ends_with(
            "    steps:\n    - run: |\n        echo one\n        echo two\n        echo three\n"
        ));
    }

    #[test]
    fn test_run_code_with_non_breaking_space() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.run("\u{a0}echo a\n echo b");
        });
        assert!(out.contains("\u{a0}echo a"));
        assert!(out.contains(" echo b\n"));
    }

    #[test]
    fn test_ids() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            let x = w.run("one");
            x.id("one");
            let y = w.run("two");
            y.id_hint("y");
            let z = w.run("three");
            z.id_hint("y");
            w.step("use x").run(&x.outputs());
            w.step("use y").run(&y.outcome());
            w.step("use z").run(&z.conclusion());
            let anonymous: Vec<String> = (0..3)
                .map(|i| w.step(format!("anon{i}")).outcome().to_string())
                .collect();
            w.step("use anonymous").run(anonymous.join("\n"));
        });
        assert!(out.contains("    - id: one\n      run: one\n"));
        assert!(out.contains("    - id: y\n      run: two\n"));
        assert!(out.contains("    - id: y-1\n      run: three\n"));
        assert!(out.contains("      run: ${{ steps.y-1.conclusion }}\n"));
        assert!(out.contains("    - id: step-1\n      name: anon0\n"));
        assert!(out.contains("    - id: step-3\n      name: anon2\n"));
        assert!(out.contains(
            "      run: |\n        ${{ steps.step-1.outcome }}\n        ${{ steps.step-2.outcome }}\n        ${{ steps.step-3.outcome }}\n"
        ));
    }

    #[test]
    fn test_id_hint_underscores() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            let a = w.run("echo one");
            a.id_hint("my_step");
            let b = w.run("echo two");
            b.id("my_other_step");
            w.run("").if_(a.as_expr() & &b);
        });
        assert!(out.contains("    - id: my-step\n"));
        assert!(out.contains("    - id: my_other_step\n"));
        assert!(out.contains("    - if: steps.my-step && steps.my_other_step\n"));
    }

    #[test]
    fn test_if_expr() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            let x = w.run("one");
            x.id("x");
            w.run("two").if_(x.outcome().eq("success"));
            w.run("three").if_(!x.outputs());
        });
        assert!(out.contains("    - if: steps.x.outcome == 'success'\n      run: two\n"));
        assert!(out.contains("    - if: '!steps.x.outputs'\n      run: three\n"));
    }

    #[test]
    fn test_steps_wildcard() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.job("j", |w| {
                w.step(&steps().any().field("result"));
            });
        });
        assert!(out.contains("    - name: ${{ steps.*.result }}\n      run: ''\n"));
    }

    #[test]
    fn test_duplicate_id() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.run("one").id("x");
            w.run("two").id("x");
        });
        assert_eq!(errors, vec!["id `x` already used in `jobs.test.steps`"]);
    }

    #[test]
    fn test_id_set_twice() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.run("one").id("x").id("y");
        });
        assert_eq!(errors, vec!["id was already specified for this element as `x`"]);
    }

    #[test]
    fn test_invalid_step_id() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.run("one").id("has space");
        });
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("invalid id `has space`"));
    }

    #[test]
    fn test_later_step_reference_rejected() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            let first = w.run("one");
            let second = w.run("two");
            second.id("second");
            first.if_(second.outcome().eq("success"));
        });
        assert_eq!(
            errors,
            vec!["step `second` is not defined before this step in job `test`"]
        );
    }

    #[test]
    fn test_run_and_uses_conflict() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.run("make").uses("actions/checkout@v4");
            w.uses("actions/checkout@v4").run("make");
        });
        assert_eq!(
            errors,
            vec![
                "cannot turn a `run` step into a `uses` one",
                "cannot turn a `uses` step into a `run` one",
            ]
        );
    }

    #[test]
    fn test_with_without_uses() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.step("args only").with([("a", 1)]);
        });
        assert_eq!(
            errors,
            vec!["step `1` in job `test` has a `with` but no `uses`"]
        );
    }

    #[test]
    fn test_returns_values() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            let x = w.step("x");
            x.id("x").returns_values([("one", "a"), ("two", "b")]);
            let y = w.step("y");
            y.id("y").run("make").returns_values([("three", "c")]);
        });
        assert!(out.contains(
            "      run: |\n        echo one=a >> $GITHUB_OUTPUT\n        echo two=b >> $GITHUB_OUTPUT\n"
        ));
        assert!(out.contains("      run: |\n        make\n        echo three=c >> $GITHUB_OUTPUT\n"));
    }

    #[test]
    fn test_returns_values_checks_references() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.step("x").returns_values([("value", &inputs().field("missing"))]);
        });
        assert_eq!(
            errors,
            vec!["input `missing` is not declared on `workflow_dispatch` or `workflow_call`"]
        );
    }

    #[test]
    fn test_catalog_resolution() {
        let mut catalog = Catalog::default();
        catalog.insert("checkout", "actions/checkout@v4");
        let workflow = crate::builder::build_with("test", &catalog, |w| {
            w.on().workflow_dispatch();
            w.uses("checkout");
        })
        .unwrap();
        let out = workflow.to_yaml();
        assert!(out.contains("    - name: Checkout\n      uses: actions/checkout@v4\n"));
    }

    #[test]
    fn test_step_needs_comment() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            let j1 = w.job("j1", |_| {});
            let j2 = w.job("j2", |w| {
                w.run("").if_(&j1);
            });
            w.job("j3", |w| {
                w.run("").needs([&j1]);
                w.run("").needs([&j1, &j2]);
            });
        });
        assert!(out.contains("  j1: {}\n"));
        assert!(out.contains("  j2:\n    needs: [j1]\n"));
        assert!(out.contains(
            "  j3:\n    needs: [j1, j2]\n    runs-on: ubuntu-latest\n    steps:\n    # needs j1\n    - run: ''\n    # needs j1, j2\n    - run: ''\n"
        ));
    }

    #[test]
    fn test_steps_after_call() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.job("j", |w| {
                w.call("./.github/workflows/other.yml");
                w.run("make");
            });
        });
        assert_eq!(
            errors,
            vec!["job `j` adds steps when `uses` is already set (by `call`)"]
        );
    }
}
