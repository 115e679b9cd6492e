//! Job strategy and matrix

use crate::contexts;
use crate::element::Value;
use crate::expr::{AsExpr, Expr};

use super::{Gen, Path, Scope, Target};

/// Handle to the `strategy` of the current job. Reads back as the
/// `strategy` context.
#[derive(Clone)]
pub struct Strategy {
    target: Target,
}

impl Gen {
    #[track_caller]
    pub fn strategy(&self) -> Strategy {
        self.ctx.enter();
        let path = self
            .ctx
            .scope(Scope::Job, "strategy")
            .map(|root| Path::new(root).field("strategy"));
        Strategy {
            target: Target::new(&self.ctx, path),
        }
    }
}

const MIXED_MATRIX: &str = "`matrix` cannot be used with both an expression value and `includes`, `excludes` or other keyword values";

impl Strategy {
    /// Path of the literal matrix, `None` if the matrix is an expression.
    fn literal(&self) -> Option<Path> {
        let path = self.target.path()?;
        match self.target.get("matrix") {
            Some(Value::Expr(_) | Value::Str(_)) => {
                self.target.ctx().error(MIXED_MATRIX);
                None
            }
            _ => Some(path.field("matrix")),
        }
    }

    /// Use an expression as the whole matrix, e.g. `fromJson(inputs.matrix)`.
    #[track_caller]
    pub fn matrix(&self, value: impl Into<Value>) -> &Self {
        let ctx = self.target.ctx();
        ctx.enter();
        if let Some(Value::Element(matrix)) = self.target.get("matrix") {
            if matrix.has_any() {
                ctx.error(MIXED_MATRIX);
                return self;
            }
        }
        self.target.set("matrix", value);
        self
    }

    /// Add values to a matrix axis.
    #[track_caller]
    pub fn axis<V: Into<Value>>(&self, name: &str, values: impl IntoIterator<Item = V>) -> &Self {
        let ctx = self.target.ctx();
        ctx.enter();
        if let Some(matrix) = self.literal() {
            let values = Value::List(values.into_iter().map(Into::into).collect());
            ctx.update(&matrix, "values", Value::map([(name, values)]));
        }
        self
    }

    /// Add an `include` row.
    #[track_caller]
    pub fn include<K, V>(&self, row: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.target.ctx().enter();
        self.row("include", Value::map(row));
        self
    }

    /// Add an `exclude` row.
    #[track_caller]
    pub fn exclude<K, V>(&self, row: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.target.ctx().enter();
        self.row("exclude", Value::map(row));
        self
    }

    fn row(&self, field: &'static str, row: Value) {
        if let Some(matrix) = self.literal() {
            self.target
                .ctx()
                .update(&matrix, field, Value::List(vec![row]));
        }
    }

    #[track_caller]
    pub fn fail_fast(&self, value: impl Into<Value>) -> &Self {
        self.target.ctx().enter();
        self.target.set("fail_fast", value);
        self
    }

    #[track_caller]
    pub fn max_parallel(&self, value: impl Into<Value>) -> &Self {
        self.target.ctx().enter();
        self.target.set("max_parallel", value);
        self
    }
}

impl AsExpr for Strategy {
    fn as_expr(&self) -> Expr {
        contexts::strategy()
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{build, Gen};
    use crate::contexts::functions::{contains, from_json};
    use crate::contexts::matrix;
    use crate::element::Value;
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

    fn xy() -> String {
        format!("{}, {}", matrix().field("x"), matrix().field("y"))
    }

    #[test]
    fn test_cross_matrix() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.job("a_job", |w| {
                w.strategy().axis("x", [1, 2, 3]).axis("y", ["a", "b", "c"]);
                w.run(xy());
            });
        });
        assert_eq!(
            out,
            r#"on:
  workflow_dispatch: {}
jobs:
  a_job:
    runs-on: ubuntu-latest
    strategy:
      matrix:
        x: [1, 2, 3]
        y: [a, b, c]
    steps:
    - run: ${{ matrix.x }}, ${{ matrix.y }}
"#
        );
    }

    #[test]
    fn test_include_exclude() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.job("a_job", |w| {
                let strategy = w.strategy();
                strategy.axis("x", [1, 2, 3]).axis("y", ["a", "b", "c"]);
                strategy.exclude([("x", Value::from(1)), ("y", Value::from("a"))]);
                strategy.include([
                    ("x", Value::from(100)),
                    ("y", Value::from("z")),
                    ("z", Value::from(42)),
                ]);
                w.run(format!("{}, {}", xy(), matrix().field("z")));
            });
        });
        assert!(out.contains(
            "    strategy:\n      matrix:\n        x: [1, 2, 3]\n        y: [a, b, c]\n        include:\n        - {x: 100, y: z, z: 42}\n        exclude:\n        - {x: 1, y: a}\n"
        ));
        assert!(out.contains("    - run: ${{ matrix.x }}, ${{ matrix.y }}, ${{ matrix.z }}\n"));
    }

    #[test]
    fn test_fail_fast_and_max_parallel() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.strategy()
                .axis("x", [1, 2, 3])
                .fail_fast(true)
                .max_parallel(5);
            w.run(format!("{}", matrix().field("x")));
        });
        assert!(out.contains(
            "    strategy:\n      matrix:\n        x: [1, 2, 3]\n      fail-fast: true\n      max-parallel: 5\n"
        ));
    }

    #[test]
    fn test_matrix_from_input() {
        let out = yaml(|w| {
            let i = w.on().workflow_dispatch().input();
            i.id("i");
            w.strategy().matrix(from_json(&i));
            w.run(format!("{}, {}", matrix().field("foo"), matrix().field("bar")));
            w.step("Fail").if_(contains(&i, "failed"));
        });
        assert_eq!(
            out,
            r#"on:
  workflow_dispatch:
    inputs:
      i:
        required: false
        type: string
jobs:
  test:
    runs-on: ubuntu-latest
    strategy:
      matrix: ${{ fromJson(inputs.i) }}
    steps:
    - run: ${{ matrix.foo }}, ${{ matrix.bar }}
    - name: Fail
      if: contains(inputs.i, 'failed')
      run: ''
"#
        );
    }

    #[test]
    fn test_mixed_matrix_rejected() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.job("a", |w| {
                w.strategy().axis("x", [1]).matrix(from_json("[]"));
                w.run("");
            });
            w.job("b", |w| {
                w.strategy().matrix(from_json("[]")).axis("x", [1]);
                w.run("");
            });
        });
        assert_eq!(
            errors,
            vec![
                "`matrix` cannot be used with both an expression value and `includes`, `excludes` or other keyword values";
                2
            ]
        );
    }

    #[test]
    fn test_matrix_key_checked() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.job("j", |w| {
                w.strategy().axis("x", [1, 2]);
                w.run(format!("{}", matrix().field("y")));
            });
        });
        assert_eq!(errors, vec!["`matrix.y` is not a key of the matrix of job `j`"]);
    }

    #[test]
    fn test_matrix_without_strategy() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.run(format!("{}", matrix().field("x")));
        });
        assert_eq!(
            errors,
            vec!["`matrix` is used in job `test` which has no `strategy.matrix`"]
        );
    }

    #[test]
    fn test_strategy_as_context() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            let strategy = w.strategy();
            strategy.axis("a", [1, 2, 3]);
            w.run(format!(
                "echo {}\necho {}",
                strategy.as_expr(),
                strategy.as_expr().field("job_index")
            ));
        });
        assert!(out.contains("        echo ${{ strategy }}\n        echo ${{ strategy.job-index }}\n"));
    }
}
