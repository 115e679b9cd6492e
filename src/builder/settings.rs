//! Settings shared by workflows and jobs
//!
//! `permissions`, `defaults` and `concurrency` apply to the current job, or
//! to the workflow outside jobs. `environment` is job-only.

use crate::element::Value;
use crate::workflow::{ALL_PERMISSIONS, PERMISSIONS};

use super::{Gen, Path, Scope, Target};

impl Gen {
    #[track_caller]
    pub fn permissions(&self) -> Permissions {
        self.ctx.enter();
        let owner = self.ctx.scope(Scope::JobOrWorkflow, "permissions").map(Path::new);
        if let Some(owner) = &owner {
            // an untouched handle still renders as `permissions: {}`
            self.ctx.ensure(&owner.field("permissions"));
        }
        Permissions {
            owner: Target::new(&self.ctx, owner),
        }
    }

    #[track_caller]
    pub fn defaults(&self) -> Defaults {
        self.ctx.enter();
        let path = self
            .ctx
            .scope(Scope::JobOrWorkflow, "defaults")
            .map(|root| Path::new(root).field("defaults").field("run"));
        Defaults {
            target: Target::new(&self.ctx, path),
        }
    }

    /// Concurrency group of the current job, or of the workflow.
    #[track_caller]
    pub fn concurrency(&self, group: impl Into<Value>) -> Concurrency {
        self.ctx.enter();
        let path = self
            .ctx
            .scope(Scope::JobOrWorkflow, "concurrency")
            .map(|root| Path::new(root).field("concurrency"));
        let concurrency = Concurrency {
            target: Target::new(&self.ctx, path),
        };
        concurrency.target.set("group", group);
        concurrency
    }

    /// Deployment environment of the current job.
    #[track_caller]
    pub fn environment(&self, name: impl Into<Value>) -> Environment {
        self.ctx.enter();
        let path = self
            .ctx
            .scope(Scope::Job, "environment")
            .map(|root| Path::new(root).field("environment"));
        let environment = Environment {
            target: Target::new(&self.ctx, path),
        };
        environment.target.set("name", name);
        environment
    }
}

// ============================================================================
// PERMISSIONS
// ============================================================================

const MIXED_PERMISSIONS: &str = "`permissions` cannot be set to `read-all` or `write-all` with any other more specific permission field";

/// `GITHUB_TOKEN` permissions: either one blanket level or per-scope levels.
#[derive(Clone)]
pub struct Permissions {
    owner: Target,
}

macro_rules! scopes {
    ($($method:ident => $scope:literal),* $(,)?) => {
        impl Permissions {
            $(
                #[track_caller]
                pub fn $method(&self, level: &str) -> &Self {
                    self.owner.ctx().enter();
                    self.update($scope, level);
                    self
                }
            )*
        }
    };
}

scopes! {
    actions => "actions",
    attestations => "attestations",
    checks => "checks",
    contents => "contents",
    deployments => "deployments",
    id_token => "id_token",
    issues => "issues",
    discussions => "discussions",
    packages => "packages",
    pages => "pages",
    pull_requests => "pull_requests",
    repository_projects => "repository_projects",
    security_events => "security_events",
    statuses => "statuses",
}

impl Permissions {
    /// `read-all` or `write-all`.
    #[track_caller]
    pub fn all(&self, level: &str) -> &Self {
        let ctx = self.owner.ctx();
        ctx.enter();
        if let Some(Value::Element(scopes)) = self.owner.get("permissions") {
            if scopes.has_any() {
                ctx.error(MIXED_PERMISSIONS);
                return self;
            }
        }
        self.owner.set("permissions", level);
        self
    }

    /// Set a scope by name, `id-token` and `id_token` alike.
    #[track_caller]
    pub fn set(&self, scope: &str, level: &str) -> &Self {
        let ctx = self.owner.ctx();
        ctx.enter();
        let name = scope.replace('-', "_");
        match PERMISSIONS.field(&name) {
            Some((_, field)) => self.update(field.name, level),
            None => {
                let known: Vec<String> = PERMISSIONS
                    .fields
                    .iter()
                    .map(|field| PERMISSIONS.key(field.name))
                    .collect();
                ctx.error(format!(
                    "unknown permission `{scope}`, expected one of: {}",
                    known.join(", ")
                ));
            }
        }
        self
    }

    fn update(&self, scope: &'static str, level: &str) {
        let Some(owner) = self.owner.path() else {
            return;
        };
        let ctx = self.owner.ctx();
        match self.owner.get("permissions") {
            Some(Value::Str(all)) if ALL_PERMISSIONS.contains(&all.as_str()) => {
                ctx.error(MIXED_PERMISSIONS);
            }
            _ => ctx.update(&owner.field("permissions"), scope, level),
        }
    }
}

// ============================================================================
// DEFAULTS, CONCURRENCY, ENVIRONMENT
// ============================================================================

/// `defaults.run` of the current job or the workflow.
#[derive(Clone)]
pub struct Defaults {
    target: Target,
}

impl Defaults {
    #[track_caller]
    pub fn shell(&self, shell: impl Into<Value>) -> &Self {
        self.target.ctx().enter();
        self.target.set("shell", shell);
        self
    }

    #[track_caller]
    pub fn working_directory(&self, directory: impl Into<Value>) -> &Self {
        self.target.ctx().enter();
        self.target.set("working_directory", directory);
        self
    }
}

#[derive(Clone)]
pub struct Concurrency {
    target: Target,
}

impl Concurrency {
    #[track_caller]
    pub fn cancel_in_progress(&self, value: impl Into<Value>) -> &Self {
        self.target.ctx().enter();
        self.target.set("cancel_in_progress", value);
        self
    }
}

#[derive(Clone)]
pub struct Environment {
    target: Target,
}

impl Environment {
    #[track_caller]
    pub fn url(&self, url: impl Into<Value>) -> &Self {
        self.target.ctx().enter();
        self.target.set("url", url);
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::{build, Gen};
    use crate::contexts::github;

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
    fn test_permissions() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.permissions()
                .actions("read")
                .deployments("write")
                .statuses("none");
            w.job("j1", |w| {
                w.permissions().all("read-all");
                w.run("");
            });
            w.job("j2", |w| {
                w.permissions().all("write-all");
                w.run("");
            });
            w.job("j3", |w| {
                w.permissions().packages("read").set("discussions", "write");
                w.run("");
            });
        });
        assert_eq!(
            out,
            r#"on:
  workflow_dispatch: {}
permissions:
  actions: read
  deployments: write
  statuses: none
jobs:
  j1:
    permissions: read-all
    runs-on: ubuntu-latest
    steps:
    - run: ''
  j2:
    permissions: write-all
    runs-on: ubuntu-latest
    steps:
    - run: ''
  j3:
    permissions:
      discussions: write
      packages: read
    runs-on: ubuntu-latest
    steps:
    - run: ''
"#
        );
    }

    #[test]
    fn test_id_token_permission() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.permissions().set("id-token", "write").contents("read");
            w.run("");
        });
        assert!(out.contains("permissions:\n  contents: read\n  id-token: write\n"));
    }

    #[test]
    fn test_empty_permissions() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.permissions();
            w.run("");
        });
        assert!(out.contains("\npermissions: {}\n"));
    }

    #[test]
    fn test_permission_errors() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.job("a", |w| {
                w.permissions().contents("read").all("read-all");
            });
            w.job("b", |w| {
                w.permissions().all("write-all").contents("read");
            });
            w.job("c", |w| {
                w.permissions().set("everything", "read");
                w.permissions().id_token("read");
            });
        });
        assert_eq!(errors.len(), 4);
        assert_eq!(
            errors[0],
            "`permissions` cannot be set to `read-all` or `write-all` with any other more specific permission field"
        );
        assert_eq!(errors[0], errors[1]);
        assert!(errors[2].starts_with("unknown permission `everything`, expected one of: actions,"));
        assert_eq!(
            errors[3],
            "expected `id_token` to be of type `'write' | 'none'`, got `'read'` of type `str`"
        );
    }

    #[test]
    fn test_defaults_and_concurrency() {
        let out = yaml(|w| {
            w.on().workflow_dispatch();
            w.defaults().shell("bash").working_directory("src");
            w.concurrency(format!("ci-{}", github().field("ref")))
                .cancel_in_progress(true);
            w.job("j", |w| {
                w.defaults().shell("pwsh");
                w.concurrency("deploy");
                w.environment("production").url("https://example.com");
                w.run("");
            });
        });
        assert_eq!(
            out,
            r#"on:
  workflow_dispatch: {}
concurrency:
  group: ci-${{ github.ref }}
  cancel-in-progress: true
defaults:
  run:
    shell: bash
    working-directory: src
jobs:
  j:
    runs-on: ubuntu-latest
    concurrency:
      group: deploy
    environment:
      name: production
      url: https://example.com
    defaults:
      run:
        shell: pwsh
    steps:
    - run: ''
"#
        );
    }

    #[test]
    fn test_environment_is_job_only() {
        let errors = messages(|w| {
            w.on().workflow_dispatch();
            w.job("j", |_| {});
            w.environment("production");
        });
        assert_eq!(
            errors,
            vec!["`environment` is a `job` field, but implicit job cannot be created because there are already jobs in the workflow"]
        );
    }
}
