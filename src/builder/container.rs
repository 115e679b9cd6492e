//! Job container and service containers

use std::rc::Rc;

use crate::contexts;
use crate::element::Value;
use crate::expr::{AsExpr, Expr};

use super::{Context, Entry, Gen, Path, Scope, Target};

/// Container the steps of the current job run in.
#[derive(Clone)]
pub struct Container {
    target: Target,
}

/// Service container of the current job, reading back as
/// `job.services.<id>`.
#[derive(Clone)]
pub struct Service {
    entry: Entry,
    id: String,
}

impl Gen {
    #[track_caller]
    pub fn container(&self, image: impl Into<Value>) -> Container {
        self.ctx.enter();
        let path = self
            .ctx
            .scope(Scope::Job, "container")
            .map(|root| Path::new(root).field("container"));
        let container = Container {
            target: Target::new(&self.ctx, path),
        };
        container.target.set("image", image);
        container
    }

    /// Add a service container; its image defaults to the id.
    #[track_caller]
    pub fn service(&self, id: &str) -> Service {
        self.ctx.enter();
        let paths = self
            .ctx
            .scope(Scope::Job, "services")
            .map(Path::new)
            .into_iter()
            .collect();
        let entry = Entry::append(&self.ctx, paths, "services", "service");
        entry.set_id(id);
        entry.set("image", id);
        Service {
            entry,
            id: id.to_string(),
        }
    }
}

/// Settings shared by job and service containers.
macro_rules! container_settings {
    ($handle:ident) => {
        impl $handle {
            #[track_caller]
            pub fn image(&self, image: impl Into<Value>) -> &Self {
                self.ctx().enter();
                self.set("image", image.into());
                self
            }

            /// Registry credentials.
            #[track_caller]
            pub fn credentials(
                &self,
                username: impl Into<Value>,
                password: impl Into<Value>,
            ) -> &Self {
                let ctx = self.ctx();
                ctx.enter();
                if let Some(path) = self.path() {
                    let credentials = path.field("credentials");
                    ctx.update(&credentials, "username", username);
                    ctx.update(&credentials, "password", password);
                }
                self
            }

            #[track_caller]
            pub fn env<K, V>(&self, vars: impl IntoIterator<Item = (K, V)>) -> &Self
            where
                K: Into<String>,
                V: Into<Value>,
            {
                self.ctx().enter();
                self.set("env", Value::map(vars));
                self
            }

            #[track_caller]
            pub fn ports<V: Into<Value>>(&self, ports: impl IntoIterator<Item = V>) -> &Self {
                self.ctx().enter();
                self.set("ports", Value::List(ports.into_iter().map(Into::into).collect()));
                self
            }

            #[track_caller]
            pub fn volumes<V: Into<Value>>(&self, volumes: impl IntoIterator<Item = V>) -> &Self {
                self.ctx().enter();
                self.set("volumes", Value::List(volumes.into_iter().map(Into::into).collect()));
                self
            }

            /// Extra `docker create` options.
            #[track_caller]
            pub fn options(&self, options: impl Into<Value>) -> &Self {
                self.ctx().enter();
                self.set("options", options.into());
                self
            }
        }
    };
}

impl Container {
    fn ctx(&self) -> &Rc<Context> {
        self.target.ctx()
    }

    fn path(&self) -> Option<Path> {
        self.target.path().cloned()
    }

    fn set(&self, field: &'static str, value: Value) {
        self.target.set(field, value);
    }
}

container_settings!(Container);

impl AsExpr for Container {
    fn as_expr(&self) -> Expr {
        contexts::job().field("container")
    }
}

impl Service {
    fn ctx(&self) -> &Rc<Context> {
        self.entry.ctx()
    }

    fn path(&self) -> Option<Path> {
        self.entry.path()
    }

    fn set(&self, field: &'static str, value: Value) {
        self.entry.set(field, value);
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

container_settings!(Service);

impl AsExpr for Service {
    fn as_expr(&self) -> Expr {
        contexts::job().field("services").field(&self.id)
    }
}
