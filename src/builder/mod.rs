//! Workflow builder engine (v0.1)
//!
//! [`build`] runs a construction closure against a [`Gen`], the handle through
//! which every part of the workflow is declared. The engine keeps:
//! - the document tree under construction
//! - the current position (workflow body, an explicit job, or the auto job
//!   created by the first job-level call in a workflow without jobs)
//! - the errors accumulated so far, each keyed to the user call site
//!
//! Every write goes through [`Context::update`]: ensure the path exists,
//! type-check against the schema, validate referenced context paths, then
//! merge into the existing value. Lists concatenate and maps merge key-wise,
//! so repeated calls add up instead of overwriting.

mod container;
mod job;
mod on;
mod settings;
mod step;
mod strategy;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::panic::Location;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Catalog;
use crate::contexts::context_path;
use crate::element::{merge, Element, Value};
use crate::error::{Error, GenerationError};
use crate::expr::{self, Expr, Site};
use crate::generic::Generic;
use crate::rules::PLACEHOLDER;
use crate::schema::{key, Ty};
use crate::validator::{self, MatrixKeys, Position, RuleEnv};
use crate::workflow::{DEFAULT_RUNNER, JOB, WORKFLOW};

pub use container::{Container, Service};
pub use job::JobHandle;
pub use on::{Event, Input, On, Output, PullRequest, Push, Secret, WorkflowCall, WorkflowDispatch};
pub use settings::{Concurrency, Defaults, Environment, Permissions};
pub use step::Step;
pub use strategy::Strategy;

static ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex"));

pub(crate) fn is_valid_id(id: &str) -> bool {
    ID.is_match(id)
}

fn invalid_id(id: &str) -> String {
    format!(
        "invalid id `{id}`, ids must start with a letter or `_` and contain only letters, digits, `-` and `_`"
    )
}

// ============================================================================
// PATHS
// ============================================================================

/// Where a path starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Root {
    Workflow,
    Job(String),
    /// A job that could not be attached to the workflow; its writes are
    /// still checked but end up nowhere
    Detached(String),
}

impl Root {
    fn job_id(&self) -> Option<&str> {
        match self {
            Root::Workflow => None,
            Root::Job(id) | Root::Detached(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Seg {
    Field(&'static str),
    Index(usize),
}

/// Location of an element in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Path {
    root: Root,
    segs: Vec<Seg>,
}

impl Path {
    pub(crate) fn new(root: Root) -> Self {
        Self {
            root,
            segs: Vec::new(),
        }
    }

    pub(crate) fn field(&self, name: &'static str) -> Self {
        let mut path = self.clone();
        path.segs.push(Seg::Field(name));
        path
    }

    pub(crate) fn index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.segs.push(Seg::Index(index));
        path
    }

    pub(crate) fn root(&self) -> &Root {
        &self.root
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = self.root.job_id() {
            parts.push(format!("jobs.{id}"));
        }
        for seg in &self.segs {
            match seg {
                Seg::Field(name) => parts.push(key(name, true)),
                Seg::Index(index) => parts.push(index.to_string()),
            }
        }
        f.write_str(&parts.join("."))
    }
}

/// Which part of the workflow a call applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// The workflow body, never inside a job
    Workflow,
    /// The current job, created implicitly if the workflow has none yet
    Job,
    /// The current job if any, else the workflow
    JobOrWorkflow,
}

// ============================================================================
// STATE
// ============================================================================

struct State {
    workflow: Element,
    detached: Element,
    job: Option<Root>,
    /// Field whose use created the auto job
    auto_job: Option<String>,
}

fn empty_value(ty: &'static Ty) -> Value {
    match ty.instantiable() {
        Ty::Record(record) => Value::Element(Element::new(record)),
        Ty::Map(_) => Value::Map(Vec::new()),
        _ => Value::List(Vec::new()),
    }
}

impl State {
    fn new() -> Self {
        Self {
            workflow: Element::new(&WORKFLOW),
            detached: Element::new(&JOB),
            job: None,
            auto_job: None,
        }
    }

    fn root(&self, root: &Root) -> Option<&Element> {
        match root {
            Root::Workflow => Some(&self.workflow),
            Root::Job(id) => self.workflow.get("jobs")?.entry(id)?.as_element(),
            Root::Detached(_) => Some(&self.detached),
        }
    }

    fn root_mut(&mut self, root: &Root) -> Option<&mut Element> {
        match root {
            Root::Workflow => Some(&mut self.workflow),
            Root::Job(id) => match self.workflow.get_mut("jobs")? {
                Value::Map(entries) => entries
                    .iter_mut()
                    .find(|(key, _)| key == id)
                    .and_then(|(_, job)| job.as_element_mut()),
                _ => None,
            },
            Root::Detached(_) => Some(&mut self.detached),
        }
    }

    /// The element at a path, if it exists.
    fn lookup(&self, path: &Path) -> Option<&Element> {
        let mut element = self.root(&path.root)?;
        let mut segs = path.segs.iter().peekable();
        while let Some(seg) = segs.next() {
            let Seg::Field(name) = *seg else { return None };
            let value = element.get(name)?;
            element = match segs.peek() {
                Some(&&Seg::Index(index)) => {
                    segs.next();
                    value.as_list()?.get(index)?.as_element()?
                }
                _ => value.as_element()?,
            };
        }
        Some(element)
    }

    /// The element at a path, creating missing records on the way.
    ///
    /// Returns `None` when the path crosses a value that is not a record,
    /// such as a matrix given as an expression.
    fn ensure(&mut self, path: &Path) -> Option<&mut Element> {
        let mut element = self.root_mut(&path.root)?;
        let mut segs = path.segs.iter().peekable();
        while let Some(seg) = segs.next() {
            let Seg::Field(name) = *seg else { return None };
            let (_, field) = element.schema().field(name)?;
            let slot = element.slot_mut(name)?;
            let value = slot.get_or_insert_with(|| empty_value(&field.ty));
            element = match segs.peek() {
                Some(&&Seg::Index(index)) => {
                    segs.next();
                    match value {
                        Value::List(items) => items.get_mut(index)?.as_element_mut()?,
                        _ => return None,
                    }
                }
                _ => value.as_element_mut()?,
            };
        }
        Some(element)
    }

    fn jobs(&self) -> Vec<String> {
        self.workflow
            .get("jobs")
            .map(|jobs| jobs.keys().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    fn insert_job(&mut self, id: &str, job: Element) {
        let slot = self.workflow.slot_mut("jobs");
        if let Some(Value::Map(entries)) =
            slot.map(|slot| slot.get_or_insert_with(|| Value::Map(Vec::new())))
        {
            entries.push((id.to_string(), Value::Element(job)));
        }
    }

    fn trigger(&self, name: &str) -> Option<&Element> {
        self.workflow
            .get("on")?
            .as_element()?
            .get(name)?
            .as_element()
    }

    fn input_ids(&self) -> Vec<String> {
        ["workflow_dispatch", "workflow_call"]
            .iter()
            .filter_map(|trigger| self.trigger(trigger)?.get("inputs")?.as_list())
            .flatten()
            .filter_map(|input| input.as_element()?.id().map(String::from))
            .collect()
    }

    /// Surroundings of a write, as seen by the rule grammars.
    fn rule_env(&self, path: &Path, field: &str) -> RuleEnv {
        let position = position(path, field);
        let mut env = RuleEnv::new(position);
        env.job = path.root.job_id().map(String::from);
        env.jobs = self.jobs();
        env.inputs = self.input_ids();
        if let Some(job) = self.root(&path.root).filter(|_| env.job.is_some()) {
            let steps = job.get("steps").and_then(Value::as_list).unwrap_or_default();
            let visible: &[Value] = match position {
                Position::Step(index) => &steps[..index.min(steps.len())],
                Position::JobOutputs => steps,
                _ => &[],
            };
            env.steps = visible
                .iter()
                .filter_map(|step| step.as_element()?.id().map(String::from))
                .collect();
            env.matrix = matrix_keys(job);
        }
        env
    }
}

fn position(path: &Path, field: &str) -> Position {
    match (&path.root, path.segs.as_slice()) {
        (
            Root::Workflow,
            [Seg::Field("on"), Seg::Field("workflow_call"), Seg::Field("outputs"), Seg::Index(_)],
        ) if field == "value" => Position::WorkflowCallOutput,
        (Root::Workflow, [Seg::Field("on"), ..]) => Position::Trigger,
        (Root::Workflow, _) => Position::Workflow,
        (_, [Seg::Field("steps"), Seg::Index(index), ..]) => Position::Step(*index),
        (_, []) if field == "outputs" => Position::JobOutputs,
        _ => Position::Job,
    }
}

fn matrix_keys(job: &Element) -> MatrixKeys {
    let matrix = job
        .get("strategy")
        .and_then(Value::as_element)
        .and_then(|strategy| strategy.get("matrix"));
    let Some(matrix) = matrix else {
        return MatrixKeys::Missing;
    };
    let Some(matrix) = matrix.as_element() else {
        return MatrixKeys::Dynamic;
    };
    let mut keys: Vec<String> = matrix
        .get("values")
        .map(|values| values.keys().into_iter().map(String::from).collect())
        .unwrap_or_default();
    let rows = matrix.get("include").and_then(Value::as_list).unwrap_or_default();
    for row in rows {
        for name in row.keys() {
            if !keys.iter().any(|k| k == name) {
                keys.push(name.to_string());
            }
        }
    }
    MatrixKeys::Keys(keys)
}

/// Report pending error sentinels anywhere in a value.
fn settle(value: &Value) -> bool {
    match value {
        Value::Expr(expr) => expr.settle(),
        Value::List(items) => items.iter().fold(true, |ok, item| settle(item) && ok),
        Value::Map(entries) => entries
            .iter()
            .fold(true, |ok, (_, item)| settle(item) && ok),
        _ => true,
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

thread_local! {
    static BUILDING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the thread as building a workflow until dropped.
struct Building(());

impl Building {
    fn start() -> Self {
        BUILDING.with(|building| {
            assert!(
                !building.get(),
                "a workflow is already being built on this thread"
            );
            building.set(true);
        });
        Building(())
    }
}

impl Drop for Building {
    fn drop(&mut self) {
        BUILDING.with(|building| building.set(false));
    }
}

pub(crate) struct Context {
    workflow_id: String,
    catalog: Catalog,
    origin: &'static Location<'static>,
    state: RefCell<State>,
    errors: RefCell<Vec<Error>>,
    /// Call site of the builder method being executed
    at: Cell<Option<&'static Location<'static>>>,
    /// Errors of rendered sentinels, waiting for the call that receives them
    deferred: RefCell<Vec<String>>,
    /// Records of id-keyed lists, named at the end if still anonymous
    keyed: RefCell<Vec<(Rc<[Slot]>, &'static str)>>,
    open: Cell<bool>,
}

impl Context {
    fn new(workflow_id: &str, catalog: Catalog, origin: &'static Location<'static>) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            catalog,
            origin,
            state: RefCell::new(State::new()),
            errors: RefCell::new(Vec::new()),
            at: Cell::new(None),
            deferred: RefCell::new(Vec::new()),
            keyed: RefCell::new(Vec::new()),
            open: Cell::new(true),
        }
    }

    /// Record the user call site of a builder method.
    #[track_caller]
    pub(crate) fn enter(&self) {
        let at = Location::caller();
        self.at.set(Some(at));
        self.flush(at);
    }

    fn flush(&self, at: &'static Location<'static>) {
        for message in self.deferred.take() {
            self.error_at(message, at);
        }
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Report an error at the current call site.
    ///
    /// # Panics
    ///
    /// Panics with the error when the workflow is no longer being built.
    #[track_caller]
    pub(crate) fn error(&self, message: impl Into<String>) {
        let at = match self.at.get() {
            Some(at) => at,
            None => Location::caller(),
        };
        self.error_at(message.into(), at);
    }

    fn error_at(&self, message: String, at: &'static Location<'static>) {
        let error = Error::at(at, Some(&self.workflow_id), message);
        if !self.open.get() {
            panic!("{}", GenerationError::new(vec![error]));
        }
        let mut errors = self.errors.borrow_mut();
        if !errors.contains(&error) {
            errors.push(error);
        }
    }

    /// Sink for expression errors.
    fn report(&self, message: String, site: Site) {
        let current = self.at.get().unwrap_or(self.origin);
        match site {
            Site::At(at) => self.error_at(message, at),
            Site::Current => self.error_at(message, current),
            Site::Next if self.open.get() => self.deferred.borrow_mut().push(message),
            Site::Next => self.error_at(message, current),
        }
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    /// Resolve where a call applies, `None` if it cannot apply anywhere.
    pub(crate) fn scope(&self, scope: Scope, what: &str) -> Option<Root> {
        let current = self.state.borrow().job.clone();
        match (scope, current) {
            (Scope::Workflow, Some(_)) => {
                self.error(format!("`{what}` must be used in a workflow"));
                None
            }
            (Scope::Workflow, None) | (Scope::JobOrWorkflow, None) => Some(Root::Workflow),
            (Scope::Job, Some(root)) | (Scope::JobOrWorkflow, Some(root)) => Some(root),
            (Scope::Job, None) => self.auto_job(what),
        }
    }

    fn auto_job(&self, what: &str) -> Option<Root> {
        let mut state = self.state.borrow_mut();
        if !state.jobs().is_empty() {
            drop(state);
            self.error(format!(
                "`{what}` is a `job` field, but implicit job cannot be created because there are already jobs in the workflow"
            ));
            return None;
        }
        let mut job = Element::new(&JOB);
        if let Some(name) = state.workflow.get("name").cloned() {
            job.set("name", name);
        }
        let id = self.workflow_id.clone();
        state.insert_job(&id, job);
        state.job = Some(Root::Job(id.clone()));
        state.auto_job = Some(what.to_string());
        tracing::debug!(workflow = %id, field = what, "created implicit job");
        Some(Root::Job(id))
    }

    /// Attach a new explicit job, or detach it if that is not allowed here.
    fn open_job(&self, id: &str) -> Root {
        let (auto_job, nested, exists) = {
            let state = self.state.borrow();
            (
                state.auto_job.clone(),
                state.job.is_some(),
                state.jobs().iter().any(|job| job == id),
            )
        };
        let message = if !is_valid_id(id) {
            Some(invalid_id(id))
        } else if let Some(reason) = auto_job {
            Some(format!(
                "explicit job `{id}` cannot be created after already implicitly creating a job, which happened when setting `{reason}`"
            ))
        } else if nested {
            Some(format!("job `{id}` not created directly inside a workflow body"))
        } else if exists {
            Some(format!(
                "job `{id}` already exists in workflow `{}`",
                self.workflow_id
            ))
        } else {
            None
        };
        match message {
            Some(message) => {
                self.error(message);
                Root::Detached(id.to_string())
            }
            None => {
                self.state.borrow_mut().insert_job(id, Element::new(&JOB));
                Root::Job(id.to_string())
            }
        }
    }

    /// Make `root` the current job; returns what to restore afterwards.
    fn enter_job(&self, root: Root) -> (Option<Root>, Element) {
        let mut state = self.state.borrow_mut();
        let job = state.job.replace(root);
        let detached = mem::replace(&mut state.detached, Element::new(&JOB));
        (job, detached)
    }

    fn leave_job(&self, (job, detached): (Option<Root>, Element)) {
        let mut state = self.state.borrow_mut();
        state.job = job;
        state.detached = detached;
    }

    // ------------------------------------------------------------------------
    // Tree access
    // ------------------------------------------------------------------------

    /// Create the element at `path` if missing.
    pub(crate) fn ensure(&self, path: &Path) -> bool {
        self.state.borrow_mut().ensure(path).is_some()
    }

    pub(crate) fn get(&self, path: &Path, field: &str) -> Option<Value> {
        self.state.borrow().lookup(path)?.get(field).cloned()
    }

    /// Whether the element at `path` has a field set beyond its defaults.
    fn is_configured(&self, path: &Path) -> bool {
        self.state
            .borrow()
            .lookup(path)
            .is_some_and(Element::has_explicit)
    }

    /// Whether the element at `path` has `field` set.
    pub(crate) fn has(&self, path: &Path, field: &str) -> bool {
        self.state
            .borrow()
            .lookup(path)
            .is_some_and(|element| element.get(field).is_some())
    }

    /// Type-check, validate and merge a value into `field` of the element
    /// at `path`. Values failing the type check are not stored.
    pub(crate) fn update(&self, path: &Path, field: &'static str, value: impl Into<Value>) {
        let value = value.into();
        if !settle(&value) {
            return;
        }
        let schema = self.state.borrow_mut().ensure(path).map(|e| e.schema());
        let Some((_, spec)) = schema.and_then(|schema| schema.field(field)) else {
            return;
        };
        if !value.conforms(&spec.ty) {
            self.error(format!(
                "expected `{field}` to be of type `{}`, got `{}` of type `{}`",
                spec.ty,
                value.repr(),
                value.kind()
            ));
            return;
        }
        self.validate(path, field, &value);
        self.store(path, field, value);
    }

    /// Merge a value without checks.
    pub(crate) fn store(&self, path: &Path, field: &str, value: Value) {
        let mut state = self.state.borrow_mut();
        let slot = state
            .ensure(path)
            .and_then(|element| element.slot_mut(field));
        if let Some(slot) = slot {
            if let Some(merged) = merge(slot.as_ref(), Some(value), false) {
                *slot = Some(merged);
            }
        }
    }

    /// Run the rule grammars over the context paths referenced by a value
    /// written at `path`, then add the jobs it needs to the current job.
    pub(crate) fn validate(&self, path: &Path, field: &str, value: &Value) -> bool {
        let refs = validator::references(value);
        if refs.is_empty() {
            return true;
        }
        let mut env = self.state.borrow().rule_env(path, field);
        let passed = validator::check(&refs, &mut env);
        for message in env.messages {
            self.error(message);
        }
        if !env.needs.is_empty() {
            self.add_needs(path.root(), &env.needs);
        }
        passed
    }

    fn add_needs(&self, root: &Root, ids: &[String]) {
        if !matches!(root, Root::Job(_)) {
            return;
        }
        let mut state = self.state.borrow_mut();
        let Some(job) = state.root_mut(root) else {
            return;
        };
        let Some(slot) = job.slot_mut("needs") else {
            return;
        };
        if let Value::List(needs) = slot.get_or_insert_with(|| Value::List(Vec::new())) {
            for id in ids {
                if !needs.iter().any(|need| need.as_str() == Some(id.as_str())) {
                    needs.push(Value::from(id));
                }
            }
        }
    }

    /// Append a fresh record to the list `field` at `path`, returning its index.
    pub(crate) fn append(&self, path: &Path, field: &'static str) -> Option<usize> {
        let mut state = self.state.borrow_mut();
        let element = state.ensure(path)?;
        let (_, spec) = element.schema().field(field)?;
        let record = spec.ty.element()?.record()?;
        let slot = element.slot_mut(field)?;
        match slot.get_or_insert_with(|| Value::List(Vec::new())) {
            Value::List(items) => {
                items.push(Value::Element(Element::new(record)));
                Some(items.len() - 1)
            }
            _ => None,
        }
    }

    /// Ids used by the records of the list `field` at `path`.
    pub(crate) fn sibling_ids(&self, path: &Path, field: &str) -> Vec<String> {
        let state = self.state.borrow();
        let ids = state
            .lookup(path)
            .and_then(|element| element.get(field))
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(|item| item.as_element()?.id().map(String::from))
            .collect();
        ids
    }

    /// Validate job handles given to `needs`, returning their ids.
    pub(crate) fn needs(&self, root: &Root, jobs: Vec<Expr>) -> Option<Vec<String>> {
        let mut ids = Vec::new();
        let mut unsupported = Vec::new();
        for job in &jobs {
            if !job.settle() {
                return None;
            }
            match job.path() {
                Some([context, id]) if context == "needs" => ids.push(id.clone()),
                _ => unsupported.push(format!("`{job}`")),
            }
        }
        if !unsupported.is_empty() {
            self.error(format!(
                "`needs` only accepts job handles returned by `job`, got {}",
                unsupported.join(", ")
            ));
            return None;
        }
        let value = Value::List(jobs.into_iter().map(Value::Expr).collect());
        self.validate(&Path::new(root.clone()), "needs", &value)
            .then_some(ids)
    }

    // ------------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------------

    /// Fill defaults and check the invariants that need the complete tree.
    fn finalize(&self) {
        // rendered after the last builder call
        self.flush(self.at.get().unwrap_or(self.origin));
        self.at.set(Some(self.origin));
        let mut messages = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            if let Some(Value::Map(jobs)) = state.workflow.get_mut("jobs") {
                for (job_id, job) in jobs.iter_mut() {
                    if let Some(job) = job.as_element_mut() {
                        finalize_job(job_id, job, &mut messages);
                    }
                }
            }
        }
        let state = self.state.borrow();
        let id = &self.workflow_id;
        let has_triggers = state
            .workflow
            .get("on")
            .and_then(Value::as_element)
            .is_some_and(Element::has_any);
        if !has_triggers {
            messages.push(format!("workflow `{id}` must have at least one trigger"));
        } else if state.jobs().is_empty() {
            messages.push(format!("workflow `{id}` must have at least one job"));
        }
        let outputs = state
            .trigger("workflow_call")
            .and_then(|call| call.get("outputs"))
            .and_then(Value::as_list)
            .unwrap_or_default();
        let unset: Vec<&str> = outputs
            .iter()
            .filter_map(Value::as_element)
            .filter(|output| output.get("value").is_none())
            .filter_map(Element::id)
            .collect();
        if !unset.is_empty() {
            messages.push(format!(
                "workflow `{id}` has no value set for {}, use `outputs` to set them",
                unset.join(", ")
            ));
        }
        drop(state);
        for message in messages {
            self.error(message);
        }
    }

    /// Stop accepting errors and hand out the result.
    fn close(&self) -> Result<Workflow, GenerationError> {
        self.open.set(false);
        let errors = self.errors.take();
        if !errors.is_empty() {
            return Err(GenerationError::new(errors));
        }
        let root = mem::replace(&mut self.state.borrow_mut().workflow, Element::new(&WORKFLOW));
        Ok(Workflow {
            id: self.workflow_id.clone(),
            root,
        })
    }
}

/// Synthesize ids for keyed records configured without one, which would
/// otherwise have no key to render under.
fn name_anonymous(ctx: &Rc<Context>) {
    for (slots, stem) in ctx.keyed.take() {
        let entry = Entry {
            ctx: ctx.clone(),
            slots,
            stem,
        };
        let configured = entry.path().is_some_and(|path| ctx.is_configured(&path));
        if configured && entry.id().is_none() {
            entry.ensure_id();
        }
    }
}

fn finalize_job(job_id: &str, job: &mut Element, messages: &mut Vec<String>) {
    let mut has_steps = false;
    if let Some(Value::List(steps)) = job.get_mut("steps") {
        has_steps = !steps.is_empty();
        for (index, step) in steps.iter_mut().enumerate() {
            let Some(step) = step.as_element_mut() else {
                continue;
            };
            let has_uses = step.get("uses").is_some();
            let has_with = matches!(step.get("with_"), Some(Value::Map(args)) if !args.is_empty());
            if has_with && !has_uses {
                let label = step
                    .id()
                    .map_or_else(|| (index + 1).to_string(), String::from);
                messages.push(format!(
                    "step `{label}` in job `{job_id}` has a `with` but no `uses`"
                ));
            } else if !has_uses && step.get("run").is_none() {
                step.set("run", "");
            }
        }
    }
    if has_steps && job.get("runs_on").is_none() {
        job.set("runs_on", DEFAULT_RUNNER);
    }
}

// ============================================================================
// ENTRIES
// ============================================================================

/// One id-bearing record: entry `index` of the list `field` at `path`.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    path: Path,
    field: &'static str,
    index: usize,
}

impl Slot {
    fn element(&self) -> Path {
        self.path.field(self.field).index(self.index)
    }
}

/// Shared core of the handles for steps, inputs, secrets, outputs and
/// services. An entry can stand for the same record in several lists (an
/// input declared on both `workflow_call` and `workflow_dispatch`), or for
/// nothing at all when it could not be created.
#[derive(Clone)]
pub(crate) struct Entry {
    ctx: Rc<Context>,
    slots: Rc<[Slot]>,
    stem: &'static str,
}

impl Entry {
    /// Append a new record to the list `field` of every path.
    pub(crate) fn append(
        ctx: &Rc<Context>,
        paths: Vec<Path>,
        field: &'static str,
        stem: &'static str,
    ) -> Self {
        let slots: Vec<Slot> = paths
            .into_iter()
            .filter_map(|path| {
                let index = ctx.append(&path, field)?;
                Some(Slot { path, field, index })
            })
            .collect();
        Self {
            ctx: ctx.clone(),
            slots: slots.into(),
            stem,
        }
    }

    /// Like [`Entry::append`], for lists rendered as maps keyed by id.
    pub(crate) fn keyed(
        ctx: &Rc<Context>,
        paths: Vec<Path>,
        field: &'static str,
        stem: &'static str,
    ) -> Self {
        let entry = Self::append(ctx, paths, field, stem);
        ctx.keyed
            .borrow_mut()
            .push((entry.slots.clone(), entry.stem));
        entry
    }

    pub(crate) fn ctx(&self) -> &Rc<Context> {
        &self.ctx
    }

    /// Path of the first record, if any.
    pub(crate) fn path(&self) -> Option<Path> {
        self.slots.first().map(Slot::element)
    }

    pub(crate) fn set(&self, field: &'static str, value: impl Into<Value>) {
        let value = value.into();
        for slot in self.slots.iter() {
            self.ctx.update(&slot.element(), field, value.clone());
        }
    }

    /// Merge without checks into every record.
    pub(crate) fn store(&self, field: &'static str, value: Value) {
        for slot in self.slots.iter() {
            self.ctx.store(&slot.element(), field, value.clone());
        }
    }

    pub(crate) fn get(&self, field: &str) -> Option<Value> {
        self.ctx.get(&self.path()?, field)
    }

    pub(crate) fn has(&self, field: &str) -> bool {
        self.path().is_some_and(|path| self.ctx.has(&path, field))
    }

    pub(crate) fn id(&self) -> Option<String> {
        self.get("id").and_then(|id| id.as_str().map(String::from))
    }

    fn is_free(&self, id: &str) -> bool {
        self.slots.iter().all(|slot| {
            !self
                .ctx
                .sibling_ids(&slot.path, slot.field)
                .iter()
                .any(|used| used == id)
        })
    }

    /// Set an explicit id.
    pub(crate) fn set_id(&self, id: &str) {
        let Some(first) = self.slots.first() else {
            return;
        };
        if let Some(existing) = self.id() {
            self.ctx.error(format!(
                "id was already specified for this element as `{existing}`"
            ));
        } else if !is_valid_id(id) {
            self.ctx.error(invalid_id(id));
        } else if !self.is_free(id) {
            let parent = first.path.field(first.field);
            self.ctx
                .error(format!("id `{id}` already used in `{parent}`"));
        } else {
            self.store("id", Value::from(id));
        }
    }

    /// Derive the id from a name: the name itself if free, else `name-1`, ...
    pub(crate) fn id_hint(&self, hint: &str) {
        if self.slots.is_empty() {
            return;
        }
        if let Some(existing) = self.id() {
            self.ctx.error(format!(
                "id was already specified for this element as `{existing}`"
            ));
            return;
        }
        let id = self.allocate(hint, false);
        if is_valid_id(&id) {
            self.store("id", Value::from(id));
        } else {
            self.ctx.error(invalid_id(&id));
        }
    }

    /// The id, synthesizing `<stem>-<n>` if none was given.
    pub(crate) fn ensure_id(&self) -> String {
        if let Some(id) = self.id() {
            return id;
        }
        if self.slots.is_empty() {
            return self.stem.to_string();
        }
        let id = self.allocate(self.stem, true);
        self.store("id", Value::from(id.as_str()));
        id
    }

    fn allocate(&self, prefix: &str, start_from_one: bool) -> String {
        let prefix = key(prefix, false);
        if !start_from_one && self.is_free(&prefix) {
            return prefix;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{prefix}-{n}");
            if self.is_free(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// `<root>.<id>` followed by `rest`.
    /// Entries that could not be created read as `<root>.*`, which the
    /// reference checks accept; the failure itself was already reported.
    pub(crate) fn context(&self, root: &str, rest: &[&str]) -> Expr {
        let id = if self.slots.is_empty() {
            PLACEHOLDER.to_string()
        } else {
            self.ensure_id()
        };
        let mut segments = vec![id.as_str()];
        segments.extend_from_slice(rest);
        context_path(root, &segments)
    }
}

/// A single record position that is not an id-list entry (`strategy`,
/// `container`, a trigger). `None` when the call could not apply.
#[derive(Clone)]
pub(crate) struct Target {
    ctx: Rc<Context>,
    path: Option<Path>,
}

impl Target {
    pub(crate) fn new(ctx: &Rc<Context>, path: Option<Path>) -> Self {
        if let Some(path) = &path {
            ctx.ensure(path);
        }
        Self {
            ctx: ctx.clone(),
            path,
        }
    }

    pub(crate) fn ctx(&self) -> &Rc<Context> {
        &self.ctx
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub(crate) fn set(&self, field: &'static str, value: impl Into<Value>) {
        if let Some(path) = &self.path {
            self.ctx.update(path, field, value);
        }
    }

    pub(crate) fn get(&self, field: &str) -> Option<Value> {
        self.ctx.get(self.path.as_ref()?, field)
    }
}

// ============================================================================
// PUBLIC SURFACE
// ============================================================================

/// A finished workflow.
#[derive(Debug, Clone)]
pub struct Workflow {
    id: String,
    root: Element,
}

impl Workflow {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn to_generic(&self) -> Generic {
        self.root.to_generic()
    }

    /// YAML document, without the header comment.
    pub fn to_yaml(&self) -> String {
        self.to_generic().to_yaml()
    }
}

/// Builder handle passed to construction closures.
///
/// Workflow-level calls, job-level calls and step creation all go through
/// it; which job a call applies to is decided by the enclosing [`Gen::job`].
#[derive(Clone)]
pub struct Gen {
    ctx: Rc<Context>,
}

impl fmt::Debug for Gen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gen")
            .field("workflow", &self.ctx.workflow_id)
            .finish()
    }
}

/// Build a workflow with an empty action catalog.
///
/// # Panics
///
/// Panics when called from inside another construction closure.
#[track_caller]
pub fn build(id: &str, f: impl FnOnce(&Gen)) -> Result<Workflow, GenerationError> {
    build_with(id, &Catalog::default(), f)
}

/// Build a workflow, resolving step `uses` through `catalog`.
///
/// # Panics
///
/// Panics when called from inside another construction closure.
#[track_caller]
pub fn build_with(
    id: &str,
    catalog: &Catalog,
    f: impl FnOnce(&Gen),
) -> Result<Workflow, GenerationError> {
    let _building = Building::start();
    let origin = Location::caller();
    let ctx = Rc::new(Context::new(id, catalog.clone(), origin));
    let _handler = {
        let ctx = ctx.clone();
        expr::install_handler(move |message, site| ctx.report(message, site))
    };
    tracing::debug!(workflow = id, "building workflow");
    if !is_valid_id(id) {
        ctx.at.set(Some(origin));
        ctx.error(invalid_id(id));
    }
    let gen = Gen { ctx: ctx.clone() };
    f(&gen);
    name_anonymous(&ctx);
    ctx.finalize();
    ctx.close()
}

impl Gen {
    /// Id of the workflow being built.
    pub fn workflow_id(&self) -> &str {
        &self.ctx.workflow_id
    }

    /// Set the name of the current job, or of the workflow outside jobs.
    #[track_caller]
    pub fn name(&self, name: impl Into<Value>) -> &Self {
        self.ctx.enter();
        let root = self.ctx.scope(Scope::JobOrWorkflow, "name");
        if let Some(root) = root {
            self.ctx.update(&Path::new(root), "name", name);
        }
        self
    }

    /// Add environment variables to the current job, or to the workflow.
    #[track_caller]
    pub fn env<K, V>(&self, vars: impl IntoIterator<Item = (K, V)>) -> &Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.ctx.enter();
        let root = self.ctx.scope(Scope::JobOrWorkflow, "env");
        if let Some(root) = root {
            self.ctx.update(&Path::new(root), "env", Value::map(vars));
        }
        self
    }

    /// Triggers of the workflow.
    #[track_caller]
    pub fn on(&self) -> On {
        self.ctx.enter();
        let path = self
            .ctx
            .scope(Scope::Workflow, "on")
            .map(|root| Path::new(root).field("on"));
        On::new(&self.ctx, path)
    }
}
