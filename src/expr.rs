//! Symbolic expressions (v0.1)
//!
//! An [`Expr`] is a deferred formula over workflow context paths and literals.
//! It renders as `${{ formula }}` and keeps track of every context path it
//! references so that rule sets can check where it is used.
//!
//! Parenthesization is driven by the precedence table in [`Prec`], not by how
//! the formula was nested when it was built.

use std::cell::RefCell;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::panic::Location;
use std::rc::Rc;

use crate::contexts::Shape;

/// Marker prefixed to `needs` roots created from job handles.
///
/// Stripped on rendering; lets `workflow_call` outputs rewrite them to `jobs`.
pub(crate) const NEEDS_MARKER: &str = "\u{0}needs";

// ============================================================================
// PRECEDENCE
// ============================================================================

/// Operator precedence, lower binds tighter.
///
/// Each comparison operator has its own level, but GitHub parses a chain of
/// comparisons left to right: `a != b == c` reads as `(a != b) == c`. The
/// table alone decides parentheses on the left; a comparison nested as the
/// right operand of another comparison is always parenthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prec {
    Atom = 0,
    Index = 1,
    Field = 2,
    Not = 3,
    Lt = 4,
    Le = 5,
    Gt = 6,
    Ge = 7,
    Eq = 8,
    Ne = 9,
    And = 10,
    Or = 11,
}

impl Prec {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            Prec::Lt | Prec::Le | Prec::Gt | Prec::Ge | Prec::Eq | Prec::Ne
        )
    }

    fn symbol(self) -> &'static str {
        match self {
            Prec::Atom => "",
            Prec::Index => "[]",
            Prec::Field => ".",
            Prec::Not => "!",
            Prec::Lt => " < ",
            Prec::Le => " <= ",
            Prec::Gt => " > ",
            Prec::Ge => " >= ",
            Prec::Eq => " == ",
            Prec::Ne => " != ",
            Prec::And => " && ",
            Prec::Or => " || ",
        }
    }
}

// ============================================================================
// ERROR REPORTING
// ============================================================================

/// Where an expression error is attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Site {
    /// A known source location
    At(&'static Location<'static>),
    /// The builder call currently executing
    Current,
    /// The next builder call, which is the one consuming a rendered string
    Next,
}

type Handler = Rc<dyn Fn(String, Site)>;

thread_local! {
    static HANDLERS: RefCell<Vec<Handler>> = const { RefCell::new(Vec::new()) };
}

/// Report an expression error through the innermost installed handler.
///
/// # Panics
///
/// Panics with the message when no handler is installed.
pub(crate) fn report(message: String, site: Site) {
    let handler = HANDLERS.with(|stack| stack.borrow().last().cloned());
    match handler {
        Some(handler) => handler(message, site),
        None => panic!("{message}"),
    }
}

/// Uninstalls its handler on drop.
pub(crate) struct HandlerGuard(());

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        HANDLERS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pub(crate) fn install_handler(handler: impl Fn(String, Site) + 'static) -> HandlerGuard {
    HANDLERS.with(|stack| stack.borrow_mut().push(Rc::new(handler)));
    HandlerGuard(())
}

enum Message {
    Literal(String),
    Lazy(Box<dyn FnOnce() -> String>),
}

/// Error sentinel: reports its message the first time it is observed, then
/// stays inert.
#[derive(Clone)]
pub struct ErrorExpr {
    pending: Rc<RefCell<Option<Message>>>,
}

impl ErrorExpr {
    fn with(message: Message) -> Self {
        Self {
            pending: Rc::new(RefCell::new(Some(message))),
        }
    }

    fn observe(&self, site: Site) {
        let message = self.pending.borrow_mut().take();
        let message = match message {
            Some(Message::Literal(text)) => text,
            Some(Message::Lazy(make)) => make(),
            None => return,
        };
        report(message, site);
    }

    /// Whether the message was already reported
    pub fn is_spent(&self) -> bool {
        self.pending.borrow().is_none()
    }
}

impl fmt::Debug for ErrorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorExpr")
            .field("spent", &self.is_spent())
            .finish()
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug)]
struct Formula {
    text: String,
    prec: Prec,
    /// Context paths referenced anywhere in the formula
    refs: Vec<Vec<String>>,
    /// Set when the formula is itself a bare context path
    path: Option<Vec<String>>,
    shape: Option<&'static Shape>,
}

#[derive(Debug, Clone)]
enum Repr {
    Formula(Rc<Formula>),
    Error(ErrorExpr),
}

/// A symbolic expression.
///
/// Build one from a context root (see [`crate::contexts`]), a handle, or
/// [`Expr::literal`], then combine with the comparison and boolean methods or
/// the `&`, `|` and `!` operators.
#[derive(Debug, Clone)]
pub struct Expr(Repr);

/// Anything that can be read back as an expression.
pub trait AsExpr {
    fn as_expr(&self) -> Expr;
}

impl AsExpr for Expr {
    fn as_expr(&self) -> Expr {
        self.clone()
    }
}

impl<T: AsExpr + ?Sized> AsExpr for &T {
    fn as_expr(&self) -> Expr {
        (**self).as_expr()
    }
}

/// An operand of an expression operator or function call.
#[derive(Debug, Clone)]
pub enum Operand {
    Expr(Expr),
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Null,
}

impl From<Expr> for Operand {
    fn from(value: Expr) -> Self {
        Operand::Expr(value)
    }
}

impl<T: AsExpr + ?Sized> From<&T> for Operand {
    fn from(value: &T) -> Self {
        Operand::Expr(value.as_expr())
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Str(value.to_string())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::Str(value)
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Bool(value)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Int(value)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Int(value.into())
    }
}

impl From<u32> for Operand {
    fn from(value: u32) -> Self {
        Operand::Int(value.into())
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Float(value)
    }
}

impl<T: Into<Operand>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        value.map_or(Operand::Null, Into::into)
    }
}

/// Quote a string literal: single quotes, inner quotes doubled.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl Operand {
    fn into_formula(self) -> Result<Rc<Formula>, ErrorExpr> {
        let text = match self {
            Operand::Expr(Expr(Repr::Formula(formula))) => return Ok(formula),
            Operand::Expr(Expr(Repr::Error(error))) => return Err(error),
            Operand::Str(text) => quote(&text),
            Operand::Bool(value) => value.to_string(),
            Operand::Int(value) => value.to_string(),
            Operand::Float(value) => value.to_string(),
            Operand::Null => "null".to_string(),
        };
        Ok(Rc::new(Formula {
            text,
            prec: Prec::Atom,
            refs: Vec::new(),
            path: None,
            shape: None,
        }))
    }
}

fn wrap(formula: &Formula, limit: Prec) -> String {
    if formula.prec > limit {
        format!("({})", formula.text)
    } else {
        formula.text.clone()
    }
}

impl Expr {
    fn formula(formula: Formula) -> Self {
        Expr(Repr::Formula(Rc::new(formula)))
    }

    /// Root of a context path, e.g. `github`.
    pub(crate) fn root(name: &str, shape: &'static Shape) -> Self {
        let segment = name.trim_start_matches('\u{0}').to_string();
        Self::formula(Formula {
            text: name.to_string(),
            prec: Prec::Atom,
            refs: vec![vec![segment.clone()]],
            path: Some(vec![segment]),
            shape: Some(shape),
        })
    }

    /// Error sentinel with a fixed message.
    pub fn error(message: impl Into<String>) -> Self {
        Expr(Repr::Error(ErrorExpr::with(Message::Literal(message.into()))))
    }

    /// Error sentinel whose message is only computed when observed.
    pub fn lazy_error(message: impl FnOnce() -> String + 'static) -> Self {
        Expr(Repr::Error(ErrorExpr::with(Message::Lazy(Box::new(message)))))
    }

    /// Error sentinel reported right away, at the caller's location.
    #[track_caller]
    pub(crate) fn immediate_error(message: impl Into<String>) -> Self {
        let expr = Self::error(message);
        expr.observe(Site::At(Location::caller()));
        expr
    }

    /// A literal wrapped as an expression, e.g. `Expr::literal("main")`.
    pub fn literal(value: impl Into<Operand>) -> Self {
        let operand: Operand = value.into();
        match operand.into_formula() {
            Ok(formula) => Expr(Repr::Formula(formula)),
            Err(error) => Expr(Repr::Error(error)),
        }
    }

    /// A function call such as `contains(a, b)`.
    #[track_caller]
    pub fn function(name: &str, args: Vec<Operand>) -> Self {
        let mut parts = Vec::with_capacity(args.len());
        let mut refs = Vec::new();
        for arg in args {
            match arg.into_formula() {
                Ok(formula) => {
                    refs.extend(formula.refs.iter().cloned());
                    parts.push(formula.text.clone());
                }
                Err(error) => return Expr(Repr::Error(error)).observed(),
            }
        }
        Self::formula(Formula {
            text: format!("{name}({})", parts.join(", ")),
            prec: Prec::Atom,
            refs,
            path: None,
            shape: None,
        })
    }

    #[track_caller]
    fn observed(self) -> Self {
        self.observe(Site::At(Location::caller()));
        self
    }

    fn observe(&self, site: Site) {
        if let Repr::Error(error) = &self.0 {
            error.observe(site);
        }
    }

    /// Whether this is an error sentinel
    pub fn is_error(&self) -> bool {
        matches!(self.0, Repr::Error(_))
    }

    /// Report a pending error sentinel at the caller.
    #[track_caller]
    pub(crate) fn check(&self) -> bool {
        self.observe(Site::At(Location::caller()));
        !self.is_error()
    }

    /// Report a pending error sentinel against the current builder call.
    pub(crate) fn settle(&self) -> bool {
        self.observe(Site::Current);
        !self.is_error()
    }

    /// The formula without delimiters (empty for error sentinels).
    pub fn text(&self) -> String {
        match &self.0 {
            Repr::Formula(formula) => formula.text.replace(NEEDS_MARKER, "needs"),
            Repr::Error(_) => String::new(),
        }
    }

    /// Context paths referenced by this expression.
    pub fn refs(&self) -> &[Vec<String>] {
        match &self.0 {
            Repr::Formula(formula) => &formula.refs,
            Repr::Error(_) => &[],
        }
    }

    /// The context path when this expression is a bare path like `steps.x.outcome`.
    pub fn path(&self) -> Option<&[String]> {
        match &self.0 {
            Repr::Formula(formula) => formula.path.as_deref(),
            Repr::Error(_) => None,
        }
    }

    /// Rewrite job handle references (`needs.<id>`) into `jobs.<id>`.
    pub(crate) fn needs_to_jobs(&self) -> Expr {
        let Repr::Formula(formula) = &self.0 else {
            return self.clone();
        };
        if !formula.text.contains(NEEDS_MARKER) {
            return self.clone();
        }
        let swap = |path: &Vec<String>| {
            let mut path = path.clone();
            if path.first().map(String::as_str) == Some("needs") {
                path[0] = "jobs".to_string();
            }
            path
        };
        Self::formula(Formula {
            text: formula.text.replace(NEEDS_MARKER, "jobs"),
            prec: formula.prec,
            refs: formula.refs.iter().map(swap).collect(),
            path: formula.path.as_ref().map(swap),
            shape: formula.shape,
        })
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Attribute access, `a.name`.
    ///
    /// Against a closed context schema, unknown names produce an error
    /// reported immediately. Underscores also match dashed schema names, so
    /// `field("fail_fast")` on `strategy` renders `strategy.fail-fast`.
    #[track_caller]
    pub fn field(&self, name: &str) -> Expr {
        let formula = match &self.0 {
            Repr::Formula(formula) => formula,
            Repr::Error(_) => return self.clone().observed(),
        };
        let (segment, shape) = match formula.shape {
            None => (name.to_string(), None),
            Some(shape) => match shape.child(name) {
                Some((segment, child)) => (segment, Some(child)),
                None => {
                    let here = formula
                        .path
                        .as_ref()
                        .map(|path| path.join("."))
                        .unwrap_or_else(|| formula.text.clone());
                    return Self::immediate_error(format!(
                        "`{name}` is not a valid field of `{here}`{}",
                        shape.describe_fields()
                    ));
                }
            },
        };
        self.extend(formula, segment, shape)
    }

    /// Wildcard access, `a.*`.
    #[track_caller]
    pub fn any(&self) -> Expr {
        match &self.0 {
            Repr::Formula(formula) => {
                let shape = formula.shape.and_then(Shape::element);
                self.extend(formula, "*".to_string(), shape)
            }
            Repr::Error(_) => self.clone().observed(),
        }
    }

    fn extend(&self, formula: &Formula, segment: String, shape: Option<&'static Shape>) -> Expr {
        let path = formula.path.as_ref().map(|path| {
            let mut path = path.clone();
            path.push(segment.clone());
            path
        });
        let refs = match &path {
            Some(path) => vec![path.clone()],
            None => formula.refs.clone(),
        };
        Self::formula(Formula {
            text: format!("{}.{}", wrap(formula, Prec::Field), segment),
            prec: Prec::Atom,
            refs,
            path,
            shape,
        })
    }

    /// Index access, `a[key]`.
    #[track_caller]
    pub fn index(&self, key: impl Into<Operand>) -> Expr {
        let formula = match &self.0 {
            Repr::Formula(formula) => formula,
            Repr::Error(_) => return self.clone().observed(),
        };
        let key: Operand = key.into();
        let segment = match &key {
            Operand::Str(text) => Some(text.clone()),
            Operand::Int(value) => Some(value.to_string()),
            _ => None,
        };
        let key = match key.into_formula() {
            Ok(key) => key,
            Err(error) => return Expr(Repr::Error(error)).observed(),
        };
        let path = match (&formula.path, segment) {
            (Some(path), Some(segment)) => {
                let mut path = path.clone();
                path.push(segment);
                Some(path)
            }
            _ => None,
        };
        let refs = match &path {
            Some(path) => vec![path.clone()],
            None => formula
                .refs
                .iter()
                .chain(key.refs.iter())
                .cloned()
                .collect(),
        };
        let shape = match path {
            Some(_) => formula.shape.and_then(Shape::element),
            None => None,
        };
        Self::formula(Formula {
            text: format!("{}[{}]", wrap(formula, Prec::Index), key.text),
            prec: Prec::Index,
            refs,
            path,
            shape,
        })
    }

    /// Call this expression with arguments, `a(x, y)`.
    #[track_caller]
    pub fn call(&self, args: Vec<Operand>) -> Expr {
        let formula = match &self.0 {
            Repr::Formula(formula) => formula,
            Repr::Error(_) => return self.clone().observed(),
        };
        Expr::function(&wrap(formula, Prec::Atom), args)
    }

    // ------------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------------

    #[track_caller]
    fn binary(&self, op: Prec, rhs: Operand) -> Expr {
        let lhs = match Operand::Expr(self.clone()).into_formula() {
            Ok(lhs) => lhs,
            Err(error) => return Expr(Repr::Error(error)).observed(),
        };
        let rhs = match rhs.into_formula() {
            Ok(rhs) => rhs,
            Err(error) => return Expr(Repr::Error(error)).observed(),
        };
        let right = if op.is_comparison() && rhs.prec.is_comparison() {
            format!("({})", rhs.text)
        } else {
            wrap(&rhs, op)
        };
        Self::formula(Formula {
            text: format!("{}{}{}", wrap(&lhs, op), op.symbol(), right),
            prec: op,
            refs: lhs.refs.iter().chain(rhs.refs.iter()).cloned().collect(),
            path: None,
            shape: None,
        })
    }

    #[track_caller]
    pub fn eq(&self, rhs: impl Into<Operand>) -> Expr {
        self.binary(Prec::Eq, rhs.into())
    }

    #[track_caller]
    pub fn ne(&self, rhs: impl Into<Operand>) -> Expr {
        self.binary(Prec::Ne, rhs.into())
    }

    #[track_caller]
    pub fn lt(&self, rhs: impl Into<Operand>) -> Expr {
        self.binary(Prec::Lt, rhs.into())
    }

    #[track_caller]
    pub fn le(&self, rhs: impl Into<Operand>) -> Expr {
        self.binary(Prec::Le, rhs.into())
    }

    #[track_caller]
    pub fn gt(&self, rhs: impl Into<Operand>) -> Expr {
        self.binary(Prec::Gt, rhs.into())
    }

    #[track_caller]
    pub fn ge(&self, rhs: impl Into<Operand>) -> Expr {
        self.binary(Prec::Ge, rhs.into())
    }

    #[track_caller]
    pub fn and(&self, rhs: impl Into<Operand>) -> Expr {
        self.binary(Prec::And, rhs.into())
    }

    #[track_caller]
    pub fn or(&self, rhs: impl Into<Operand>) -> Expr {
        self.binary(Prec::Or, rhs.into())
    }

    /// Logical negation, `!a`.
    #[track_caller]
    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> Expr {
        let operand = match &self.0 {
            Repr::Formula(formula) => formula,
            Repr::Error(_) => return self.clone().observed(),
        };
        Self::formula(Formula {
            text: format!("!{}", wrap(operand, Prec::Not)),
            prec: Prec::Not,
            refs: operand.refs.clone(),
            path: None,
            shape: None,
        })
    }
}

impl fmt::Display for Expr {
    /// Renders `${{ formula }}`; error sentinels render as `<error>` and are
    /// reported against the builder call that next receives the text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Formula(_) => write!(f, "${{{{ {} }}}}", self.text()),
            Repr::Error(error) => {
                error.observe(Site::Next);
                f.write_str("<error>")
            }
        }
    }
}

impl<R: Into<Operand>> BitAnd<R> for Expr {
    type Output = Expr;

    #[track_caller]
    fn bitand(self, rhs: R) -> Expr {
        self.and(rhs)
    }
}

impl<R: Into<Operand>> BitOr<R> for Expr {
    type Output = Expr;

    #[track_caller]
    fn bitor(self, rhs: R) -> Expr {
        self.or(rhs)
    }
}

impl Not for Expr {
    type Output = Expr;

    #[track_caller]
    fn not(self) -> Expr {
        Expr::not(&self)
    }
}
