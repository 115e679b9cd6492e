//! Document tree values (v0.1)
//!
//! The tree under construction is dynamic: every record is an [`Element`]
//! holding one optional slot per schema field, so the builder can walk it by
//! path, merge repeated writes, and type-check values against the schema.

use std::ptr;

use crate::expr::{AsExpr, Expr};
use crate::generic::Generic;
use crate::schema::{Lit, Record, Ty};

/// A value stored in the document tree.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Expr(Expr),
    List(Vec<Value>),
    /// Ordered string-keyed map
    Map(Vec<(String, Value)>),
    Element(Element),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Str(value.clone())
    }
}

impl From<Expr> for Value {
    fn from(value: Expr) -> Self {
        Value::Expr(value)
    }
}

impl<T: AsExpr + ?Sized> From<&T> for Value {
    fn from(value: &T) -> Self {
        Value::Expr(value.as_expr())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Whether a string carries a `${{ }}` interpolation.
pub fn is_interpolated(text: &str) -> bool {
    text.contains("${{")
}

impl Value {
    /// Build an ordered map from key/value pairs.
    pub fn map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Expr(_) => "Expr",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Element(element) => element.schema.name,
        }
    }

    /// Short literal-like rendering for error messages.
    pub fn repr(&self) -> String {
        match self {
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Str(text) => format!("'{text}'"),
            Value::Expr(expr) => expr.to_string(),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Map(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| format!("'{key}': {}", value.repr()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            Value::Element(element) => format!("{}(...)", element.schema.name),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Value::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Value::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Entry of a map value.
    pub fn entry(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Keys of a map value, in order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Value::Map(entries) => entries.iter().map(|(key, _)| key.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the value conforms to a declared type.
    ///
    /// Interpolated strings count as expressions, never as plain strings.
    pub fn conforms(&self, ty: &Ty) -> bool {
        match (ty, self) {
            (Ty::Str, Value::Str(text)) => !is_interpolated(text),
            (Ty::Expr, Value::Expr(_)) => true,
            (Ty::Expr, Value::Str(text)) => is_interpolated(text),
            (Ty::Bool, Value::Bool(_)) => true,
            (Ty::Number, Value::Int(_) | Value::Float(_)) => true,
            (Ty::Value, value) => !matches!(
                value,
                Value::List(_) | Value::Map(_) | Value::Element(_)
            ),
            (Ty::Choice(options), Value::Str(text)) => options.iter().any(|option| option == text),
            (Ty::Union(branches), value) => branches.iter().any(|branch| value.conforms(branch)),
            (Ty::List(element), Value::List(items)) => items.iter().all(|item| item.conforms(element)),
            (Ty::Map(element), Value::Map(entries)) => {
                entries.iter().all(|(_, value)| value.conforms(element))
            }
            (Ty::Record(record), Value::Element(element)) => ptr::eq(*record, element.schema),
            (Ty::IdList(record), Value::List(items)) => items.iter().all(|item| {
                item.as_element()
                    .is_some_and(|element| ptr::eq(*record, element.schema))
            }),
            _ => false,
        }
    }

    /// Generic form for serialization.
    pub fn to_generic(&self) -> Generic {
        match self {
            Value::Bool(value) => Generic::Bool(*value),
            Value::Int(value) => Generic::Int(*value),
            Value::Float(value) => Generic::Float(*value),
            Value::Str(text) => text_node(text),
            Value::Expr(expr) => text_node(&expr.to_string()),
            Value::List(items) => Generic::list(items.iter().map(Value::to_generic).collect()),
            Value::Map(entries) => Generic::map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_generic()))
                    .collect(),
            ),
            Value::Element(element) => element.to_generic(),
        }
    }
}

fn text_node(text: &str) -> Generic {
    if text.contains('\n') {
        let mut text = text.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Generic::Text(text)
    } else {
        Generic::Str(text.to_string())
    }
}

/// Merge a new value into an existing one.
///
/// Maps merge key-wise (existing keys keep their position), lists
/// concatenate, records of the same type merge field-wise, anything else is
/// replaced. At the top level an absent new value means "no change" and
/// yields `None`; inside a recursive merge it keeps the existing value.
pub fn merge(lhs: Option<&Value>, rhs: Option<Value>, recursed: bool) -> Option<Value> {
    let pair = match (lhs, rhs) {
        (None, rhs) => return rhs,
        (Some(lhs), None) => return recursed.then(|| lhs.clone()),
        (Some(lhs), Some(rhs)) => (lhs, rhs),
    };
    match pair {
        (Value::Map(old), Value::Map(new)) => {
            let mut merged = old.clone();
            for (key, value) in new {
                match merged.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, slot)) => {
                        if let Some(value) = merge(Some(&*slot), Some(value), true) {
                            *slot = value;
                        }
                    }
                    None => merged.push((key, value)),
                }
            }
            Some(Value::Map(merged))
        }
        (Value::List(old), Value::List(new)) => {
            let mut merged = old.clone();
            merged.extend(new);
            Some(Value::List(merged))
        }
        (Value::Element(old), Value::Element(new)) if ptr::eq(old.schema, new.schema) => {
            let slots = old
                .slots
                .iter()
                .zip(new.slots)
                .map(|(old, new)| merge(old.as_ref(), new, true))
                .collect();
            Some(Value::Element(Element {
                schema: old.schema,
                slots,
            }))
        }
        (_, new) => Some(new),
    }
}

// ============================================================================
// ELEMENT
// ============================================================================

/// A record instance: one optional slot per schema field.
#[derive(Debug, Clone)]
pub struct Element {
    schema: &'static Record,
    slots: Vec<Option<Value>>,
}

impl Element {
    /// Fresh record with only its declared defaults set.
    pub fn new(schema: &'static Record) -> Self {
        let slots = schema
            .fields
            .iter()
            .map(|field| {
                field.default.map(|default| match default {
                    Lit::Bool(value) => Value::Bool(value),
                    Lit::Str(text) => Value::Str(text.to_string()),
                })
            })
            .collect();
        Self { schema, slots }
    }

    pub fn schema(&self) -> &'static Record {
        self.schema
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let (index, _) = self.schema.field(name)?;
        self.slots[index].as_ref()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let (index, _) = self.schema.field(name)?;
        self.slots[index].as_mut()
    }

    /// The slot for a field, `None` if the schema has no such field.
    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Option<Value>> {
        let (index, _) = self.schema.field(name)?;
        Some(&mut self.slots[index])
    }

    /// Set a field without type checking.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        if let Some(slot) = self.slot_mut(name) {
            *slot = Some(value.into());
        }
    }

    /// Whether any field is set.
    pub fn has_any(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    /// Whether any field holds something other than its declared default.
    pub fn has_explicit(&self) -> bool {
        self.schema
            .fields
            .iter()
            .zip(&self.slots)
            .any(|(field, slot)| match (field.default, slot) {
                (_, None) => false,
                (Some(Lit::Bool(default)), Some(Value::Bool(value))) => *value != default,
                (Some(Lit::Str(default)), Some(Value::Str(value))) => value.as_str() != default,
                _ => true,
            })
    }

    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    /// Generic form, with internal fields dropped and id-lists keyed by id.
    pub fn to_generic(&self) -> Generic {
        self.to_generic_without(None)
    }

    fn to_generic_without(&self, skip: Option<&str>) -> Generic {
        let schema = self.schema;
        let mut hoisted = Vec::new();
        let mut entries = Vec::new();
        for (field, slot) in schema.fields.iter().zip(&self.slots) {
            let Some(value) = slot else { continue };
            if schema.is_internal(field.name) || skip == Some(field.name) {
                continue;
            }
            let mut node = match (&field.ty, value) {
                (_, Value::Expr(expr)) if schema.conditions.contains(&field.name) => {
                    Generic::Str(expr.text())
                }
                (Ty::IdList(_), Value::List(items)) => keyed_by_id(items),
                _ => value.to_generic(),
            };
            if schema.flow.contains(&field.name) {
                node = flowify(node);
            }
            if schema.flatten == Some(field.name) {
                if let Generic::Map { entries, .. } = node {
                    hoisted.extend(entries);
                }
                continue;
            }
            entries.push((schema.key(field.name), node));
        }
        hoisted.extend(entries);
        let comment = match self.get("needs") {
            Some(Value::List(needs)) if schema.is_internal("needs") && !needs.is_empty() => {
                let names: Vec<&str> = needs.iter().filter_map(Value::as_str).collect();
                Some(format!("needs {}", names.join(", ")))
            }
            _ => None,
        };
        Generic::Map {
            entries: hoisted,
            flow: false,
            comment,
        }
    }
}

fn keyed_by_id(items: &[Value]) -> Generic {
    let mut entries = Vec::new();
    for element in items.iter().filter_map(Value::as_element) {
        match element.id() {
            Some(id) => entries.push((id.to_string(), element.to_generic_without(Some("id")))),
            None => tracing::warn!(kind = element.schema.name, "dropping entry without an id"),
        }
    }
    Generic::map(entries)
}

/// Apply flow style to a node marked as flow: scalar lists inline, lists of
/// maps get inline rows, maps get inline values.
fn flowify(node: Generic) -> Generic {
    match node {
        Generic::List { items, .. }
            if items
                .iter()
                .any(|item| matches!(item, Generic::Map { .. } | Generic::List { .. })) =>
        {
            Generic::list(items.into_iter().map(Generic::into_flow).collect())
        }
        Generic::List { items, .. } => Generic::List { items, flow: true },
        Generic::Map {
            entries, comment, ..
        } => Generic::Map {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key, value.into_flow()))
                .collect(),
            flow: false,
            comment,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{INPUT, JOB, MATRIX, ON, PULL_REQUEST, STEP, WORKFLOW_DISPATCH};

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|item| Value::from(*item)).collect())
    }

    fn pull_request(branches: &[&str]) -> Value {
        let mut element = Element::new(&PULL_REQUEST);
        element.set("branches", list(branches));
        Value::Element(element)
    }

    #[test]
    fn test_merge_lists_concatenate() {
        let merged = merge(Some(&list(&["a"])), Some(list(&["a"])), false).unwrap();
        assert_eq!(merged.repr(), "['a', 'a']");
    }

    #[test]
    fn test_merge_scalar_overwrites() {
        let merged = merge(Some(&Value::from("old")), Some(Value::from("new")), false).unwrap();
        assert_eq!(merged.as_str(), Some("new"));
    }

    #[test]
    fn test_merge_top_level_none_is_no_change() {
        assert!(merge(Some(&Value::from("old")), None, false).is_none());
    }

    #[test]
    fn test_merge_nested_none_keeps_existing() {
        let old = Value::map([("a", Value::from(1)), ("b", Value::from(2))]);
        let mut new_element = Element::new(&PULL_REQUEST);
        new_element.set("paths", list(&["x"]));
        let merged = merge(Some(&pull_request(&["main"])), Some(Value::Element(new_element)), false)
            .unwrap();
        let merged = merged.as_element().unwrap();
        assert_eq!(merged.get("branches").unwrap().repr(), "['main']");
        assert_eq!(merged.get("paths").unwrap().repr(), "['x']");
        assert!(merged.get("types").is_none());
        let merged = merge(Some(&old), Some(Value::map([("c", 3)])), false).unwrap();
        assert_eq!(merged.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_absent_against_absent_stays_absent() {
        assert!(merge(None, None, true).is_none());
    }

    #[test]
    fn test_merge_records_recursively() {
        let merged = merge(Some(&pull_request(&["a"])), Some(pull_request(&["b"])), false).unwrap();
        let merged = merged.as_element().unwrap();
        assert_eq!(merged.get("branches").unwrap().repr(), "['a', 'b']");
    }

    #[test]
    fn test_merge_maps_keywise() {
        let old = Value::map([("x", list(&["1"])), ("y", Value::from("a"))]);
        let new = Value::map([("x", list(&["2"])), ("z", Value::from("b"))]);
        let merged = merge(Some(&old), Some(new), false).unwrap();
        assert_eq!(merged.repr(), "{'x': ['1', '2'], 'y': 'a', 'z': 'b'}");
    }

    #[test]
    fn test_conforms_str_and_expr() {
        assert!(Value::from("plain").conforms(&Ty::Str));
        assert!(!Value::from("${{ x }}").conforms(&Ty::Str));
        assert!(Value::from("${{ x }}").conforms(&Ty::Expr));
        assert!(!Value::from("plain").conforms(&Ty::Expr));
        assert!(Value::from(3).conforms(&Ty::Value));
    }

    #[test]
    fn test_conforms_choice_list() {
        let (_, types) = PULL_REQUEST.field("types").unwrap();
        assert!(list(&["opened", "closed"]).conforms(&types.ty));
        assert!(!list(&["opened", "bogus"]).conforms(&types.ty));
    }

    #[test]
    fn test_has_explicit_ignores_defaults() {
        let mut input = Element::new(&INPUT);
        assert!(input.has_any());
        assert!(!input.has_explicit());
        input.set("required", true);
        assert!(input.has_explicit());
    }

    #[test]
    fn test_conforms_union() {
        let (_, default) = INPUT.field("default").unwrap();
        assert!(Value::from(true).conforms(&default.ty));
        assert!(Value::from(1.5).conforms(&default.ty));
        assert!(!list(&["a"]).conforms(&default.ty));
    }

    #[test]
    fn test_element_defaults() {
        let input = Element::new(&INPUT);
        assert!(matches!(input.get("required"), Some(Value::Bool(false))));
        assert_eq!(input.get("type_").and_then(Value::as_str), Some("string"));
        assert!(input.get("description").is_none());
    }

    #[test]
    fn test_generic_drops_internal_fields_and_comments_needs() {
        let mut step = Element::new(&STEP);
        step.set("run", "make");
        step.set("outputs", list(&["x"]));
        step.set("needs", list(&["j1", "j2"]));
        let generic = step.to_generic();
        assert_eq!(generic.keys(), vec!["run"]);
        assert!(matches!(generic, Generic::Map { comment: Some(ref c), .. } if c == "needs j1, j2"));
    }

    #[test]
    fn test_generic_condition_without_delimiters() {
        let mut job = Element::new(&JOB);
        job.set("if_", crate::contexts::github().field("ref").eq("main"));
        let generic = job.to_generic();
        assert_eq!(generic.get("if").and_then(Generic::as_str), Some("github.ref == 'main'"));
    }

    #[test]
    fn test_generic_id_list_keyed() {
        let mut named = Element::new(&INPUT);
        named.set("id", "foo");
        named.set("description", "a foo");
        let unnamed = Element::new(&INPUT);
        let mut dispatch = Element::new(&WORKFLOW_DISPATCH);
        dispatch.set("inputs", Value::List(vec![Value::Element(named), Value::Element(unnamed)]));
        let yaml = dispatch.to_generic().to_yaml();
        assert_eq!(
            yaml,
            "inputs:\n  foo:\n    description: a foo\n    required: false\n    type: string\n"
        );
    }

    #[test]
    fn test_generic_matrix_layout() {
        let mut matrix = Element::new(&MATRIX);
        matrix.set("values", Value::map([("x", Value::from([1, 2, 3]))]));
        matrix.set(
            "include",
            Value::List(vec![Value::map([("x", Value::from(100)), ("y", Value::from("z"))])]),
        );
        let yaml = matrix.to_generic().to_yaml();
        assert_eq!(yaml, "x: [1, 2, 3]\ninclude:\n- {x: 100, y: z}\n");
    }

    #[test]
    fn test_on_keys_keep_underscores() {
        let mut on = Element::new(&ON);
        on.set("workflow_dispatch", Value::Element(Element::new(&WORKFLOW_DISPATCH)));
        assert_eq!(on.to_generic().to_yaml(), "workflow_dispatch: {}\n");
    }
}
