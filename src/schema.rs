//! Schema descriptors for document records (v0.1)
//!
//! Every record of the generated document is described statically by a
//! [`Record`]: its fields in output order, their declared [`Ty`], and a few
//! serialization flags. The builder engine walks these descriptors to create
//! missing containers and to type-check every write.

use std::fmt;

/// Map an internal field name to its document key.
///
/// Trailing underscores are dropped (`if_` → `if`). Unless underscores are
/// preserved, `_` becomes `-` and a doubled `__` keeps a single underscore.
pub fn key(name: &str, preserve_underscores: bool) -> String {
    let name = name.trim_end_matches('_');
    if preserve_underscores {
        name.to_string()
    } else {
        name.replace('_', "-").replace("--", "_")
    }
}

/// Declared type of a field.
#[derive(Debug)]
pub enum Ty {
    /// Plain string, no interpolation
    Str,
    /// Expression or interpolated string
    Expr,
    Bool,
    Number,
    /// Any scalar or expression
    Value,
    /// One of a closed set of strings
    Choice(&'static [&'static str]),
    Union(&'static [Ty]),
    List(&'static Ty),
    /// String-keyed map
    Map(&'static Ty),
    Record(&'static Record),
    /// List of id-bearing records, serialized as a map keyed by id
    IdList(&'static Record),
}

impl Ty {
    /// Type used to instantiate a missing container (first union branch).
    pub fn instantiable(&'static self) -> &'static Ty {
        match self {
            Ty::Union(branches) => branches.first().map_or(self, Ty::instantiable),
            _ => self,
        }
    }

    /// Element type for list-like types.
    pub fn element(&'static self) -> Option<&'static Ty> {
        match self.instantiable() {
            Ty::List(element) | Ty::Map(element) => Some(*element),
            Ty::IdList(record) => Some(record.as_ty()),
            _ => None,
        }
    }

    /// Record type, if this type is (or starts with) a record.
    pub fn record(&'static self) -> Option<&'static Record> {
        match self.instantiable() {
            Ty::Record(record) => Some(*record),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Str => f.write_str("str"),
            Ty::Expr => f.write_str("Expr"),
            Ty::Bool => f.write_str("bool"),
            Ty::Number => f.write_str("int | float"),
            Ty::Value => f.write_str("Value"),
            Ty::Choice(options) => {
                let quoted: Vec<String> = options.iter().map(|o| format!("'{o}'")).collect();
                f.write_str(&quoted.join(" | "))
            }
            Ty::Union(branches) => {
                let names: Vec<String> = branches.iter().map(ToString::to_string).collect();
                f.write_str(&names.join(" | "))
            }
            Ty::List(element) => write!(f, "list[{element}]"),
            Ty::Map(element) => write!(f, "dict[str, {element}]"),
            Ty::Record(record) => f.write_str(record.name),
            Ty::IdList(record) => write!(f, "list[{}]", record.name),
        }
    }
}

/// Literal default value of a field.
#[derive(Debug, Clone, Copy)]
pub enum Lit {
    Bool(bool),
    Str(&'static str),
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub ty: Ty,
    pub default: Option<Lit>,
}

/// Static description of a record type.
#[derive(Debug)]
pub struct Record {
    pub name: &'static str,
    pub fields: &'static [Field],
    /// Keep underscores in keys (`on` triggers)
    pub preserve_underscores: bool,
    /// Construction-only fields, never serialized
    pub internal: &'static [&'static str],
    /// Fields rendered in flow style
    pub flow: &'static [&'static str],
    /// Expression fields emitted without `${{ }}`
    pub conditions: &'static [&'static str],
    /// Map field whose entries are hoisted into the record itself
    pub flatten: Option<&'static str>,
    /// Self-type, needed to hand out `&'static Ty` for id-list elements
    pub ty: &'static Ty,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<(usize, &'static Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| field.name == name)
    }

    pub fn key(&self, name: &str) -> String {
        key(name, self.preserve_underscores)
    }

    pub fn as_ty(&'static self) -> &'static Ty {
        self.ty
    }

    pub fn is_internal(&self, name: &str) -> bool {
        self.internal.iter().any(|field| *field == name)
    }
}

/// Base for record definitions, completed with struct update syntax.
pub const BASE: Record = Record {
    name: "",
    fields: &[],
    preserve_underscores: false,
    internal: &[],
    flow: &[],
    conditions: &[],
    flatten: None,
    ty: &Ty::Value,
};

/// Shorthand for a [`Field`] literal, optionally with a default.
#[macro_export]
#[doc(hidden)]
macro_rules! field {
    ($name:literal, $ty:expr) => {
        $crate::schema::Field {
            name: $name,
            ty: $ty,
            default: None,
        }
    };
    ($name:literal, $ty:expr, $default:expr) => {
        $crate::schema::Field {
            name: $name,
            ty: $ty,
            default: Some($default),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_dashes() {
        assert_eq!(key("runs_on", false), "runs-on");
        assert_eq!(key("continue_on_error", false), "continue-on-error");
    }

    #[test]
    fn test_key_trailing_underscore() {
        assert_eq!(key("if_", false), "if");
        assert_eq!(key("with_", false), "with");
    }

    #[test]
    fn test_key_double_underscore_escape() {
        assert_eq!(key("arg__2", false), "arg_2");
    }

    #[test]
    fn test_key_preserved() {
        assert_eq!(key("pull_request", true), "pull_request");
        assert_eq!(key("workflow_dispatch_", true), "workflow_dispatch");
    }

    #[test]
    fn test_type_display() {
        static CHOICE: Ty = Ty::Choice(&["read", "write"]);
        assert_eq!(CHOICE.to_string(), "'read' | 'write'");
        static LIST: Ty = Ty::List(&Ty::Str);
        assert_eq!(LIST.to_string(), "list[str]");
        static UNION: Ty = Ty::Union(&[Ty::Str, Ty::Bool]);
        assert_eq!(UNION.to_string(), "str | bool");
    }
}
