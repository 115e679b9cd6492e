//! Generic document objects and their YAML layout
//!
//! [`Generic`] is the serializer-facing form of a built workflow: nested maps,
//! lists and scalars, plus the layout hints (flow style, block text, comments)
//! the YAML writer needs. It also implements [`serde::Serialize`] so the same
//! tree can be written as JSON.
//!
//! Scalar quoting is delegated to `serde_yaml`; the surrounding layout follows
//! the usual GitHub workflow style: two-space indentation, sequences aligned
//! with their parent key, `{}` for empty maps.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt::Write as _;

/// Keys that can be written without quotes
static PLAIN_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex"));

/// Serializer-facing document node.
#[derive(Debug, Clone, PartialEq)]
pub enum Generic {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Multi-line text, written as a block literal
    Text(String),
    List {
        items: Vec<Generic>,
        flow: bool,
    },
    Map {
        entries: Vec<(String, Generic)>,
        flow: bool,
        /// Comment line written before the map when it is a list item
        comment: Option<String>,
    },
}

impl Generic {
    pub fn list(items: Vec<Generic>) -> Self {
        Generic::List { items, flow: false }
    }

    pub fn map(entries: Vec<(String, Generic)>) -> Self {
        Generic::Map {
            entries,
            flow: false,
            comment: None,
        }
    }

    /// Same node, rendered inline.
    pub fn into_flow(self) -> Self {
        match self {
            Generic::List { items, .. } => Generic::List { items, flow: true },
            Generic::Map {
                entries, comment, ..
            } => Generic::Map {
                entries,
                flow: true,
                comment,
            },
            other => other,
        }
    }

    /// Look up a key of a map node.
    pub fn get(&self, key: &str) -> Option<&Generic> {
        match self {
            Generic::Map { entries, .. } => entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Follow a `/`-separated path of keys and list indexes.
    pub fn pointer(&self, path: &str) -> Option<&Generic> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| match node {
                Generic::List { items, .. } => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => node.get(segment),
            })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Generic::Str(text) | Generic::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn keys(&self) -> Vec<&str> {
        match self {
            Generic::Map { entries, .. } => entries.iter().map(|(key, _)| key.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Render as a YAML document.
    pub fn to_yaml(&self) -> String {
        let mut out = String::new();
        match self {
            Generic::Map {
                entries,
                flow: false,
                ..
            } if !entries.is_empty() => write_entries(&mut out, entries, 0),
            other => {
                out.push_str(&inline(other, false));
                out.push('\n');
            }
        }
        out
    }
}

// ============================================================================
// YAML WRITER
// ============================================================================

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

fn write_entries(out: &mut String, entries: &[(String, Generic)], indent: usize) {
    for (key, value) in entries {
        pad(out, indent);
        out.push_str(&scalar_key(key));
        out.push(':');
        write_value(out, value, indent);
    }
}

/// Write the part of an entry following `key:`.
fn write_value(out: &mut String, value: &Generic, indent: usize) {
    match value {
        Generic::Text(text) => write_text(out, text, indent + 2),
        Generic::Map {
            entries,
            flow: false,
            ..
        } if !entries.is_empty() => {
            out.push('\n');
            write_entries(out, entries, indent + 2);
        }
        Generic::List { items, flow: false } if !items.is_empty() => {
            out.push('\n');
            write_items(out, items, indent);
        }
        other => {
            out.push(' ');
            out.push_str(&inline(other, false));
            out.push('\n');
        }
    }
}

fn write_items(out: &mut String, items: &[Generic], indent: usize) {
    for item in items {
        match item {
            Generic::Map {
                entries,
                flow: false,
                comment,
            } if !entries.is_empty() => {
                if let Some(comment) = comment {
                    pad(out, indent);
                    let _ = writeln!(out, "# {comment}");
                }
                let mut nested = String::new();
                write_entries(&mut nested, entries, indent + 2);
                pad(out, indent);
                out.push_str("- ");
                out.push_str(&nested[indent + 2..]);
            }
            Generic::List { items, flow: false } if !items.is_empty() => {
                pad(out, indent);
                out.push_str("-\n");
                write_items(out, items, indent + 2);
            }
            Generic::Text(text) => {
                pad(out, indent);
                out.push('-');
                write_text(out, text, indent + 2);
            }
            other => {
                pad(out, indent);
                out.push_str("- ");
                out.push_str(&inline(other, false));
                out.push('\n');
            }
        }
    }
}

/// Block literal, content indented at `indent`.
fn write_text(out: &mut String, text: &str, indent: usize) {
    let chomp = if !text.ends_with('\n') {
        "-"
    } else if text.ends_with("\n\n") {
        "+"
    } else {
        ""
    };
    let marker = if text.starts_with(' ') { "2" } else { "" };
    let _ = writeln!(out, " |{marker}{chomp}");
    let body = text.strip_suffix('\n').unwrap_or(text);
    for line in body.split('\n') {
        if !line.is_empty() {
            pad(out, indent);
            out.push_str(line);
        }
        out.push('\n');
    }
}

fn inline(value: &Generic, in_flow: bool) -> String {
    match value {
        Generic::Bool(value) => value.to_string(),
        Generic::Int(value) => value.to_string(),
        Generic::Float(value) => float(*value),
        Generic::Str(text) => scalar(text, in_flow),
        Generic::Text(text) => double_quoted(text),
        Generic::List { items, .. } => {
            let items: Vec<String> = items.iter().map(|item| inline(item, true)).collect();
            format!("[{}]", items.join(", "))
        }
        Generic::Map { entries, .. } => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(key, value)| format!("{}: {}", scalar_key(key), inline(value, true)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn float(value: f64) -> String {
    let text = value.to_string();
    if text.contains(['.', 'e', 'E']) || !value.is_finite() {
        text
    } else {
        format!("{text}.0")
    }
}

fn double_quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text.escape_default()))
}

fn single_quoted(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn scalar_key(key: &str) -> String {
    if PLAIN_KEY.is_match(key) && !matches!(key, "true" | "false" | "null") {
        key.to_string()
    } else {
        scalar(key, true)
    }
}

/// Quote a string scalar the way `serde_yaml` would, tightened for flow context.
fn scalar(text: &str, in_flow: bool) -> String {
    if text.contains('\n') {
        return double_quoted(text);
    }
    let rendered = match serde_yaml::to_string(text) {
        Ok(rendered) => rendered,
        Err(_) => return single_quoted(text),
    };
    let rendered = rendered.trim_end_matches('\n');
    if rendered.contains('\n') {
        // folded by the emitter
        return single_quoted(text);
    }
    let plain = !rendered.starts_with(['\'', '"']);
    if plain && in_flow && text.contains([',', '[', ']', '{', '}']) {
        return single_quoted(text);
    }
    rendered.to_string()
}

// ============================================================================
// SERDE
// ============================================================================

impl Serialize for Generic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Generic::Bool(value) => serializer.serialize_bool(*value),
            Generic::Int(value) => serializer.serialize_i64(*value),
            Generic::Float(value) => serializer.serialize_f64(*value),
            Generic::Str(text) | Generic::Text(text) => serializer.serialize_str(text),
            Generic::List { items, .. } => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Generic::Map { entries, .. } => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}
