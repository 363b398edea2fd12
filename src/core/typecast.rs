//! RG-002: Type casting of raw parameter strings.
//!
//! Recovers a typed value from the untyped text stored for a parameter.
//! Classification is a heuristic, not a grammar: list and map bodies are
//! split on every `,` without tracking nesting depth, so a collection nested
//! inside a list or map element does not survive.

/// A value recovered from raw parameter text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Symbol(String),
    String(String),
    List(Vec<TypedValue>),
    /// Entries in first-insertion order.
    Map(Vec<(TypedValue, TypedValue)>),
}

impl TypedValue {
    /// Look up a map entry by key. `None` for non-maps.
    pub fn get(&self, key: &TypedValue) -> Option<&TypedValue> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Cast an optional raw value; absence is `Null`.
pub fn cast_opt(raw: Option<&str>) -> TypedValue {
    match raw {
        Some(s) => cast(s),
        None => TypedValue::Null,
    }
}

/// Cast a raw value.
pub fn cast(raw: &str) -> TypedValue {
    let val = raw.trim();
    match val {
        "true" => return TypedValue::Bool(true),
        "false" => return TypedValue::Bool(false),
        "nil" => return TypedValue::Null,
        _ => {}
    }

    if let Some(inner) = enclosed(val, '[', ']') {
        return TypedValue::List(split_items(inner, ",").into_iter().map(cast).collect());
    }

    if let Some(inner) = enclosed(val, '{', '}') {
        let mut entries: Vec<(TypedValue, TypedValue)> = Vec::new();
        for pair in split_items(inner, ",") {
            let parts = split_items(pair, "=>");
            let key = cast_opt(parts.first().copied());
            let value = cast_opt(parts.get(1).copied());
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
        return TypedValue::Map(entries);
    }

    cast_atom(val)
}

/// Whether a value is a multi-segment colon string such as
/// `:pserver:anonymous@cvs.example.org:/cvsroot`, which must stay a string.
pub fn is_connection_string(val: &str) -> bool {
    val.starts_with(':') && val.matches(':').count() > 1
}

fn cast_atom(val: &str) -> TypedValue {
    if is_connection_string(val) {
        return TypedValue::String(val.to_string());
    }
    if let Some(name) = val.strip_prefix(':') {
        return TypedValue::Symbol(name.to_string());
    }
    if let Some(inner) = enclosed(val, '\'', '\'').or_else(|| enclosed(val, '"', '"')) {
        return TypedValue::String(inner.to_string());
    }
    TypedValue::String(val.to_string())
}

/// Inner text when `val` starts with `open` and ends with `close`.
fn enclosed(val: &str, open: char, close: char) -> Option<&str> {
    if val.len() < 2 {
        return None;
    }
    val.strip_prefix(open)?.strip_suffix(close)
}

/// Split on `sep`, dropping trailing empty segments the way a plain
/// string split does (`"a,b,"` has two items, `""` has none).
fn split_items<'a>(inner: &'a str, sep: &str) -> Vec<&'a str> {
    let mut items: Vec<&str> = inner.split(sep).collect();
    while items.last().is_some_and(|s| s.is_empty()) {
        items.pop();
    }
    items
}
