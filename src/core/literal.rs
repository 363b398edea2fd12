//! RG-003: Literal serialization of parameters into `set` statements.
//!
//! Decides whether a parameter value is embedded verbatim (booleans, nil,
//! symbols, numbers, `%w{}` arrays, list/hash literals) or quoted as a string,
//! and renders typed values back into the same literal syntax.
//!
//! String literals are wrapped in single quotes without escaping. A value
//! containing `'` therefore produces a statement the runner cannot parse.

use super::typecast::TypedValue;
use super::types::ConfigurationParameter;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// An ASCII digit run followed by anything else: numeric-looking but not a number.
static NUMERIC_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[0-9]+[^0-9]+").unwrap());

/// How a value is embedded in a `set` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    /// Embedded as written.
    Verbatim,
    /// Wrapped in single quotes.
    Quoted,
}

/// Classify a trimmed, non-empty value.
pub fn classify(val: &str) -> LiteralKind {
    if NUMERIC_PREFIX.is_match(val) {
        return LiteralKind::Quoted;
    }
    if matches!(val, "true" | "false" | "nil") {
        return LiteralKind::Verbatim;
    }
    match val.chars().next() {
        Some(':' | '%' | '[' | '{') => LiteralKind::Verbatim,
        Some(c) if c.is_ascii_digit() => LiteralKind::Verbatim,
        _ => LiteralKind::Quoted,
    }
}

/// The value a parameter contributes for this deployment, before trimming.
pub fn effective_value<'a>(
    parameter: &'a ConfigurationParameter,
    prompts: &'a HashMap<String, String>,
) -> Option<&'a str> {
    if parameter.prompt {
        prompts.get(&parameter.name).map(String::as_str)
    } else {
        Some(parameter.value.as_str())
    }
}

/// Render a parameter as a `set` line. `None` means the parameter
/// contributes no line (unanswered prompt or blank value).
pub fn render_parameter(
    parameter: &ConfigurationParameter,
    prompts: &HashMap<String, String>,
) -> Option<String> {
    let val = effective_value(parameter, prompts)?.trim();
    if val.is_empty() {
        return None;
    }
    Some(set_statement(&parameter.name, val, classify(val)))
}

/// Build a `set :<name>, <literal>` statement.
pub fn set_statement(name: &str, val: &str, kind: LiteralKind) -> String {
    match kind {
        LiteralKind::Verbatim => format!("set :{}, {}", name, val),
        LiteralKind::Quoted => format!("set :{}, '{}'", name, val),
    }
}

/// Render a typed value as literal syntax that casts back to the same value.
pub fn to_literal(value: &TypedValue) -> String {
    match value {
        TypedValue::Null => "nil".to_string(),
        TypedValue::Bool(b) => b.to_string(),
        TypedValue::Symbol(s) => format!(":{}", s),
        TypedValue::String(s) => format!("'{}'", s),
        TypedValue::List(items) => {
            let inner: Vec<String> = items.iter().map(to_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        TypedValue::Map(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{} => {}", to_literal(k), to_literal(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}
