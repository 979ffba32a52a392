//! Defines the [`Document`] type and the front matter scanner. Front matter
//! is a block of `key: value` lines at the top of a post, fenced by `---`
//! lines:
//!
//! ```md
//! ---
//! title: Hello, world!
//! date: 2025-06-25
//! tags: rust, blog
//! draft: false
//! ---
//! # Hello
//! ```
//!
//! Only scalars and a flat `tags` list are understood; this is not YAML. The
//! scanner never fails: anything it can't make sense of is skipped, and a
//! document whose block is never closed is treated as having no front matter
//! at all.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A single decoded front matter value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
}

impl Value {
    /// Returns the string contents for [`Value::String`] values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value would be dropped by a `value || fallback`
    /// expression: empty strings, `false`, zero, and empty lists.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Number(n) => *n == 0.0 || n.is_nan(),
            Value::Bool(b) => !b,
            Value::List(items) => items.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    /// Displays a [`Value`] the way it was most likely written: integral
    /// numbers without a fractional part, lists joined with `, `.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// Front matter fields keyed by name. A key that appears twice keeps its last
/// value.
pub type Metadata = BTreeMap<String, Value>;

/// A markdown source split into its front matter and its body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub metadata: Metadata,
    pub body: String,
}

impl Document {
    /// Splits `input` into [`Metadata`] and body. See the module docs.
    pub fn parse(input: &str) -> Document {
        match split(input) {
            Some((block, body)) => Document {
                metadata: parse_block(&block),
                body: body.trim().to_owned(),
            },
            None => Document {
                metadata: Metadata::new(),
                body: input.to_owned(),
            },
        }
    }

    /// Looks up `key` and renders it as text, skipping blank values.
    pub fn text(&self, key: &str) -> Option<String> {
        self.metadata
            .get(key)
            .filter(|v| !v.is_blank())
            .map(|v| v.to_string())
    }
}

/// Shorthand for [`Document::parse`].
pub fn parse(input: &str) -> Document {
    Document::parse(input)
}

const FENCE: &str = "---";

fn is_fence(line: &str) -> bool {
    line.strip_prefix(FENCE)
        .map_or(false, |rest| rest.chars().all(char::is_whitespace))
}

/// Returns the lines between the fences and the text after the closing
/// fence, or `None` when there is no complete block.
fn split(input: &str) -> Option<(Vec<&str>, String)> {
    let mut lines = input.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
    if !is_fence(lines.next()?) {
        return None;
    }

    let mut block = Vec::new();
    while let Some(line) = lines.next() {
        if is_fence(line) {
            let body = lines.by_ref().collect::<Vec<_>>().join("\n");
            return Some((block, body));
        }
        block.push(line);
    }
    None
}

fn parse_block(lines: &[&str]) -> Metadata {
    let mut metadata = Metadata::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.find(':') {
            Some(colon) if colon > 0 => {
                let key = line[..colon].trim();
                let value = line[colon + 1..].trim();
                metadata.insert(key.to_owned(), decode(key, value));
            }
            _ => continue,
        }
    }
    metadata
}

/// Applies the coercion rules in order: unquote, `tags` list, boolean,
/// number, string.
fn decode(key: &str, raw: &str) -> Value {
    let value = unquote(raw);
    if key == "tags" {
        return Value::List(split_tags(value));
    }
    match value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match parse_number(value) {
            Some(n) => Value::Number(n),
            None => Value::String(value.to_owned()),
        },
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Splits a tag list on runs of commas and whitespace. A flow-style list
/// (`[a, b]`) loses its brackets first.
pub fn split_tags(value: &str) -> Vec<String> {
    let value = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parses `value` as a number if the whole string is numeric: decimals with
/// an optional sign, fraction, and exponent, or `0x`/`0o`/`0b` integers.
fn parse_number(value: &str) -> Option<f64> {
    if value.is_empty() {
        return None;
    }

    let lower = value.to_ascii_lowercase();
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).ok().map(|n| n as f64);
        }
    }

    // `f64::from_str` also accepts `inf` and `nan`, which aren't numbers here.
    if value
        .chars()
        .any(|c| c.is_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    value.parse::<f64>().ok()
}
