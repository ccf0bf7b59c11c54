//! Field-name aliasing and the micro expression language used to build
//! portal form values from business payloads.
//!
//! A payload carries its `data` plus an optional `maps` tree. Looking up a
//! dotted path walks `maps` to find the real data key; when that key is not
//! present in `data` but contains a colon it is evaluated as an expression:
//!
//! - `CONCAT:sep|ref1|ref2|...` joins the resolved references with `sep`
//! - `FORMAT:template|ref1|ref2|...` replaces `%1%`, `%2%`, ... in `template`
//!
//! References are resolved through the same lookup, left to right, and fall
//! back to the literal token when nothing resolves.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nested expressions deeper than this resolve to nothing
const MAX_DEPTH: usize = 8;

/// Immutable job payload with its optional field map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub data: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maps: Option<Value>,
}

impl Payload {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data, maps: None }
    }

    pub fn with_maps(mut self, maps: Value) -> Self {
        self.maps = Some(maps);
        self
    }

    /// Direct read of a data key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Resolve `path` through the field map and read the mapped data key
    pub fn get_mapped_data(&self, path: &str) -> Option<Value> {
        self.lookup(path, 0)
    }

    /// Same as [`Payload::get_mapped_data`], rendered as a string
    pub fn get_mapped_string(&self, path: &str) -> Option<String> {
        self.get_mapped_data(path).map(|value| render(&value))
    }

    /// Data key a dotted path maps to; the path itself when unmapped
    pub fn resolve_key(&self, path: &str) -> String {
        let mapped = self.maps.as_ref().and_then(|maps| {
            path.split('.')
                .try_fold(maps, |node, segment| node.get(segment))
                .and_then(Value::as_str)
        });

        mapped.unwrap_or(path).to_string()
    }

    fn lookup(&self, path: &str, depth: usize) -> Option<Value> {
        let key = self.resolve_key(path);

        if let Some(value) = self.data.get(&key) {
            return Some(value.clone());
        }

        if depth < MAX_DEPTH && key.contains(':') {
            return self.evaluate(&key, depth + 1).map(Value::String);
        }

        None
    }

    fn evaluate(&self, expr: &str, depth: usize) -> Option<String> {
        let (op, body) = expr.split_once(':')?;
        let mut parts = body.split('|');
        let head = parts.next().unwrap_or_default();

        let values: Vec<String> = parts
            .map(|token| {
                self.lookup(token, depth)
                    .map(|value| render(&value))
                    .unwrap_or_else(|| token.to_string())
            })
            .collect();

        match op {
            "CONCAT" => Some(values.join(head)),
            "FORMAT" => Some(substitute(head, &values)),
            _ => None,
        }
    }
}

/// Render a payload value the way it is typed into a form field
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Single pass over `template` replacing `%N%` with `values[N - 1]`.
///
/// Substituted text is never rescanned. Placeholders without a matching value
/// are kept verbatim.
fn substitute(template: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];

        let placeholder = tail.find('%').and_then(|end| {
            let digits = &tail[..end];
            let index: usize = digits.parse().ok()?;
            let value = index.checked_sub(1).and_then(|i| values.get(i))?;
            Some((value, end))
        });

        match placeholder {
            Some((value, end)) => {
                out.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('%');
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    out
}
