//! `${...}` reference resolution inside declaration files.
//!
//! Three roots are available:
//! - `vars`: external variables supplied by the caller
//! - `this`: the file being read, itself resolved on demand
//! - `previous`: the plain form of the previous publication in an ordered
//!   collection
//!
//! A string consisting of exactly one reference takes the referenced value
//! as-is (a number stays a number). Otherwise each reference is rendered as
//! text and spliced in.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}").expect("reference regex")
});

/// A reference could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpolationError {
    #[error("unknown reference `${{{0}}}`")]
    Unknown(String),

    #[error("reference `${{{0}}}` refers to itself")]
    Cycle(String),

    #[error("reference `${{{0}}}` used, but there is no previous publication")]
    NoPrevious(String),
}

/// Resolves every reference in one document.
pub(crate) struct Resolver<'a> {
    root: &'a Value,
    vars: &'a Map<String, Value>,
    previous: Option<&'a Value>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        root: &'a Value,
        vars: &'a Map<String, Value>,
        previous: Option<&'a Value>,
    ) -> Self {
        Self {
            root,
            vars,
            previous,
        }
    }

    /// The whole document with all references replaced.
    pub(crate) fn resolve(&self) -> Result<Value, InterpolationError> {
        self.resolve_value(self.root, &mut Vec::new())
    }

    fn resolve_value(
        &self,
        value: &Value,
        stack: &mut Vec<String>,
    ) -> Result<Value, InterpolationError> {
        match value {
            Value::String(s) => self.resolve_str(s, stack),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item, stack))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.resolve_value(v, stack)?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn resolve_str(&self, s: &str, stack: &mut Vec<String>) -> Result<Value, InterpolationError> {
        if let Some(caps) = REFERENCE_RE.captures(s) {
            if caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len()) {
                return self.lookup(&caps[1], stack);
            }
        } else {
            return Ok(Value::String(s.to_string()));
        }

        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for caps in REFERENCE_RE.captures_iter(s) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&s[last..whole.start()]);
            out.push_str(&render(&self.lookup(&caps[1], stack)?));
            last = whole.end();
        }
        out.push_str(&s[last..]);
        Ok(Value::String(out))
    }

    fn lookup(
        &self,
        reference: &str,
        stack: &mut Vec<String>,
    ) -> Result<Value, InterpolationError> {
        let unknown = || InterpolationError::Unknown(reference.to_string());
        let (root, rest) = reference.split_once('.').unwrap_or((reference, ""));
        let segments: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('.').collect()
        };

        match root {
            "vars" => {
                let vars = Value::Object(self.vars.clone());
                find(&vars, &segments).cloned().ok_or_else(unknown)
            }
            "previous" => {
                let previous = self
                    .previous
                    .ok_or_else(|| InterpolationError::NoPrevious(reference.to_string()))?;
                find(previous, &segments).cloned().ok_or_else(unknown)
            }
            "this" => {
                if stack.iter().any(|r| r == reference) {
                    return Err(InterpolationError::Cycle(reference.to_string()));
                }
                let raw = find(self.root, &segments).ok_or_else(unknown)?;
                stack.push(reference.to_string());
                let resolved = self.resolve_value(raw, stack);
                stack.pop();
                resolved
            }
            _ => Err(unknown()),
        }
    }
}

/// Walk `segments` down from `value`.
///
/// Keys may themselves contain dots (`lecture.ipynb`), so at each level the
/// longest run of segments naming an existing key wins.
fn find<'v>(value: &'v Value, segments: &[&str]) -> Option<&'v Value> {
    if segments.is_empty() {
        return Some(value);
    }
    match value {
        Value::Object(map) => (1..=segments.len()).rev().find_map(|n| {
            map.get(&segments[..n].join("."))
                .and_then(|child| find(child, &segments[n..]))
        }),
        Value::Array(items) => {
            let index: usize = segments[0].parse().ok()?;
            find(items.get(index)?, &segments[1..])
        }
        _ => None,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
