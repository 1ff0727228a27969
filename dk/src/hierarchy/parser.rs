//! HierarchyParser - model response text to TaskTree
//!
//! Model output is prose with a JSON object somewhere inside it. The object
//! is located by brace-depth counting (string-literal aware), parsed, and
//! then validated against the recursive hierarchy shape:
//!
//! ```text
//! hierarchy := { label: children, ... }
//! children  := [ "leaf label", ... ] | hierarchy
//! ```
//!
//! This is the only place raw JSON from the model is handled; everything
//! downstream works with [`TaskTree`].

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::ParseError;
use crate::domain::{NodeId, TaskTree, TreeError};

/// Deepest `{`/`[` nesting the JSON reader accepts (serde_json's recursion limit)
pub const MAX_NESTING: usize = 127;

/// Parse a raw model response into a task tree
pub fn parse(raw: &str) -> Result<TaskTree, ParseError> {
    debug!(raw_len = raw.len(), "parse: called");
    let object = locate_json_object(raw)?;

    let mut tree = TaskTree::new();
    let mut path = Vec::new();
    build_level(&mut tree, None, &object, &mut path)?;

    debug!(nodes = tree.len(), roots = tree.roots().len(), "parse: built tree");
    Ok(tree)
}

/// Find the first balanced `{...}` span in `text` that parses as a JSON object
///
/// Spans that balance but are not JSON (braces in prose) are skipped whole,
/// so an object nested inside a broken outer object is never mistaken for
/// the hierarchy. A span that only fails because of trailing commas is
/// repaired and accepted.
pub fn locate_json_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    if !text.contains('{') {
        debug!("locate_json_object: no opening brace");
        return Err(ParseError::ExtractionFormat {
            reason: "response contains no '{'".to_string(),
        });
    }

    let mut cursor = 0;
    let mut saw_balanced = false;
    let mut last_error: Option<String> = None;

    while let Some(offset) = text[cursor..].find('{') {
        let start = cursor + offset;
        let Some(end) = balanced_end(text, start) else {
            debug!(start, "locate_json_object: unbalanced candidate, trying next brace");
            cursor = start + 1;
            continue;
        };
        saw_balanced = true;

        let candidate = &text[start..end];
        match parse_object(candidate) {
            Ok(map) => {
                debug!(start, end, "locate_json_object: found object");
                return Ok(map);
            }
            Err(e) => {
                let nesting = nesting_depth(candidate);
                if nesting > MAX_NESTING {
                    warn!(start, end, nesting, "locate_json_object: candidate nested too deeply");
                    return Err(ParseError::Schema {
                        path: Vec::new(),
                        message: format!(
                            "hierarchy is nested {} levels deep, at most {} are supported",
                            nesting, MAX_NESTING
                        ),
                    });
                }
                debug!(start, end, error = %e, "locate_json_object: candidate is not valid JSON");
                last_error = Some(e);
                cursor = end;
            }
        }
    }

    let reason = match (saw_balanced, last_error) {
        (false, _) => "no balanced '{...}' object in response".to_string(),
        (true, Some(e)) => format!("no balanced object is valid JSON (last error: {})", e),
        (true, None) => "no balanced object is valid JSON".to_string(),
    };
    Err(ParseError::ExtractionFormat { reason })
}

/// Byte index just past the `}` matching the `{` at `start`
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Deepest combined object and array nesting, ignoring string contents
fn nesting_depth(json: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => {
                depth += 1;
                max = max.max(depth);
            }
            '}' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

fn parse_object(candidate: &str) -> Result<Map<String, Value>, String> {
    let first_error = match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(_) => return Err("not a JSON object".to_string()),
        Err(e) => e.to_string(),
    };

    let repaired = strip_trailing_commas(candidate);
    if repaired == candidate {
        return Err(first_error);
    }
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => {
            warn!("Model response contained trailing commas; repaired before parsing");
            Ok(map)
        }
        _ => Err(first_error),
    }
}

/// Remove commas that directly precede `}` or `]`, ignoring string contents
fn strip_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().copied().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}

fn build_level(
    tree: &mut TaskTree,
    parent: Option<NodeId>,
    level: &Map<String, Value>,
    path: &mut Vec<String>,
) -> Result<(), ParseError> {
    for (key, value) in level {
        path.push(key.trim().to_string());
        let id = add_node(tree, parent, key, path)?;

        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let Value::String(label) = item else {
                        return Err(schema_error(
                            path,
                            format!("item {} is {}, expected a task label string", index, kind(item)),
                        ));
                    };
                    if label.trim().is_empty() {
                        return Err(schema_error(path, format!("item {} is an empty task label", index)));
                    }
                    add_node(tree, Some(id), label, path)?;
                }
            }
            Value::Object(children) => build_level(tree, Some(id), children, path)?,
            other => {
                return Err(schema_error(
                    path,
                    format!(
                        "expected a list of sub-task labels or an object of sub-tasks, found {}",
                        kind(other)
                    ),
                ));
            }
        }
        path.pop();
    }
    Ok(())
}

fn add_node(tree: &mut TaskTree, parent: Option<NodeId>, label: &str, path: &[String]) -> Result<NodeId, ParseError> {
    let added = match parent {
        Some(parent) => tree.add_child(parent, label),
        None => tree.add_root(label),
    };
    added.map_err(|e| match e {
        TreeError::EmptyLabel => schema_error(path, "task label is empty".to_string()),
        TreeError::UnknownNode(id) => schema_error(path, format!("internal: unknown parent {}", id)),
    })
}

fn schema_error(path: &[String], message: String) -> ParseError {
    ParseError::Schema {
        path: path.to_vec(),
        message,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
