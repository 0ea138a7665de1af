//! `${result.<path>}` template resolution.
//!
//! Before a data spec with `passed_variables` executes, each target field is
//! rewritten from the named dependency's result body. Unresolved paths are a
//! hard error naming the path; nothing is ever silently replaced with an
//! empty string. The rewrite works on a copy, never the original spec.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ExecError;
use crate::request::DataSpec;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{result((?:\.[A-Za-z0-9_]+|\[\d+\])*)\}").unwrap());

#[derive(Debug, PartialEq)]
enum PathSeg {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<PathSeg>, ExecError> {
    let mut segs = Vec::new();
    let mut rest = path.trim_start_matches('.');
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| {
                ExecError::Validation(format!("malformed path '{}': unclosed bracket", path))
            })?;
            let index: usize = after[..close].parse().map_err(|_| {
                ExecError::Validation(format!("malformed path '{}': bad index", path))
            })?;
            segs.push(PathSeg::Index(index));
            rest = after[close + 1..].trim_start_matches('.');
        } else {
            let end = rest
                .find(|c| c == '.' || c == '[')
                .unwrap_or(rest.len());
            if end == 0 {
                return Err(ExecError::Validation(format!(
                    "malformed path '{}'",
                    path
                )));
            }
            segs.push(PathSeg::Key(rest[..end].to_string()));
            rest = rest[end..].trim_start_matches('.');
        }
    }
    Ok(segs)
}

/// Look up a dot/bracket path inside a JSON value.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segs = parse_path(path).ok()?;
    let mut current = value;
    for seg in &segs {
        current = match seg {
            PathSeg::Key(k) => current.get(k.as_str())?,
            PathSeg::Index(i) => current.get(*i)?,
        };
    }
    Some(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render one passed-variable template against a dependency's result body.
///
/// A template that is exactly one marker substitutes the JSON value itself,
/// preserving its type; mixed text stringifies each match.
pub fn render_template(template: &str, body: &Value, source: &str) -> Result<Value, ExecError> {
    let unresolved = |path: &str| {
        ExecError::Validation(format!(
            "unresolved path 'result{}' in result of '{}'",
            path, source
        ))
    };

    if let Some(caps) = MARKER_RE.captures(template) {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        if whole == template {
            let path = &caps[1];
            let value = if path.is_empty() {
                Some(body)
            } else {
                lookup_path(body, path)
            };
            return match value {
                Some(v) if !v.is_null() => Ok(v.clone()),
                _ => Err(unresolved(path)),
            };
        }
    }

    let mut out = String::new();
    let mut last = 0;
    for caps in MARKER_RE.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let path = &caps[1];
        let value = if path.is_empty() {
            Some(body)
        } else {
            lookup_path(body, path)
        };
        let value = match value {
            Some(v) if !v.is_null() => v,
            _ => return Err(unresolved(path)),
        };
        out.push_str(&template[last..whole.start()]);
        out.push_str(&stringify(value));
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(Value::String(out))
}

fn set_path(root: &mut Value, path: &str, new_value: Value) -> Result<(), ExecError> {
    let segs = parse_path(path)?;
    if segs.is_empty() {
        return Err(ExecError::Validation("empty target path".into()));
    }

    let mut current = root;
    for (i, seg) in segs.iter().enumerate() {
        let is_last = i == segs.len() - 1;
        match seg {
            PathSeg::Key(k) => {
                if current.is_null() {
                    *current = Value::Object(serde_json::Map::new());
                }
                let Some(map) = current.as_object_mut() else {
                    return Err(ExecError::Validation(format!(
                        "target path '{}' traverses a non-object value",
                        path
                    )));
                };
                if is_last {
                    map.insert(k.clone(), new_value);
                    return Ok(());
                }
                current = map
                    .entry(k.clone())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
            }
            PathSeg::Index(idx) => {
                let arr = current.as_array_mut().ok_or_else(|| {
                    ExecError::Validation(format!(
                        "target path '{}' indexes a non-array value",
                        path
                    ))
                })?;
                if *idx >= arr.len() {
                    return Err(ExecError::Validation(format!(
                        "target path '{}' indexes past the end of an array",
                        path
                    )));
                }
                if is_last {
                    arr[*idx] = new_value;
                    return Ok(());
                }
                current = &mut arr[*idx];
            }
        }
    }
    Ok(())
}

/// Rewrite `spec`'s target fields from the resolved results of its
/// dependencies. Returns a new spec; the original is untouched.
pub fn interpolate_spec(
    name: &str,
    spec: &DataSpec,
    resolved: &HashMap<String, Value>,
) -> Result<DataSpec, ExecError> {
    let Some(passed) = &spec.passed_variables else {
        return Ok(spec.clone());
    };

    let mut value = serde_json::to_value(spec)
        .map_err(|e| ExecError::Validation(format!("spec '{}' is not serializable: {}", name, e)))?;

    for (target, pv) in passed {
        let body = resolved.get(&pv.passed_from).ok_or_else(|| {
            ExecError::Validation(format!(
                "variable '{}' needs the result of '{}', which is unavailable",
                name, pv.passed_from
            ))
        })?;
        let rendered = render_template(&pv.value, body, &pv.passed_from)?;
        set_path(&mut value, target, rendered)?;
    }

    serde_json::from_value(value).map_err(|e| {
        ExecError::Validation(format!(
            "interpolation produced an invalid spec for '{}': {}",
            name, e
        ))
    })
}
