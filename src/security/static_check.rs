//! Static scan of Global Phase code for credential references.
//!
//! Runs before any process exists: a literal mention of a credential-class
//! variable name anywhere in the code text fails the whole request with a
//! security violation. The runtime guard installed in the generated script
//! covers dynamically constructed lookups; this check covers the literal
//! ones with certainty.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::ExecError;

/// Reject `code` if it mentions any identifier carrying the credential
/// prefix. `known_names` lists the credential variables actually present in
/// the environment; they are reported by name when matched, and any other
/// prefixed token is caught by shape.
pub fn scan_global_code(code: &str, prefix: &str, known_names: &[String]) -> Result<(), ExecError> {
    let mut found: BTreeSet<String> = BTreeSet::new();

    for name in known_names {
        if code.contains(name.as_str()) {
            found.insert(name.clone());
        }
    }

    let pattern = format!(r"{}[A-Za-z0-9_]*", regex::escape(prefix));
    let re = Regex::new(&pattern)
        .map_err(|e| ExecError::Validation(format!("invalid credential prefix: {}", e)))?;
    for m in re.find_iter(code) {
        found.insert(m.as_str().to_string());
    }

    if found.is_empty() {
        return Ok(());
    }

    let tokens: Vec<String> = found.into_iter().collect();
    Err(ExecError::SecurityViolation(format!(
        "global code references credential-class variables: {}",
        tokens.join(", ")
    )))
}
