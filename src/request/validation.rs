//! Entry validation of execution requests.
//!
//! Everything here runs before any subprocess exists; failures are reported
//! synchronously to the submitter.

use crate::config::EngineConfig;
use crate::error::ExecError;

use super::schema::{ExecutionRequest, RequestMode};

/// Variable names that collide with identifiers the generated Global Phase
/// script already binds.
pub const RESERVED_NAMES: &[&str] = &[
    "result",
    "results",
    "data",
    "error",
    "env",
    "process",
    "require",
    "module",
    "console",
    "global",
    "globalThis",
];

/// Whether `name` is a valid variable identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate the shape of a request against the engine configuration.
///
/// Cross-variable checks (undeclared references, cycles) live in the graph
/// module; this layer covers per-field structure only.
pub fn validate_request(request: &ExecutionRequest, config: &EngineConfig) -> Result<(), ExecError> {
    let mode = request
        .mode()
        .ok_or_else(|| ExecError::Validation("request contains no code, command, or secure data variables".into()))?;

    match mode {
        RequestMode::TwoPhase => validate_two_phase(request, config),
        RequestMode::LegacyCode => {
            if request.command.is_some() {
                return Err(ExecError::Validation(
                    "request must not combine 'code' and 'command'".into(),
                ));
            }
            if !cfg!(feature = "legacy-exec") {
                return Err(ExecError::Validation(
                    "flat code execution is not enabled in this build".into(),
                ));
            }
            Ok(())
        }
        RequestMode::RawCommand => {
            if !cfg!(feature = "raw-command") || !config.allow_raw_commands {
                return Err(ExecError::SecurityViolation(
                    "raw command execution is disabled".into(),
                ));
            }
            Ok(())
        }
    }
}

fn validate_two_phase(request: &ExecutionRequest, config: &EngineConfig) -> Result<(), ExecError> {
    if request.code.is_some() || request.command.is_some() {
        return Err(ExecError::Validation(
            "two-phase requests must not carry 'code' or 'command'".into(),
        ));
    }
    let global_code = request
        .global_code
        .as_deref()
        .ok_or_else(|| ExecError::Validation("two-phase request is missing Global_code".into()))?;
    if global_code.trim().is_empty() {
        return Err(ExecError::Validation("Global_code is empty".into()));
    }

    let specs = match &request.secure_data_variables {
        Some(specs) => specs,
        None => return Ok(()),
    };

    if specs.len() > config.max_data_variables {
        return Err(ExecError::Validation(format!(
            "too many data variables: {} (maximum {})",
            specs.len(),
            config.max_data_variables
        )));
    }

    for (name, spec) in specs.iter() {
        if !is_valid_identifier(name) {
            return Err(ExecError::Validation(format!(
                "invalid variable name '{}'",
                name
            )));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(ExecError::Validation(format!(
                "variable name '{}' is reserved",
                name
            )));
        }
        if spec.url.trim().is_empty() {
            return Err(ExecError::Validation(format!(
                "variable '{}' has an empty url",
                name
            )));
        }
        if let Some(passed) = &spec.passed_variables {
            for (target, pv) in passed {
                if target.trim().is_empty() {
                    return Err(ExecError::Validation(format!(
                        "variable '{}' has an empty passed-variable target path",
                        name
                    )));
                }
                if pv.passed_from.trim().is_empty() {
                    return Err(ExecError::Validation(format!(
                        "variable '{}' passed-variable '{}' has an empty source",
                        name, target
                    )));
                }
            }
        }
    }

    Ok(())
}
