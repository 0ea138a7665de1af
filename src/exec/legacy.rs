//! Compatibility execution paths.
//!
//! The single-phase path predates the two-phase design and is strictly
//! weaker: low-risk code runs with the broad environment it was historically
//! granted, anything riskier gets the reduced environment and redacted
//! output. The raw-command path has no isolation at all and exists as an
//! explicit, separately flagged escape hatch.

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::ExecError;
#[cfg(feature = "legacy-exec")]
use crate::exec::environment::global_env;
use crate::exec::orchestrator::{ExecContext, Orchestrator};
use crate::request::ExecutionRequest;
use crate::runner::{run_script, SubprocessSpec};
#[cfg(feature = "legacy-exec")]
use crate::security::{classify, RiskLevel};
use crate::security::{EventSeverity, SecurityEventType};

impl Orchestrator {
    #[cfg(feature = "legacy-exec")]
    pub(crate) async fn run_legacy_code(
        &self,
        request: &ExecutionRequest,
        ctx: &ExecContext,
    ) -> Result<Value, ExecError> {
        let code = request.code.as_deref().unwrap_or_default();
        let risk = classify(code);

        if risk > RiskLevel::Low {
            self.audit_event(
                SecurityEventType::RiskyLegacyExecution {
                    risk: risk.as_str().to_string(),
                },
                EventSeverity::Warning,
                ctx,
            )
            .await;
        }

        let env = match risk {
            // the pragmatic historic default, not a security posture
            RiskLevel::Low => std::env::vars().collect(),
            _ => global_env(&self.config.credential_prefix),
        };

        let timeout = request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(self.config.global_timeout_secs));

        let output = run_script(
            SubprocessSpec {
                interpreter: self.engine.interpreter().to_string(),
                args: self.engine.interpreter_args(),
                script: self.engine.code_script(code)?,
                extension: self.engine.extension(),
                env,
                timeout,
                cwd: None,
            },
            ctx.observer.clone(),
        )
        .await?;

        let (stdout, stderr) = if risk > RiskLevel::Low {
            let redactor = self.diagnostics_redactor();
            (
                redactor.redact(&output.stdout).into_owned(),
                redactor.redact(&output.stderr).into_owned(),
            )
        } else {
            (output.stdout, output.stderr)
        };

        if output.exit_code != 0 {
            return Err(ExecError::Execution {
                exit_code: output.exit_code,
                stdout,
                stderr,
            });
        }

        Ok(json!({
            "stdout": stdout,
            "stderr": stderr,
            "exitCode": output.exit_code,
            "risk": risk.as_str(),
        }))
    }

    #[cfg(feature = "raw-command")]
    pub(crate) async fn run_raw_command(
        &self,
        request: &ExecutionRequest,
        ctx: &ExecContext,
    ) -> Result<Value, ExecError> {
        if !self.config.allow_raw_commands {
            return Err(ExecError::SecurityViolation(
                "raw command execution is disabled".into(),
            ));
        }
        let command = request.command.as_deref().unwrap_or_default();

        self.audit_event(
            SecurityEventType::RawCommandExecuted,
            EventSeverity::Critical,
            ctx,
        )
        .await;

        let timeout = request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(self.config.global_timeout_secs));

        // no isolation: full inherited environment, shell semantics
        let output = run_script(
            SubprocessSpec {
                interpreter: "sh".to_string(),
                args: Vec::new(),
                script: command.to_string(),
                extension: "sh",
                env: std::env::vars().collect(),
                timeout,
                cwd: None,
            },
            ctx.observer.clone(),
        )
        .await?;

        if output.exit_code != 0 {
            return Err(ExecError::Execution {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(json!({
            "stdout": output.stdout,
            "stderr": output.stderr,
            "exitCode": output.exit_code,
        }))
    }
}
