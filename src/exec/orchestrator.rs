//! The execution orchestrator: the security boundary.
//!
//! Two phases, both mandatory and ordered. The Credential Phase runs one
//! isolated subprocess per data variable, in dependency order, with
//! credential-class variables in its environment; each raw result is reduced
//! to a [`SanitizedResult`] the moment it is parsed. The Global Phase runs
//! the caller's code in a subprocess whose environment excludes every
//! credential-class variable, which is the core invariant of the design.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::error::ExecError;
use crate::exec::environment::{
    credential_env, credential_var_names, credential_var_values, global_env,
};
use crate::exec::scriptgen::{NodeScriptEngine, ScriptEngine};
use crate::graph::build_dependency_graph;
use crate::request::{validate_request, DataSpec, DataSpecMap, ExecutionRequest, RequestMode};
use crate::runner::{
    extract_sentinel_payload, run_script, GlobalOutcome, LineObserver, RawOutcome, SubprocessSpec,
    GLOBAL_EXEC_SENTINEL, SECURE_FETCH_SENTINEL,
};
use crate::sanitize::{sanitize_outcome, OutputReviewer, ReviewVerdict, SanitizedResult};
use crate::security::{
    scan_global_code, AuditLogger, EventSeverity, SecretRedactor, SecurityEvent, SecurityEventType,
    SlidingWindowRateLimiter, TracingAuditLogger,
};
use crate::template::interpolate_spec;

/// Per-execution context handed down from the scheduler.
#[derive(Clone, Default)]
pub struct ExecContext {
    pub job_id: Option<String>,
    /// Extra per-request variables for the Credential Phase environment,
    /// typically derived from caller-supplied headers.
    pub extra_env: HashMap<String, String>,
    /// Observer over live stdout lines of every spawned subprocess.
    pub observer: Option<LineObserver>,
}

/// The assembled result of a two-phase run.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// Sanitized result per variable, in execution order.
    pub variables: Vec<(String, SanitizedResult)>,
    pub global: GlobalOutcome,
    pub review: ReviewVerdict,
}

impl ExecOutcome {
    pub fn into_value(self) -> Value {
        let mut variables = serde_json::Map::new();
        for (name, result) in self.variables {
            variables.insert(name, serde_json::to_value(&result).unwrap_or(Value::Null));
        }
        let mut out = json!({
            "variables": variables,
            "global": {
                "stdout": self.global.stdout,
                "stderr": self.global.stderr,
                "returnValue": self.global.return_value,
                "errors": self.global.errors,
            },
        });
        if self.review != ReviewVerdict::Unreviewed {
            out["review"] = serde_json::to_value(&self.review).unwrap_or(Value::Null);
        }
        out
    }
}

/// Drives request execution across its phases.
pub struct Orchestrator {
    pub(crate) config: EngineConfig,
    pub(crate) engine: Arc<dyn ScriptEngine>,
    rate_limiter: SlidingWindowRateLimiter,
    pub(crate) audit: Arc<dyn AuditLogger>,
    reviewer: Option<Arc<dyn OutputReviewer>>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Self {
        let rate_limiter = SlidingWindowRateLimiter::new(
            config.rate_limit_max,
            Duration::from_secs(config.rate_limit_window_secs),
        );
        Self {
            config,
            engine: Arc::new(NodeScriptEngine::new()),
            rate_limiter,
            audit: Arc::new(TracingAuditLogger),
            reviewer: None,
        }
    }

    /// Substitute the script engine (tests use a shell-based one).
    pub fn with_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn OutputReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Checks that must pass before any subprocess exists: request shape,
    /// dependency graph acyclicity, and the static credential scan. Failures
    /// are reported synchronously to the submitter.
    pub fn preflight(&self, request: &ExecutionRequest) -> Result<(), ExecError> {
        validate_request(request, &self.config)?;

        if request.mode() == Some(RequestMode::TwoPhase) {
            if let Some(specs) = &request.secure_data_variables {
                let graph = build_dependency_graph(specs)?;
                graph.execution_order()?;
            }
            if let Some(code) = &request.global_code {
                let known = credential_var_names(&self.config.credential_prefix);
                scan_global_code(code, &self.config.credential_prefix, &known)?;
            }
        }
        Ok(())
    }

    /// Execute a request to completion. The returned value is what the
    /// scheduler records as the job result.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        ctx: &ExecContext,
    ) -> Result<Value, ExecError> {
        self.preflight(request)?;
        match request.mode() {
            Some(RequestMode::TwoPhase) => {
                let outcome = self.run_two_phase(request, ctx).await?;
                Ok(outcome.into_value())
            }
            Some(RequestMode::LegacyCode) => self.run_legacy_code(request, ctx).await,
            Some(RequestMode::RawCommand) => self.run_raw_command(request, ctx).await,
            None => Err(ExecError::Validation("empty request".into())),
        }
    }

    async fn run_two_phase(
        &self,
        request: &ExecutionRequest,
        ctx: &ExecContext,
    ) -> Result<ExecOutcome, ExecError> {
        let empty = DataSpecMap::new();
        let specs = request.secure_data_variables.as_ref().unwrap_or(&empty);
        let graph = build_dependency_graph(specs)?;
        let order = graph.execution_order()?;

        // ---- Credential Phase ----
        let mut variables: Vec<(String, SanitizedResult)> = Vec::with_capacity(order.len());
        let mut resolved: HashMap<String, Value> = HashMap::new();
        for name in &order {
            let Some(spec) = specs.get(name) else {
                continue;
            };
            let sanitized = match self.fetch_variable(name, spec, &resolved, ctx).await {
                Ok(sanitized) => sanitized,
                Err(err) => {
                    // one variable's failure never aborts its siblings
                    if matches!(err, ExecError::RateLimit { .. }) {
                        self.audit_event(
                            SecurityEventType::RateLimitRejected {
                                variable: name.clone(),
                            },
                            EventSeverity::Warning,
                            ctx,
                        )
                        .await;
                    }
                    tracing::debug!(variable = %name, kind = err.kind(), "credential fetch failed");
                    SanitizedResult::from_exec_error(&err)
                }
            };
            if let Some(data) = sanitized.data() {
                resolved.insert(name.clone(), data.clone());
            }
            variables.push((name.clone(), sanitized));
        }

        // ---- Global Phase ----
        let code = request.global_code.as_deref().unwrap_or_default();
        let known = credential_var_names(&self.config.credential_prefix);
        if let Err(err) = scan_global_code(code, &self.config.credential_prefix, &known) {
            self.audit_event(
                SecurityEventType::CredentialReferenceBlocked {
                    tokens: known.clone(),
                },
                EventSeverity::Critical,
                ctx,
            )
            .await;
            return Err(err);
        }

        let global = self.run_global_phase(code, &variables, request, ctx).await?;

        let review = match &self.reviewer {
            Some(reviewer) => {
                let verdict = reviewer.review(&global).await;
                if let ReviewVerdict::Flagged { reason } = &verdict {
                    tracing::warn!(job_id = ?ctx.job_id, %reason, "output review flagged result");
                }
                verdict
            }
            None => ReviewVerdict::Unreviewed,
        };

        Ok(ExecOutcome {
            variables,
            global,
            review,
        })
    }

    /// One Credential Phase fetch: rate limit, interpolate, spawn, parse,
    /// sanitize. A sentinel parse failure becomes a sanitized parse error
    /// rather than an `Err`.
    async fn fetch_variable(
        &self,
        name: &str,
        spec: &DataSpec,
        resolved: &HashMap<String, Value>,
        ctx: &ExecContext,
    ) -> Result<SanitizedResult, ExecError> {
        self.rate_limiter.check_and_record(name)?;
        let spec = interpolate_spec(name, spec, resolved)?;
        let script = self.engine.fetch_script(&spec)?;
        let env = credential_env(&self.config.credential_prefix, &ctx.extra_env);

        let output = run_script(
            SubprocessSpec {
                interpreter: self.engine.interpreter().to_string(),
                args: self.engine.interpreter_args(),
                script,
                extension: self.engine.extension(),
                env,
                timeout: Duration::from_secs(self.config.fetch_timeout_secs),
                cwd: None,
            },
            ctx.observer.clone(),
        )
        .await?;

        if output.exit_code != 0 {
            // stderr stays on this side of the boundary
            tracing::debug!(variable = %name, exit_code = output.exit_code, "fetch subprocess failed");
            return Err(ExecError::Execution {
                exit_code: output.exit_code,
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let outcome = match extract_sentinel_payload(&output.stdout, SECURE_FETCH_SENTINEL)
            .and_then(RawOutcome::from_value)
        {
            Ok(outcome) => outcome,
            Err(err) => return Ok(SanitizedResult::error(err.to_string(), "parse_error")),
        };

        let sanitized = sanitize_outcome(outcome, self.config.max_response_bytes);
        if let SanitizedResult::Error { kind, .. } = &sanitized {
            if kind == "sanitization_error" {
                self.audit_event(
                    SecurityEventType::ResponseSizeExceeded {
                        variable: name.to_string(),
                        max: self.config.max_response_bytes,
                    },
                    EventSeverity::Warning,
                    ctx,
                )
                .await;
            }
        }
        Ok(sanitized)
    }

    async fn run_global_phase(
        &self,
        code: &str,
        variables: &[(String, SanitizedResult)],
        request: &ExecutionRequest,
        ctx: &ExecContext,
    ) -> Result<GlobalOutcome, ExecError> {
        let script = self
            .engine
            .global_script(code, variables, &self.config.credential_prefix)?;
        let env = global_env(&self.config.credential_prefix);
        let timeout = request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(self.config.global_timeout_secs));

        let output = run_script(
            SubprocessSpec {
                interpreter: self.engine.interpreter().to_string(),
                args: self.engine.interpreter_args(),
                script,
                extension: self.engine.extension(),
                env,
                timeout,
                cwd: None,
            },
            ctx.observer.clone(),
        )
        .await?;

        if output.exit_code != 0 {
            let redactor = self.diagnostics_redactor();
            return Err(ExecError::Execution {
                exit_code: output.exit_code,
                stdout: redactor.redact(&output.stdout).into_owned(),
                stderr: redactor.redact(&output.stderr).into_owned(),
            });
        }

        let payload = extract_sentinel_payload(&output.stdout, GLOBAL_EXEC_SENTINEL)?;
        let outcome: GlobalOutcome = serde_json::from_value(payload)?;
        Ok(outcome)
    }

    /// Redactor primed with the credential values currently in the
    /// environment, for diagnostics that leave the process.
    pub(crate) fn diagnostics_redactor(&self) -> SecretRedactor {
        SecretRedactor::with_known_values(credential_var_values(&self.config.credential_prefix))
    }

    pub(crate) async fn audit_event(
        &self,
        event_type: SecurityEventType,
        severity: EventSeverity,
        ctx: &ExecContext,
    ) {
        let mut event = SecurityEvent::new(event_type, severity);
        if let Some(job_id) = &ctx.job_id {
            event = event.with_job_id(job_id.clone());
        }
        self.audit.log_event(event).await;
    }

    #[cfg(not(feature = "legacy-exec"))]
    async fn run_legacy_code(
        &self,
        _request: &ExecutionRequest,
        _ctx: &ExecContext,
    ) -> Result<Value, ExecError> {
        Err(ExecError::Validation(
            "flat code execution is not enabled in this build".into(),
        ))
    }

    #[cfg(not(feature = "raw-command"))]
    async fn run_raw_command(
        &self,
        _request: &ExecutionRequest,
        _ctx: &ExecContext,
    ) -> Result<Value, ExecError> {
        Err(ExecError::SecurityViolation(
            "raw command execution is disabled".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> ExecutionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_preflight_rejects_cycles_before_spawn() {
        let orchestrator = Orchestrator::new(EngineConfig::default());
        let req = request(json!({
            "secure_data_variables": {
                "a": {"url": "https://x/a", "passed_variables": {"url": {"passed_from": "b", "value": "${result.id}"}}},
                "b": {"url": "https://x/b", "passed_variables": {"url": {"passed_from": "a", "value": "${result.id}"}}}
            },
            "Global_code": "return 1;"
        }));
        let err = orchestrator.preflight(&req).unwrap_err();
        assert_eq!(err.kind(), "dependency_cycle_error");
    }

    #[test]
    fn test_preflight_rejects_credential_reference() {
        let orchestrator = Orchestrator::new(EngineConfig::default());
        let req = request(json!({
            "secure_data_variables": {"a": {"url": "https://x/a"}},
            "Global_code": "return process.env.SECURE_ANYTHING;"
        }));
        let err = orchestrator.preflight(&req).unwrap_err();
        assert_eq!(err.kind(), "security_violation");
    }

    #[test]
    fn test_preflight_rejects_too_many_variables() {
        let orchestrator = Orchestrator::new(EngineConfig::default());
        let mut vars = serde_json::Map::new();
        for i in 0..11 {
            vars.insert(format!("v{}", i), json!({"url": "https://x"}));
        }
        let req = request(json!({
            "secure_data_variables": vars,
            "Global_code": "return 1;"
        }));
        let err = orchestrator.preflight(&req).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_outcome_value_shape() {
        let outcome = ExecOutcome {
            variables: vec![("a".to_string(), SanitizedResult::success(json!({"id": 1})))],
            global: GlobalOutcome {
                stdout: "out".into(),
                stderr: String::new(),
                return_value: json!(7),
                errors: vec![],
            },
            review: ReviewVerdict::Unreviewed,
        };
        let value = outcome.into_value();
        assert_eq!(value["variables"]["a"]["success"], json!(true));
        assert_eq!(value["global"]["returnValue"], json!(7));
        assert!(value.get("review").is_none());
    }
}
