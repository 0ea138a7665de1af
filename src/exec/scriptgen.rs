//! Script generation for the spawned phases.
//!
//! Each phase compiles to a self-contained script, written to disk and run by
//! a fresh interpreter; results come back over the sentinel protocol because
//! parent and child share no memory. [`ScriptEngine`] is the seam: the
//! default engine targets Node.js, which is what caller-supplied code is
//! written in, and tests substitute a shell-based engine.

use std::sync::Arc;

use base64::Engine as _;

use crate::error::ExecError;
use crate::request::{AuthType, DataSpec, HttpMethod};
use crate::runner::{GLOBAL_EXEC_SENTINEL, SECURE_FETCH_SENTINEL};
use crate::sanitize::SanitizedResult;

/// Generates phase scripts for one interpreter.
pub trait ScriptEngine: Send + Sync {
    /// Interpreter executable.
    fn interpreter(&self) -> &str;

    /// Arguments placed before the script path.
    fn interpreter_args(&self) -> Vec<String> {
        Vec::new()
    }

    /// Script file extension.
    fn extension(&self) -> &'static str;

    /// Credential Phase script: perform exactly one outbound HTTP call for
    /// `spec` and print one sentinel line with the serialized raw result.
    fn fetch_script(&self, spec: &DataSpec) -> Result<String, ExecError>;

    /// Global Phase script: bind one callable per sanitized result, guard
    /// environment access against credential-class names, run the caller's
    /// code, and print one sentinel line with the outcome.
    fn global_script(
        &self,
        code: &str,
        results: &[(String, SanitizedResult)],
        prefix: &str,
    ) -> Result<String, ExecError>;

    /// Legacy single-phase script: the caller's code, run as-is.
    fn code_script(&self, code: &str) -> Result<String, ExecError> {
        Ok(code.to_string())
    }
}

/// The default engine: generates JavaScript for the Node.js interpreter.
pub struct NodeScriptEngine {
    interpreter: String,
}

impl NodeScriptEngine {
    pub fn new() -> Self {
        Self {
            interpreter: "node".to_string(),
        }
    }

    /// Use an explicit interpreter path instead of resolving `node` on PATH.
    pub fn with_interpreter(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl Default for NodeScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

impl ScriptEngine for NodeScriptEngine {
    fn interpreter(&self) -> &str {
        &self.interpreter
    }

    fn extension(&self) -> &'static str {
        "js"
    }

    fn fetch_script(&self, spec: &DataSpec) -> Result<String, ExecError> {
        let headers = spec.headers.clone().unwrap_or_default();
        let headers_json = serde_json::to_string(&headers)?;
        let url_json = js_string(&spec.url);
        let method_json = js_string(spec.method.as_str());

        let mut auth_lines = String::new();
        if let Some(auth) = &spec.authorization {
            match auth.auth_type {
                AuthType::BearerToken => {
                    if let Some(token) = &auth.token {
                        auth_lines = format!(
                            "  headers[\"Authorization\"] = \"Bearer \" + __expand({});\n",
                            js_string(token)
                        );
                    }
                }
                AuthType::BasicAuth => {
                    let user = auth.username.as_deref().unwrap_or_default();
                    let pass = auth.password.as_deref().unwrap_or_default();
                    // encoded after placeholder expansion, inside the child
                    auth_lines = format!(
                        "  headers[\"Authorization\"] = \"Basic \" + Buffer.from(__expand({}) + \":\" + __expand({})).toString(\"base64\");\n",
                        js_string(user),
                        js_string(pass)
                    );
                }
                AuthType::NoAuth => {}
            }
        }

        let mut body_lines = String::new();
        if spec.method != HttpMethod::Get {
            if let Some(body) = &spec.body {
                match body {
                    serde_json::Value::String(s) => {
                        body_lines = format!("  init.body = __expand({});\n", js_string(s));
                    }
                    other => {
                        body_lines = format!(
                            "  init.body = JSON.stringify({});\n  if (!(\"Content-Type\" in headers) && !(\"content-type\" in headers)) headers[\"Content-Type\"] = \"application/json\";\n",
                            serde_json::to_string(other)?
                        );
                    }
                }
            }
        }

        Ok(format!(
            r#""use strict";
const __expand = (s) =>
  String(s).replace(/\$\{{([A-Za-z_][A-Za-z0-9_]*)\}}/g, (m, name) =>
    Object.prototype.hasOwnProperty.call(process.env, name) ? process.env[name] : m);
(async () => {{
  const headers = {headers_json};
  for (const k of Object.keys(headers)) headers[k] = __expand(headers[k]);
{auth_lines}  const init = {{ method: {method_json}, headers }};
{body_lines}  try {{
    const resp = await fetch(__expand({url_json}), init);
    const text = await resp.text();
    let body;
    try {{ body = JSON.parse(text); }} catch (_) {{ body = text; }}
    const outHeaders = {{}};
    resp.headers.forEach((v, k) => {{ outHeaders[k] = v; }});
    process.stdout.write(
      "{fetch_sentinel}: " + JSON.stringify({{ status: resp.status, headers: outHeaders, body }}) + "\n");
  }} catch (err) {{
    const message = err && err.message ? String(err.message) : String(err);
    process.stdout.write(
      "{fetch_sentinel}: " + JSON.stringify({{ error: {{ message, type: "fetch_error" }} }}) + "\n");
  }}
}})();
"#,
            headers_json = headers_json,
            auth_lines = auth_lines,
            method_json = method_json,
            body_lines = body_lines,
            url_json = url_json,
            fetch_sentinel = SECURE_FETCH_SENTINEL,
        ))
    }

    fn global_script(
        &self,
        code: &str,
        results: &[(String, SanitizedResult)],
        prefix: &str,
    ) -> Result<String, ExecError> {
        let mut results_map = serde_json::Map::new();
        for (name, result) in results {
            results_map.insert(name.clone(), serde_json::to_value(result)?);
        }
        let results_json = serde_json::to_string(&serde_json::Value::Object(results_map))?;
        let prefix_json = js_string(prefix);
        let code_b64 = js_string(&base64::engine::general_purpose::STANDARD.encode(code));

        let mut callables = String::new();
        for (name, _) in results {
            callables.push_str(&format!(
                "globalThis.{name} = () => __results[{name_json}];\n",
                name = name,
                name_json = js_string(name)
            ));
        }

        Ok(format!(
            r#""use strict";
const __PREFIX = {prefix_json};
const __results = {results_json};
const __env = {{}};
for (const k of Object.keys(process.env)) {{
  if (!k.startsWith(__PREFIX)) __env[k] = process.env[k];
}}
// deny credential-class reads and hide them from enumeration, even if a
// prefixed variable somehow reached this process
process.env = new Proxy(__env, {{
  get: (t, p) => (typeof p === "string" && p.startsWith(__PREFIX) ? undefined : t[p]),
  has: (t, p) => (typeof p === "string" && p.startsWith(__PREFIX) ? false : p in t),
  ownKeys: (t) => Reflect.ownKeys(t).filter((k) => typeof k !== "string" || !k.startsWith(__PREFIX)),
  getOwnPropertyDescriptor: (t, p) =>
    typeof p === "string" && p.startsWith(__PREFIX)
      ? undefined
      : Reflect.getOwnPropertyDescriptor(t, p),
}});
const __stdout = [];
const __stderr = [];
const __errors = [];
const __write = process.stdout.write.bind(process.stdout);
const __writeErr = process.stderr.write.bind(process.stderr);
const __capture = (sink, write) => (...args) => {{
  const line = args.map((a) => (typeof a === "string" ? a : JSON.stringify(a))).join(" ");
  sink.push(line);
  write(line + "\n");
}};
console.log = __capture(__stdout, __write);
console.info = __capture(__stdout, __write);
console.warn = __capture(__stderr, __writeErr);
console.error = __capture(__stderr, __writeErr);
{callables}(async () => {{
  let returnValue = null;
  try {{
    const __code = Buffer.from({code_b64}, "base64").toString("utf8");
    const __AsyncFunction = Object.getPrototypeOf(async function () {{}}).constructor;
    const __fn = new __AsyncFunction(__code);
    const __ret = await __fn();
    returnValue = __ret === undefined ? null : __ret;
  }} catch (err) {{
    __errors.push(err && err.message ? String(err.message) : String(err));
  }}
  __write(
    "{global_sentinel}: " + JSON.stringify({{
      stdout: __stdout.join("\n"),
      stderr: __stderr.join("\n"),
      returnValue,
      errors: __errors,
    }}) + "\n");
}})();
"#,
            prefix_json = prefix_json,
            results_json = results_json,
            callables = callables,
            code_b64 = code_b64,
            global_sentinel = GLOBAL_EXEC_SENTINEL,
        ))
    }
}

/// Share an engine between the orchestrator and tests.
pub type SharedScriptEngine = Arc<dyn ScriptEngine>;

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use serde_json::json;

    fn spec(value: serde_json::Value) -> DataSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_fetch_script_embeds_request() {
        let engine = NodeScriptEngine::new();
        let script = engine
            .fetch_script(&spec(json!({
                "url": "https://api.example.com/user",
                "method": "POST",
                "headers": {"X-Api-Key": "${SECURE_API_KEY}"},
                "body": {"q": "all"}
            })))
            .unwrap();
        assert!(script.contains("https://api.example.com/user"));
        assert!(script.contains("\"POST\""));
        assert!(script.contains("${SECURE_API_KEY}"));
        assert!(script.contains(SECURE_FETCH_SENTINEL));
        assert!(script.contains("init.body = JSON.stringify"));
    }

    #[test]
    fn test_fetch_script_get_has_no_body() {
        let engine = NodeScriptEngine::new();
        let script = engine
            .fetch_script(&spec(json!({
                "url": "https://api.example.com/user",
                "body": {"ignored": true}
            })))
            .unwrap();
        assert!(!script.contains("init.body"));
    }

    #[test]
    fn test_fetch_script_bearer_auth() {
        let engine = NodeScriptEngine::new();
        let script = engine
            .fetch_script(&spec(json!({
                "url": "https://api.example.com/user",
                "authorization": {"type": "bearer_token", "token": "${SECURE_TOKEN}"}
            })))
            .unwrap();
        assert!(script.contains("\"Bearer \" + __expand"));
    }

    #[test]
    fn test_fetch_script_basic_auth_encodes_after_expansion() {
        let engine = NodeScriptEngine::new();
        let script = engine
            .fetch_script(&spec(json!({
                "url": "https://api.example.com/user",
                "authorization": {"type": "basic_auth", "username": "svc", "password": "${SECURE_PASS}"}
            })))
            .unwrap();
        assert!(script.contains("toString(\"base64\")"));
        assert!(script.contains("${SECURE_PASS}"));
    }

    #[test]
    fn test_fetch_script_escapes_hostile_url() {
        let engine = NodeScriptEngine::new();
        let script = engine
            .fetch_script(&spec(json!({
                "url": "https://x.test/\"); process.exit(1); //"
            })))
            .unwrap();
        // the URL lands inside a JSON string literal, not as code
        assert!(script.contains(r#"\"); process.exit(1); //"#));
    }

    #[test]
    fn test_global_script_binds_callables_and_guard() {
        let engine = NodeScriptEngine::new();
        let results = vec![
            ("login".to_string(), SanitizedResult::success(json!({"id": 42}))),
            (
                "orders".to_string(),
                SanitizedResult::error("fetch failed", "execution_error"),
            ),
        ];
        let script = engine
            .global_script("return login();", &results, "SECURE_")
            .unwrap();
        assert!(script.contains("globalThis.login"));
        assert!(script.contains("globalThis.orders"));
        assert!(script.contains("new Proxy"));
        assert!(script.contains(GLOBAL_EXEC_SENTINEL));
        // caller code is carried base64-encoded, never inline
        assert!(!script.contains("return login();"));
        let encoded = base64::engine::general_purpose::STANDARD.encode("return login();");
        assert!(script.contains(&encoded));
    }

    #[test]
    fn test_global_script_embeds_sanitized_shapes() {
        let engine = NodeScriptEngine::new();
        let results = vec![(
            "login".to_string(),
            SanitizedResult::success(json!({"id": 42})),
        )];
        let script = engine.global_script("return 1;", &results, "SECURE_").unwrap();
        assert!(script.contains("\"success\":true"));
        assert!(script.contains("\"id\":42"));
    }

    #[test]
    fn test_code_script_is_passthrough() {
        let engine = NodeScriptEngine::new();
        assert_eq!(
            engine.code_script("console.log(1)").unwrap(),
            "console.log(1)"
        );
    }
}
