//! The execution orchestrator and its supporting pieces: environment
//! construction, script generation, and the compatibility paths.

mod environment;
#[cfg(any(feature = "legacy-exec", feature = "raw-command"))]
mod legacy;
mod orchestrator;
mod scriptgen;

pub use environment::{
    credential_env, credential_env_from, credential_var_names, credential_var_values, global_env,
    global_env_from, BASE_ALLOWLIST,
};
pub use orchestrator::{ExecContext, ExecOutcome, Orchestrator};
pub use scriptgen::{NodeScriptEngine, ScriptEngine, SharedScriptEngine};
