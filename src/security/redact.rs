//! Secret redaction for diagnostics.
//!
//! Captured stdout/stderr attached to failed jobs, and any legacy-mode output
//! classified above low risk, passes through here first. The redactor knows
//! the exact credential values present in the environment, so known values
//! are scrubbed by substring match in addition to the shape-based patterns.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

const REDACTED: &str = "[REDACTED]";

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // bearer tokens in headers or logs
        r"(?i)bearer\s+[a-zA-Z0-9_.=\-]{8,}",
        // key=value style assignments of secret-named keys
        r#"(?i)(api[_-]?key|apikey|secret|token|password|passwd|credential)['"]?\s*[:=]\s*['"]?[^\s'",;]{6,}"#,
        // private key blocks
        r"-----BEGIN\s+(RSA\s+)?PRIVATE\s+KEY-----",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid secret pattern"))
    .collect()
});

/// Scrubs secret-shaped substrings and known secret values from text.
#[derive(Debug, Clone, Default)]
pub struct SecretRedactor {
    known_values: Vec<String>,
}

impl SecretRedactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register exact values to scrub wherever they appear. Short values are
    /// skipped: redacting them would mangle unrelated text.
    pub fn with_known_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_values: values
                .into_iter()
                .map(Into::into)
                .filter(|v| v.len() >= 4)
                .collect(),
        }
    }

    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut result = Cow::Borrowed(input);

        for value in &self.known_values {
            if result.contains(value.as_str()) {
                result = Cow::Owned(result.replace(value.as_str(), REDACTED));
            }
        }
        for pattern in SECRET_PATTERNS.iter() {
            if pattern.is_match(&result) {
                result = Cow::Owned(pattern.replace_all(&result, REDACTED).into_owned());
            }
        }
        result
    }
}
