//! Environment construction for both phases.
//!
//! The naming convention does all the work: only variables carrying the
//! credential prefix are ever handed to the Credential Phase beyond the base
//! allow-list, and only prefixed variables are ever withheld from the Global
//! Phase. Everything else passes through the allow-list in both cases.

use std::collections::HashMap;

/// Variables every spawned phase receives.
pub const BASE_ALLOWLIST: &[&str] = &["PATH", "HOME", "LANG", "LC_ALL", "TZ", "PWD"];

/// Credential Phase environment from an explicit variable snapshot.
pub fn credential_env_from<I>(
    vars: I,
    prefix: &str,
    extra: &HashMap<String, String>,
) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: HashMap<String, String> = vars
        .into_iter()
        .filter(|(k, _)| BASE_ALLOWLIST.contains(&k.as_str()) || k.starts_with(prefix))
        .collect();
    for (k, v) in extra {
        env.insert(k.clone(), v.clone());
    }
    env
}

/// Global Phase environment from an explicit variable snapshot: the base
/// allow-list with credential-class names filtered even if one collides.
pub fn global_env_from<I>(vars: I, prefix: &str) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(k, _)| BASE_ALLOWLIST.contains(&k.as_str()) && !k.starts_with(prefix))
        .collect()
}

/// Credential Phase environment from the current process environment.
pub fn credential_env(prefix: &str, extra: &HashMap<String, String>) -> HashMap<String, String> {
    credential_env_from(std::env::vars(), prefix, extra)
}

/// Global Phase environment from the current process environment.
pub fn global_env(prefix: &str) -> HashMap<String, String> {
    global_env_from(std::env::vars(), prefix)
}

/// Names of credential-class variables currently present.
pub fn credential_var_names(prefix: &str) -> Vec<String> {
    std::env::vars()
        .map(|(k, _)| k)
        .filter(|k| k.starts_with(prefix))
        .collect()
}

/// Values of credential-class variables currently present, for redaction.
pub fn credential_var_values(prefix: &str) -> Vec<String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with(prefix))
        .map(|(_, v)| v)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Vec<(String, String)> {
        vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("LANG".to_string(), "en_US.UTF-8".to_string()),
            ("TZ".to_string(), "UTC".to_string()),
            ("AWS_SECRET_ACCESS_KEY".to_string(), "aws-secret".to_string()),
            ("SECURE_API_KEY".to_string(), "key-123".to_string()),
            ("SECURE_DB_TOKEN".to_string(), "tok-456".to_string()),
            ("RANDOM_VAR".to_string(), "noise".to_string()),
        ]
    }

    #[test]
    fn test_credential_env_contents() {
        let env = credential_env_from(snapshot(), "SECURE_", &HashMap::new());
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(env.get("SECURE_API_KEY").map(String::as_str), Some("key-123"));
        assert_eq!(env.get("SECURE_DB_TOKEN").map(String::as_str), Some("tok-456"));
        // unprefixed secrets and arbitrary variables do not cross
        assert!(!env.contains_key("AWS_SECRET_ACCESS_KEY"));
        assert!(!env.contains_key("RANDOM_VAR"));
    }

    #[test]
    fn test_credential_env_extra_vars() {
        let extra = HashMap::from([("REQUEST_TOKEN".to_string(), "abc".to_string())]);
        let env = credential_env_from(snapshot(), "SECURE_", &extra);
        assert_eq!(env.get("REQUEST_TOKEN").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_global_env_excludes_credentials() {
        let env = global_env_from(snapshot(), "SECURE_");
        assert!(env.contains_key("PATH"));
        assert!(env.contains_key("LANG"));
        assert!(!env.contains_key("SECURE_API_KEY"));
        assert!(!env.contains_key("SECURE_DB_TOKEN"));
        assert!(!env.contains_key("RANDOM_VAR"));
    }

    #[test]
    fn test_global_env_filters_prefixed_allowlist_collision() {
        // a hostile prefix choice must still not leak
        let vars = vec![("PATH".to_string(), "/usr/bin".to_string())];
        let env = global_env_from(vars, "PA");
        assert!(env.is_empty());
    }
}
