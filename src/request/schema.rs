//! Wire shapes for execution requests.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// HTTP methods a data spec may use. Anything else is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Authorization block on a data spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    NoAuth,
    BearerToken,
    BasicAuth,
}

/// Declares that one field of this spec must be rewritten from another spec's
/// result before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassedVariable {
    /// Name of the variable whose result supplies the value.
    pub passed_from: String,
    /// Template containing `${result.<path>}` markers.
    pub value: String,
}

/// One named, independently fetchable unit of the Credential Phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSpec {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Header values may contain `${NAME}` credential placeholders, expanded
    /// inside the Credential Phase subprocess where those variables exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
    /// Documentation only: names which credential this spec expects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Map of target field path (e.g. `body.user_id`) to its source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_variables: Option<HashMap<String, PassedVariable>>,
}

/// The secure data variable mapping, preserving declaration order.
///
/// Declaration order matters: it breaks ties in the topological execution
/// order, keeping runs deterministic. A plain `HashMap` would lose it, so
/// deserialization goes through a map visitor into a `Vec`.
#[derive(Debug, Clone, Default)]
pub struct DataSpecMap {
    entries: Vec<(String, DataSpec)>,
}

impl DataSpecMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DataSpec> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Variable names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataSpec)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Insert a spec, replacing any existing entry with the same name.
    pub fn insert(&mut self, name: impl Into<String>, spec: DataSpec) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = spec;
        } else {
            self.entries.push((name, spec));
        }
    }
}

impl Serialize for DataSpecMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, spec) in &self.entries {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DataSpecMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecMapVisitor;

        impl<'de> Visitor<'de> for SpecMapVisitor {
            type Value = DataSpecMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of variable name to data spec")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, DataSpec)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, spec)) = access.next_entry::<String, DataSpec>()? {
                    if entries.iter().any(|(n, _)| *n == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate data variable '{}'",
                            name
                        )));
                    }
                    entries.push((name, spec));
                }
                Ok(DataSpecMap { entries })
            }
        }

        deserializer.deserialize_map(SpecMapVisitor)
    }
}

/// An execution request: either a flat `code`/`command` string (legacy paths)
/// or the structured two-phase payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_data_variables: Option<DataSpecMap>,
    #[serde(
        default,
        rename = "Global_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub global_code: Option<String>,
    /// Per-request timeout override, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Accepted for compatibility; no retry semantics are attached to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Accepted for compatibility; admission is strictly FIFO and ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Which execution path a request selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Structured two-phase payload: the secure path.
    TwoPhase,
    /// Flat code string, risk-classified. Strictly weaker isolation.
    LegacyCode,
    /// Raw shell command, no isolation at all.
    RawCommand,
}

impl ExecutionRequest {
    pub fn mode(&self) -> Option<RequestMode> {
        if self.secure_data_variables.is_some() || self.global_code.is_some() {
            Some(RequestMode::TwoPhase)
        } else if self.code.is_some() {
            Some(RequestMode::LegacyCode)
        } else if self.command.is_some() {
            Some(RequestMode::RawCommand)
        } else {
            None
        }
    }
}
