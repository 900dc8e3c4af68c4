use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConditionType {
    #[default]
    #[serde(alias = "")]
    Always,
    Success,
    Error,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionType::Always => write!(f, "always"),
            ConditionType::Success => write!(f, "success"),
            ConditionType::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConditionTypeError(pub String);

impl fmt::Display for ParseConditionTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid condition: '{}'. Valid values are: always, success, error",
            self.0
        )
    }
}

impl std::error::Error for ParseConditionTypeError {}

impl FromStr for ConditionType {
    type Err = ParseConditionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "always" => Ok(ConditionType::Always),
            "success" => Ok(ConditionType::Success),
            "error" => Ok(ConditionType::Error),
            _ => Err(ParseConditionTypeError(s.to_string())),
        }
    }
}

/// Tags a test definition can carry to change how the compiler places it.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// Must not run concurrently with its siblings.
    Serial,
    /// Failures must never be masked by `continueOnError`.
    Disruptive,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Serial => write!(f, "serial"),
            Behavior::Disruptive => write!(f, "disruptive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBehaviorError(pub String);

impl fmt::Display for ParseBehaviorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid behavior: '{}'. Valid values are: serial, disruptive",
            self.0
        )
    }
}

impl std::error::Error for ParseBehaviorError {}

impl FromStr for Behavior {
    type Err = ParseBehaviorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Behavior::Serial),
            "disruptive" => Ok(Behavior::Disruptive),
            _ => Err(ParseBehaviorError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Env,
    File,
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigType::Env => write!(f, "env"),
            ConfigType::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueFrom {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<KeyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<KeyRef>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigElement {
    #[serde(rename = "type")]
    pub config_type: ConfigType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Private elements stay with the step that defines them.
    #[serde(default)]
    pub private: bool,
}

impl ConfigElement {
    pub fn env(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            config_type: ConfigType::Env,
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
            path: None,
            private: false,
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Match every test definition whose name contains `name`.
    #[serde(default)]
    pub substring: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub condition: ConditionType,
    #[serde(default)]
    pub untrusted: bool,
    #[serde(default)]
    pub config: Vec<ConfigElement>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagStep {
    pub name: String,
    pub definition: StepDefinition,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_from: Option<String>,
    #[serde(default)]
    pub use_global_artifacts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<PauseSpec>,
}

impl DagStep {
    pub fn pause_enabled(&self) -> bool {
        self.pause.as_ref().is_some_and(|p| p.enabled)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Git,
    Local,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestLocation {
    #[serde(rename = "type")]
    pub location_type: LocationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinitionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub recipients_on_failure: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub behavior: BTreeSet<Behavior>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<u64>,
    #[serde(default)]
    pub config: Vec<ConfigElement>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    #[default]
    Init,
    Running,
    Success,
    Failed,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatusPosition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub flow: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatusTestDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub recipients_on_failure: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<TestLocation>,
    #[serde(default)]
    pub config: Vec<ConfigElement>,
}

/// Snapshot used to seed the live status of a node before execution.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub name: String,
    pub position: StepStatusPosition,
    pub phase: Phase,
    pub test_definition: StepStatusTestDefinition,
}
