use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Opaque identifier of one workflow run, assigned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("execution id must be non-empty".to_string());
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err("execution id must not contain whitespace".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for ExecutionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .map_err(|err| D::Error::custom(format!("invalid execution id `{raw}`: {err}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Interrupted,
    Completed,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Interrupted => "interrupted",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Roster entry, refreshed via `GET /executions`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExecutionSummary {
    pub id: ExecutionId,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub checkpoint_id: String,
    #[serde(default)]
    pub input: BTreeMap<String, serde_json::Value>,
}

/// A proposed action awaiting confirm/reject. `args` is opaque serialized
/// text; the client validates its syntax but never interprets its content.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// Full point-in-time state of one execution as last served by the engine.
/// Replaced wholesale on every successful fetch; never partially merged.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExecutionSnapshot {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub message_history: Vec<ChatMessage>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub node_execution_log: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub saved_at: i64,
    #[serde(default)]
    pub current_node: String,
    #[serde(default)]
    pub pending_tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CheckpointSummary {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecuteRequest {
    pub name: String,
    pub location: String,
}

/// Operator decision for the currently pending tool call. `RejectWithArgs`
/// carries replacement arguments; the engine resumes with them (observed
/// behavior of the reject action; this client does not reinterpret it as a
/// veto).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    RejectWithArgs(String),
}

impl Decision {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::RejectWithArgs(_) => "reject",
        }
    }

    pub fn new_args(&self) -> Option<&str> {
        match self {
            Self::Confirm => None,
            Self::RejectWithArgs(args) => Some(args),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConfirmOutcome {
    pub status: String,
    #[serde(default)]
    pub new_args: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_rejects_blank_and_whitespace_values() {
        assert!(ExecutionId::parse("exec-1700000000").is_ok());
        assert!(ExecutionId::parse("  ").is_err());
        assert!(ExecutionId::parse("exec 1").is_err());
    }

    #[test]
    fn snapshot_decodes_with_missing_optional_sequences() {
        let raw = r#"{
            "execution_id": "exec-1",
            "status": "running",
            "message_history": [],
            "context": {},
            "node_execution_log": {},
            "saved_at": 12,
            "current_node": "ChatTemplate"
        }"#;
        let snapshot: ExecutionSnapshot = serde_json::from_str(raw).unwrap();
        assert!(snapshot.pending_tool_calls.is_empty());
        assert!(snapshot.result.is_none());
        assert_eq!(snapshot.current_node, "ChatTemplate");
    }

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Interrupted,
            ExecutionStatus::Completed,
            ExecutionStatus::Error,
        ] {
            let encoded = serde_json::to_string(&status).unwrap();
            assert_eq!(encoded, format!("\"{}\"", status.as_str()));
            let decoded: ExecutionStatus = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, status);
        }
    }
}
