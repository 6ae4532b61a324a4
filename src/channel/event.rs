use crate::api::ExecutionId;
use serde::Deserialize;

/// Push event decoded once at the channel boundary. Events signal that a
/// re-fetch is due; they never replace the fetched snapshot as a data
/// source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    StateUpdate {
        data: StateUpdateRef,
        #[serde(default)]
        timestamp: i64,
    },
    ExecutionStarted {
        data: ExecutionRef,
        #[serde(default)]
        timestamp: i64,
    },
    ExecutionCompleted {
        data: ExecutionRef,
        #[serde(default)]
        timestamp: i64,
    },
    Error {
        data: ErrorRef,
        #[serde(default)]
        timestamp: i64,
    },
}

/// `state_update` carries a full state body on the wire; only the id is
/// needed client-side, the rest is re-fetched from the state endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateUpdateRef {
    pub execution_id: ExecutionId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionRef {
    pub id: ExecutionId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorRef {
    #[serde(default)]
    pub error: String,
}

impl ChannelEvent {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
