#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("execution `{execution_id}` is unknown to the engine")]
    NotFound { execution_id: String },
    #[error("engine request failed: {0}")]
    Unavailable(String),
    #[error("failed to decode engine response from {endpoint}: {source}")]
    Malformed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("engine rejected the confirmation: {0}")]
    Invalid(String),
}

impl EngineError {
    /// Decode irregularities in list responses are recovered locally by
    /// normalizing to an empty sequence; everything else surfaces to the
    /// operator.
    pub fn is_operator_visible(&self) -> bool {
        !matches!(self, Self::Malformed { .. })
    }
}
