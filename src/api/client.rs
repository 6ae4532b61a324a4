use super::error::EngineError;
use super::types::{
    CheckpointSummary, ConfirmOutcome, Decision, ExecuteRequest, ExecutionId, ExecutionSnapshot,
    ExecutionSummary, HealthStatus,
};
use serde::Deserialize;
use serde_json::json;

/// Error body served by the engine alongside non-2xx statuses.
#[derive(Debug, Deserialize, Default)]
struct EngineErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Blocking HTTP accessor for the remote engine. One instance per dashboard
/// session; carries no mutable state.
#[derive(Debug, Clone)]
pub struct EngineClient {
    api_base: String,
}

impl EngineClient {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn read_error_body(response: ureq::Response) -> String {
        let fallback = format!("http status {}", response.status());
        let Ok(raw) = response.into_string() else {
            return fallback;
        };
        match serde_json::from_str::<EngineErrorBody>(&raw) {
            Ok(body) if !body.error.is_empty() => match body.details {
                Some(details) if !details.is_empty() => format!("{}: {details}", body.error),
                _ => body.error,
            },
            _ => fallback,
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(
        endpoint: &str,
        response: ureq::Response,
    ) -> Result<T, EngineError> {
        let raw = response
            .into_string()
            .map_err(|err| EngineError::Unavailable(err.to_string()))?;
        serde_json::from_str(&raw).map_err(|source| EngineError::Malformed {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        not_found_id: Option<&ExecutionId>,
    ) -> Result<T, EngineError> {
        let url = self.endpoint(path);
        match ureq::get(&url).call() {
            Ok(response) => Self::decode(path, response),
            Err(ureq::Error::Status(404, _)) => {
                if let Some(id) = not_found_id {
                    Err(EngineError::NotFound {
                        execution_id: id.to_string(),
                    })
                } else {
                    Err(EngineError::Unavailable("http status 404".to_string()))
                }
            }
            Err(ureq::Error::Status(_, response)) => {
                Err(EngineError::Unavailable(Self::read_error_body(response)))
            }
            Err(err) => Err(EngineError::Unavailable(err.to_string())),
        }
    }

    fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
        rejects_as_invalid: bool,
    ) -> Result<T, EngineError> {
        let url = self.endpoint(path);
        match ureq::post(&url).send_json(body) {
            Ok(response) => Self::decode(path, response),
            Err(ureq::Error::Status(code, response)) if rejects_as_invalid && code < 500 => {
                Err(EngineError::Invalid(Self::read_error_body(response)))
            }
            Err(ureq::Error::Status(_, response)) => {
                Err(EngineError::Unavailable(Self::read_error_body(response)))
            }
            Err(err) => Err(EngineError::Unavailable(err.to_string())),
        }
    }

    /// Normalizes any decoding irregularity to an empty sequence. Transport
    /// failures still surface as `Unavailable`.
    fn get_list<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<Vec<T>, EngineError> {
        let value: serde_json::Value = match self.get_json(path, None) {
            Ok(value) => value,
            Err(EngineError::Malformed { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        if !value.is_array() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    pub fn fetch_snapshot(&self, id: &ExecutionId) -> Result<ExecutionSnapshot, EngineError> {
        let path = format!("state/{}", urlencoding::encode(id.as_str()));
        self.get_json(&path, Some(id))
    }

    pub fn fetch_roster(&self) -> Result<Vec<ExecutionSummary>, EngineError> {
        self.get_list("executions")
    }

    pub fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionSummary, EngineError> {
        self.post_json(
            "execute",
            json!({ "name": request.name, "location": request.location }),
            false,
        )
    }

    pub fn resume(&self, id: &ExecutionId) -> Result<ExecutionSummary, EngineError> {
        let path = format!("execute/{}/resume", urlencoding::encode(id.as_str()));
        self.post_json(&path, json!({}), false)
    }

    /// Submits one human decision for the execution's pending tool call. The
    /// caller is responsible for invoking this at most once per pending
    /// decision; the coordinator enforces that.
    pub fn confirm(
        &self,
        id: &ExecutionId,
        decision: &Decision,
    ) -> Result<ConfirmOutcome, EngineError> {
        let mut body = json!({
            "execution_id": id.as_str(),
            "action": decision.action(),
        });
        if let Some(new_args) = decision.new_args() {
            body["new_args"] = json!(new_args);
        }
        self.post_json("confirm", body, true)
    }

    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointSummary>, EngineError> {
        self.get_list("checkpoints")
    }

    pub fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<(), EngineError> {
        let path = format!("checkpoints/{}", urlencoding::encode(checkpoint_id));
        let url = self.endpoint(&path);
        match ureq::delete(&url).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(_, response)) => {
                Err(EngineError::Unavailable(Self::read_error_body(response)))
            }
            Err(err) => Err(EngineError::Unavailable(err.to_string())),
        }
    }

    pub fn health(&self) -> Result<HealthStatus, EngineError> {
        self.get_json("health", None)
    }
}
