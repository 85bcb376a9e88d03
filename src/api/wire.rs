//! Request and response bodies of the project service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::snapshot::{ChatTurn, ProjectSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateResponse {
    pub project_session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub project_session_id: String,
    pub message: ChatTurn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub project_session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    pub project_session_id: String,
    pub version_to_audit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectList {
    #[serde(default)]
    pub projects: Vec<ProjectSummary>,
}

/// Error body of a non-2xx response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// Extract `detail` from an error response body, if it has one.
    ///
    /// String details are returned as-is; structured ones (validation error
    /// lists) are rendered as JSON.
    pub fn detail_from(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        match parsed.detail? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}
