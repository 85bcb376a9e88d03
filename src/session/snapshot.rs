//! Server-owned project data as fetched by the client.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::analysis::AnalysisResult;
use super::stage::Stage;

/// Chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of the interview or boardroom transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Project attributes the interviewer extracted from the conversation.
///
/// The interviewer's field names vary between prompts, so each field also
/// accepts its long name. When both are sent the short name wins and the
/// other is kept in `other`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>")]
pub struct CompiledBrief {
    pub goal: Option<String>,
    pub location: Option<String>,
    pub budget: Option<String>,
    pub currency: Option<String>,
    pub timeline: Option<String>,
    /// Everything else the interviewer compiled.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl From<BTreeMap<String, Value>> for CompiledBrief {
    fn from(mut fields: BTreeMap<String, Value>) -> Self {
        Self {
            goal: take_text(&mut fields, "goal", Some("project_goal")),
            location: take_text(&mut fields, "location", Some("project_location_details")),
            budget: take_text(&mut fields, "budget", Some("budget_range_pkr")),
            currency: take_text(&mut fields, "currency", None),
            timeline: take_text(&mut fields, "timeline", None),
            other: fields,
        }
    }
}

/// One immutable, numbered analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisVersion {
    pub version: u32,
    #[serde(default)]
    pub summary: String,
    pub result: AnalysisResult,
}

/// Full state of one project, owned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub status: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub interview_history: Vec<ChatTurn>,
    #[serde(default)]
    pub compiled_brief: Option<CompiledBrief>,
    #[serde(default)]
    pub analysis_results: Vec<AnalysisVersion>,
    #[serde(default)]
    pub active_analysis_version: Option<u32>,
    #[serde(default)]
    pub post_analysis_history: Vec<ChatTurn>,
}

impl ProjectSnapshot {
    /// Check that versions run 1, 2, 3, ... without gaps or repeats.
    pub fn validate(&self) -> Result<(), String> {
        for (index, entry) in self.analysis_results.iter().enumerate() {
            let expected = index as u32 + 1;
            if entry.version != expected {
                return Err(format!(
                    "analysis version at position {index} is {}, expected {expected}",
                    entry.version
                ));
            }
        }
        Ok(())
    }

    /// The stage the server status puts this project in.
    ///
    /// Unknown statuses are inferred from what the snapshot contains.
    pub fn stage(&self) -> Stage {
        if let Some(stage) = Stage::from_server_status(&self.status) {
            return stage;
        }
        tracing::warn!(status = %self.status, "Unknown project status; inferring stage");
        if !self.analysis_results.is_empty() {
            Stage::AnalysisComplete
        } else if self.compiled_brief.is_some() {
            Stage::InterviewComplete
        } else {
            Stage::InterviewInProgress
        }
    }

    pub fn version(&self, version: u32) -> Option<&AnalysisVersion> {
        self.analysis_results.iter().find(|v| v.version == version)
    }

    pub fn latest_version(&self) -> Option<u32> {
        self.analysis_results.last().map(|v| v.version)
    }

    /// The server's default version, falling back to the latest one.
    pub fn default_version(&self) -> Option<u32> {
        self.active_analysis_version
            .filter(|v| self.version(*v).is_some())
            .or_else(|| self.latest_version())
    }
}

/// Audit of one analysis version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    #[serde(default)]
    pub project_name_audited: Option<String>,
    #[serde(default)]
    pub audit_timestamp: Option<String>,
    #[serde(default)]
    pub overall_audit_summary: Option<String>,
    #[serde(default)]
    pub log_review_summary: Option<String>,
    #[serde(default)]
    pub data_consistency_summary: Option<String>,
    #[serde(default)]
    pub compliance_status_summary: Option<String>,
    #[serde(default)]
    pub key_recommendations_or_concerns: Vec<String>,
    #[serde(default)]
    pub auditor_processing_log_snippet: Option<Value>,
}

impl AuditReport {
    /// When the audit ran. Timestamps without an offset are taken as UTC.
    pub fn audited_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.audit_timestamp.as_deref()?.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// The auditor's own log, one line per entry.
    pub fn auditor_log_lines(&self) -> Vec<String> {
        match &self.auditor_processing_log_snippet {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|e| match e {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            Some(other) => vec![other.to_string()],
        }
    }
}

/// Entry of the project list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_session_id: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub status: String,
}

/// Remove `key`, or failing that `alias`, as free text. Numbers and other
/// JSON values are kept as their JSON text; null counts as absent.
fn take_text(
    fields: &mut BTreeMap<String, Value>,
    key: &str,
    alias: Option<&str>,
) -> Option<String> {
    if let Some(text) = fields.remove(key).and_then(text_value) {
        return Some(text);
    }
    fields.remove(alias?).and_then(text_value)
}

fn text_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
