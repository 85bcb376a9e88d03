//! Session stage state machine — which screen the project is on.

use serde::{Deserialize, Serialize};

/// The stages of a project session.
///
/// Mostly linear: Form → InterviewInProgress → InterviewComplete →
/// AnalysisInProgress → AnalysisComplete → AuditInProgress → AuditComplete,
/// with AnalysisFailed as the retryable side branch and Form reachable from
/// everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Form,
    InterviewInProgress,
    InterviewComplete,
    AnalysisInProgress,
    AnalysisComplete,
    AnalysisFailed,
    AuditInProgress,
    AuditComplete,
}

impl Stage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, target),
            // Start new project always wins
            (_, Form)
                | (Form, InterviewInProgress)
                // Chat turns and /restart_interview
                | (InterviewInProgress, InterviewInProgress)
                | (InterviewInProgress, InterviewComplete)
                | (InterviewComplete, InterviewInProgress)
                | (InterviewComplete, AnalysisInProgress)
                | (AnalysisInProgress, AnalysisComplete)
                | (AnalysisInProgress, AnalysisFailed)
                | (AnalysisFailed, AnalysisInProgress)
                // Boardroom what-if turns
                | (AnalysisComplete, AnalysisComplete)
                | (AnalysisComplete, AuditInProgress)
                | (AuditInProgress, AuditComplete)
                | (AuditInProgress, AnalysisComplete)
                | (AuditComplete, AuditComplete)
                | (AuditComplete, AnalysisComplete)
                | (AuditComplete, AuditInProgress)
        )
    }

    /// Map the server-side status string onto a stage.
    pub fn from_server_status(status: &str) -> Option<Stage> {
        match status.trim().to_ascii_lowercase().as_str() {
            "interview_in_progress" | "interview_active" | "interview" => {
                Some(Self::InterviewInProgress)
            }
            "interview_complete" | "brief_ready" => Some(Self::InterviewComplete),
            "analysis_in_progress" => Some(Self::AnalysisInProgress),
            "analysis_complete" => Some(Self::AnalysisComplete),
            "analysis_failed" => Some(Self::AnalysisFailed),
            "audit_in_progress" => Some(Self::AuditInProgress),
            "audit_complete" => Some(Self::AuditComplete),
            _ => None,
        }
    }

    /// Whether the user can type chat turns: an open project whose stage
    /// a chat turn keeps.
    pub fn accepts_chat(&self) -> bool {
        *self != Self::Form && self.can_transition_to(*self)
    }

    /// Whether at least one analysis version is expected to be on display.
    pub fn shows_results(&self) -> bool {
        matches!(self, Self::AnalysisComplete | Self::AuditComplete)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Form
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Form => "form",
            Self::InterviewInProgress => "interview_in_progress",
            Self::InterviewComplete => "interview_complete",
            Self::AnalysisInProgress => "analysis_in_progress",
            Self::AnalysisComplete => "analysis_complete",
            Self::AnalysisFailed => "analysis_failed",
            Self::AuditInProgress => "audit_in_progress",
            Self::AuditComplete => "audit_complete",
        };
        write!(f, "{s}")
    }
}
