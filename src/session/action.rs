//! User actions the render surface hands to the controller.

use super::brief::BriefForm;
use super::stage::Stage;

/// What the user did since the last cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Submit the brief form (Form stage).
    SubmitBrief(BriefForm),
    /// A chat turn: interview answer or boardroom what-if question.
    SendChat(String),
    /// Discard the interview so far and start it again.
    RestartInterview,
    /// Proceed from the compiled brief to analysis, or retry a failed one.
    ProceedToAnalysis,
    SelectVersion(u32),
    /// Audit the selected analysis version.
    RequestAudit,
    DismissAudit,
    /// Open an existing project from the project list.
    OpenProject(String),
    /// Re-read the project (or project list) without changing anything.
    Refresh,
    StartNewProject,
}

impl UserAction {
    /// Short name used in messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitBrief(_) => "Submitting a brief",
            Self::SendChat(_) => "Chatting",
            Self::RestartInterview => "Restarting the interview",
            Self::ProceedToAnalysis => "Analysis",
            Self::SelectVersion(_) => "Selecting a version",
            Self::RequestAudit => "Audit",
            Self::DismissAudit => "Closing the audit",
            Self::OpenProject(_) => "Opening a project",
            Self::Refresh => "Refresh",
            Self::StartNewProject => "Starting a new project",
        }
    }

    /// The stage a queued call for this action moves the session to.
    ///
    /// `None` for actions that only change local state.
    pub fn target_stage(&self, current: Stage) -> Option<Stage> {
        match self {
            Self::SubmitBrief(_) | Self::RestartInterview => Some(Stage::InterviewInProgress),
            Self::SendChat(_) => Some(current),
            Self::ProceedToAnalysis => Some(Stage::AnalysisInProgress),
            Self::RequestAudit => Some(Stage::AuditInProgress),
            Self::SelectVersion(_)
            | Self::DismissAudit
            | Self::OpenProject(_)
            | Self::Refresh
            | Self::StartNewProject => None,
        }
    }
}
