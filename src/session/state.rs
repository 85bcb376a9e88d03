//! Client-held session state.

use super::brief::BriefSubmission;
use super::snapshot::AuditReport;
use super::stage::Stage;
use crate::error::InputError;

/// The single one-shot mutating call waiting for the next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Initiate(BriefSubmission),
    Chat(String),
    Analyze,
    Audit { version: u32 },
}

impl PendingAction {
    /// Stage to show while this call is in flight.
    pub fn in_flight_stage(&self, current: Stage) -> Stage {
        match self {
            Self::Analyze => Stage::AnalysisInProgress,
            Self::Audit { .. } => Stage::AuditInProgress,
            Self::Initiate(_) | Self::Chat(_) => current,
        }
    }

    /// Text for the indeterminate progress indicator.
    pub fn busy_label(&self) -> String {
        match self {
            Self::Initiate(submission) if !submission.attachments.is_empty() => format!(
                "Uploading {} file(s) and preparing the interview...",
                submission.attachments.len()
            ),
            Self::Initiate(_) => "Preparing the interview...".to_string(),
            Self::Chat(_) => "Waiting for a reply...".to_string(),
            Self::Analyze => {
                "Analysts are working on the financial analysis. This may take a few minutes..."
                    .to_string()
            }
            Self::Audit { version } => format!("Auditing analysis version {version}..."),
        }
    }
}

/// Result of the last audit, shown on top of the analysis view.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOverlay {
    pub version: u32,
    pub outcome: Result<AuditReport, String>,
}

/// Everything the client keeps between cycles.
///
/// Created once with typed defaults and recreated wholesale by
/// [`SessionState::reset`]; only `user_id` survives a reset.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub user_id: String,
    pub project_session_id: Option<String>,
    pub stage: Stage,
    pub selected_version: Option<u32>,
    pending: Option<PendingAction>,
    last_error: Option<String>,
    pub audit_overlay: Option<AuditOverlay>,
    /// Message of the last failed analyze call, until analysis is retried
    /// or the service reports a result.
    pub analysis_failure: Option<String>,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_session_id: None,
            stage: Stage::Form,
            selected_version: None,
            pending: None,
            last_error: None,
            audit_overlay: None,
            analysis_failure: None,
        }
    }

    /// Fresh state for a new project, keeping the user's identity.
    pub fn reset(&self) -> Self {
        Self::new(self.user_id.clone())
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Queue a mutating call. Only one may be outstanding at a time.
    pub fn set_pending(&mut self, action: PendingAction) -> Result<(), InputError> {
        if self.pending.is_some() {
            return Err(InputError::ActionPending);
        }
        self.pending = Some(action);
        Ok(())
    }

    /// Consume the pending call. Returns `None` on every later call.
    pub fn take_pending(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Surface the error once: returns it and clears it.
    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// The project id, which every stage but `Form` requires.
    pub fn require_project(&self) -> Result<&str, InputError> {
        self.project_session_id
            .as_deref()
            .ok_or(InputError::NoProject)
    }
}
