//! Remote project service: the interview, analysis and audit backend.
//!
//! The controller only talks to the service through the [`ProjectService`]
//! trait; [`HttpProjectService`] is the reqwest implementation.

pub mod http;
pub mod wire;

pub use http::HttpProjectService;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::session::brief::BriefSubmission;
use crate::session::snapshot::{AuditReport, ProjectSnapshot, ProjectSummary};

/// Chat message that makes the service discard the interview so far.
pub const RESTART_INTERVIEW_COMMAND: &str = "/restart_interview";

/// Calls offered by the project service.
///
/// Every call is scoped by `user_id`, which the service trusts as identity.
/// `get_session` and `list_projects` are idempotent reads; the others mutate
/// server state and must be issued at most once per user action.
#[async_trait]
pub trait ProjectService: Send + Sync {
    /// Create a project from the brief and its files in one call. Returns the
    /// new project session id.
    async fn initiate(
        &self,
        user_id: &str,
        submission: &BriefSubmission,
    ) -> Result<String, ApiError>;

    /// Send one user chat turn (interview or boardroom).
    async fn chat(&self, user_id: &str, project_id: &str, content: &str) -> Result<(), ApiError>;

    /// Run the financial analysis. Blocks until the service has finished.
    async fn analyze(&self, user_id: &str, project_id: &str) -> Result<(), ApiError>;

    /// Fetch the full project snapshot.
    async fn get_session(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<ProjectSnapshot, ApiError>;

    /// List the user's projects.
    async fn list_projects(&self, user_id: &str) -> Result<Vec<ProjectSummary>, ApiError>;

    /// Audit one analysis version; the service looks the version up itself.
    async fn audit(
        &self,
        user_id: &str,
        project_id: &str,
        version: u32,
    ) -> Result<AuditReport, ApiError>;
}
