//! Session controller. Decides what to show and which remote call to make.
//!
//! One cycle at a time: [`SessionController::handle`] validates a user action
//! and queues at most one mutating call, [`SessionController::cycle`] issues
//! it, re-reads the authoritative snapshot and derives the next [`View`].

use std::sync::Arc;

use crate::api::{ProjectService, RESTART_INTERVIEW_COMMAND};
use crate::error::InputError;

use super::action::UserAction;
use super::brief::BriefSubmission;
use super::snapshot::{ProjectSnapshot, ProjectSummary};
use super::stage::Stage;
use super::state::{AuditOverlay, PendingAction, SessionState};
use super::view::View;

/// Pick the version an audit would run on, or explain why there is none.
///
/// Uses `selected` when the snapshot still has it, else the server default.
/// A version whose result carries an error marker can't be audited.
pub fn auditable_version(
    snapshot: Option<&ProjectSnapshot>,
    selected: Option<u32>,
) -> Result<u32, InputError> {
    let snap = snapshot
        .filter(|s| !s.analysis_results.is_empty())
        .ok_or_else(|| InputError::AuditUnavailable("there are no analysis results yet".into()))?;
    let version = selected
        .filter(|v| snap.version(*v).is_some())
        .or_else(|| snap.default_version())
        .ok_or_else(|| InputError::AuditUnavailable("no analysis version is selected".into()))?;
    let entry = snap
        .version(version)
        .ok_or(InputError::UnknownVersion(version))?;
    if entry.result.has_error_marker() {
        return Err(InputError::AuditUnavailable(format!(
            "analysis version {version} did not complete successfully"
        )));
    }
    Ok(version)
}

/// The session view controller.
pub struct SessionController {
    service: Arc<dyn ProjectService>,
    state: SessionState,
    /// Last snapshot of the open project, valid until the next fetch.
    snapshot: Option<ProjectSnapshot>,
    projects: Vec<ProjectSummary>,
}

impl SessionController {
    pub fn new(service: Arc<dyn ProjectService>, user_id: impl Into<String>) -> Self {
        Self {
            service,
            state: SessionState::new(user_id),
            snapshot: None,
            projects: Vec::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> Option<&ProjectSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn projects(&self) -> &[ProjectSummary] {
        &self.projects
    }

    /// The version on display: the user's pick, else the server default.
    pub fn selected_version(&self) -> Option<u32> {
        let snap = self.snapshot.as_ref()?;
        self.state
            .selected_version
            .filter(|v| snap.version(*v).is_some())
            .or_else(|| snap.default_version())
    }

    /// Start a new project: forget everything but the user id.
    pub fn reset(&mut self) {
        tracing::info!(
            project_id = self.state.project_session_id.as_deref().unwrap_or(""),
            "Starting a new project"
        );
        self.state = self.state.reset();
        self.snapshot = None;
    }

    /// Validate a user action and fold it into state.
    ///
    /// Never touches the network. Mutating calls are only queued; the next
    /// [`cycle`](Self::cycle) issues them. Rejections are also recorded as
    /// the error of the next view.
    pub async fn handle(&mut self, action: UserAction) -> Result<(), InputError> {
        let name = action.name();
        let result = self.apply(action).await;
        if let Err(e) = &result {
            tracing::debug!(action = name, error = %e, "Action rejected");
            self.state.set_error(e.to_string());
        }
        result
    }

    /// Reject a mutating action unless the transition table allows the
    /// stage it leads to. Only a brief starts from the form.
    fn guard(&self, action: &UserAction) -> Result<(), InputError> {
        let stage = self.state.stage;
        let Some(target) = action.target_stage(stage) else {
            return Ok(());
        };
        let starts_project = matches!(action, UserAction::SubmitBrief(_));
        if (stage == Stage::Form) != starts_project || !stage.can_transition_to(target) {
            return Err(InputError::NotAllowed {
                action: action.name().to_string(),
                stage,
            });
        }
        Ok(())
    }

    async fn apply(&mut self, action: UserAction) -> Result<(), InputError> {
        self.guard(&action)?;

        match action {
            UserAction::StartNewProject => {
                self.reset();
                Ok(())
            }
            UserAction::Refresh => Ok(()),
            UserAction::DismissAudit => {
                self.state.audit_overlay = None;
                Ok(())
            }
            UserAction::OpenProject(id) => {
                let id = id.trim().to_string();
                if id.is_empty() {
                    return Err(InputError::NoProject);
                }
                if self.state.pending().is_some() {
                    return Err(InputError::ActionPending);
                }
                self.reset();
                tracing::info!(project_id = %id, "Opening project");
                self.state.project_session_id = Some(id);
                Ok(())
            }
            UserAction::SubmitBrief(form) => {
                let submission = BriefSubmission::prepare(&form).await?;
                self.state.set_pending(PendingAction::Initiate(submission))
            }
            UserAction::SendChat(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(InputError::EmptyMessage);
                }
                self.state.require_project()?;
                self.state.set_pending(PendingAction::Chat(text.to_string()))
            }
            UserAction::RestartInterview => {
                self.state.require_project()?;
                self.state.set_pending(PendingAction::Chat(
                    RESTART_INTERVIEW_COMMAND.to_string(),
                ))
            }
            UserAction::ProceedToAnalysis => {
                self.state.require_project()?;
                self.state.set_pending(PendingAction::Analyze)
            }
            UserAction::SelectVersion(version) => {
                let exists = self
                    .snapshot
                    .as_ref()
                    .is_some_and(|s| s.version(version).is_some());
                if !exists {
                    return Err(InputError::UnknownVersion(version));
                }
                if self.selected_version() != Some(version) {
                    self.state.audit_overlay = None;
                }
                self.state.selected_version = Some(version);
                Ok(())
            }
            UserAction::RequestAudit => {
                self.state.require_project()?;
                let version =
                    auditable_version(self.snapshot.as_ref(), self.state.selected_version)?;
                self.state.set_pending(PendingAction::Audit { version })
            }
        }
    }

    /// The view to show while the queued call is in flight, if any.
    pub fn busy_view(&self) -> Option<View> {
        let pending = self.state.pending()?;
        Some(View::working(
            &self.state,
            pending.in_flight_stage(self.state.stage),
            pending.busy_label(),
        ))
    }

    /// Run one cycle: issue the queued call, re-read, derive the view.
    pub async fn cycle(&mut self) -> View {
        if let Some(action) = self.state.take_pending() {
            self.execute(action).await;
        }
        self.refresh().await;
        self.derive_stage();
        self.clamp_selection();

        let error = self.state.take_error();
        View::build(&self.state, self.snapshot.as_ref(), &self.projects, error)
    }

    /// Issue exactly one mutating call and fold its outcome into state.
    async fn execute(&mut self, action: PendingAction) {
        self.state.stage = action.in_flight_stage(self.state.stage);
        let user_id = self.state.user_id.clone();

        match action {
            PendingAction::Initiate(submission) => {
                match self.service.initiate(&user_id, &submission).await {
                    Ok(project_id) => {
                        self.snapshot = None;
                        self.state.project_session_id = Some(project_id);
                        self.state.stage = Stage::InterviewInProgress;
                    }
                    Err(e) => {
                        tracing::warn!(call = %e.call(), error = %e, "Could not start project");
                        self.state.set_error(e.user_message());
                    }
                }
            }
            PendingAction::Chat(text) => {
                let Some(project_id) = self.state.project_session_id.clone() else {
                    self.state.set_error(InputError::NoProject.to_string());
                    return;
                };
                if let Err(e) = self.service.chat(&user_id, &project_id, &text).await {
                    tracing::warn!(project_id = %project_id, call = %e.call(), error = %e, "Chat turn failed");
                    self.state.set_error(e.user_message());
                }
            }
            PendingAction::Analyze => {
                let Some(project_id) = self.state.project_session_id.clone() else {
                    self.state.set_error(InputError::NoProject.to_string());
                    return;
                };
                let before = self
                    .snapshot
                    .as_ref()
                    .map(|s| s.analysis_results.len())
                    .unwrap_or(0);
                self.state.analysis_failure = None;
                match self.service.analyze(&user_id, &project_id).await {
                    Ok(()) => {
                        tracing::info!(project_id = %project_id, versions_before = before, "Analysis finished");
                        self.state.selected_version = None;
                    }
                    Err(e) => {
                        let message = e.user_message();
                        tracing::warn!(project_id = %project_id, call = %e.call(), error = %e, "Analysis failed");
                        self.state.analysis_failure = Some(message.clone());
                        self.state.set_error(message);
                    }
                }
            }
            PendingAction::Audit { version } => {
                let Some(project_id) = self.state.project_session_id.clone() else {
                    self.state.set_error(InputError::NoProject.to_string());
                    return;
                };
                let outcome = self
                    .service
                    .audit(&user_id, &project_id, version)
                    .await
                    .map_err(|e| {
                        tracing::warn!(project_id = %project_id, version, call = %e.call(), error = %e, "Audit failed");
                        e.user_message()
                    });
                self.state.audit_overlay = Some(AuditOverlay { version, outcome });
            }
        }
    }

    /// Idempotent reads: the open project, or the project list on the form.
    async fn refresh(&mut self) {
        let user_id = self.state.user_id.clone();
        let Some(project_id) = self.state.project_session_id.clone() else {
            self.refresh_projects().await;
            return;
        };

        match self.service.get_session(&user_id, &project_id).await {
            Ok(fresh) => {
                let merged = self.merge_snapshot(fresh);
                self.snapshot = Some(merged);
            }
            Err(e) => {
                tracing::warn!(project_id = %project_id, call = %e.call(), error = %e, "Could not refresh project");
                if self.state.last_error().is_none() {
                    self.state.set_error(e.user_message());
                }
                // A project opened from the form that never loaded.
                if self.snapshot.is_none() && self.state.stage == Stage::Form {
                    self.state.project_session_id = None;
                    self.refresh_projects().await;
                }
            }
        }
    }

    /// Re-read the user's project list.
    pub async fn refresh_projects(&mut self) {
        match self.service.list_projects(&self.state.user_id).await {
            Ok(projects) => self.projects = projects,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list projects");
                if self.state.last_error().is_none() {
                    self.state.set_error(e.user_message());
                }
            }
        }
    }

    /// Keep versions the client has already seen exactly as first seen.
    fn merge_snapshot(&self, mut fresh: ProjectSnapshot) -> ProjectSnapshot {
        let Some(cached) = &self.snapshot else {
            return fresh;
        };
        for seen in &cached.analysis_results {
            match fresh
                .analysis_results
                .iter_mut()
                .find(|v| v.version == seen.version)
            {
                Some(entry) if entry.result != seen.result => {
                    tracing::warn!(
                        version = seen.version,
                        "Service changed an existing analysis version; keeping the original"
                    );
                    entry.result = seen.result.clone();
                }
                Some(_) => {}
                None => {
                    tracing::warn!(version = seen.version, "Analysis version disappeared");
                }
            }
        }
        fresh
    }

    fn derive_stage(&mut self) {
        let previous = self.state.stage;
        let derived = match (&self.state.project_session_id, &self.snapshot) {
            (None, _) => Stage::Form,
            // Not loaded yet; keep what the last call established.
            (Some(_), None) => previous,
            (Some(_), Some(snap)) => {
                let server = snap.stage();
                if self.state.analysis_failure.is_some() {
                    if server.shows_results() {
                        self.state.analysis_failure = None;
                        server
                    } else {
                        Stage::AnalysisFailed
                    }
                } else {
                    server
                }
            }
        };

        if derived != previous {
            if previous != Stage::Form && !previous.can_transition_to(derived) {
                tracing::warn!(from = %previous, to = %derived, "Unexpected stage change");
            } else {
                tracing::debug!(from = %previous, to = %derived, "Stage changed");
            }
        }
        self.state.stage = derived;
    }

    fn clamp_selection(&mut self) {
        let (Some(snap), Some(selected)) = (&self.snapshot, self.state.selected_version) else {
            return;
        };
        if snap.version(selected).is_none() {
            let fallback = snap.default_version();
            tracing::warn!(selected, fallback = ?fallback, "Selected version missing; falling back");
            self.state.selected_version = fallback;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::error::{ApiCall, ApiError};
    use crate::session::brief::BriefForm;
    use crate::session::snapshot::{AnalysisVersion, AuditReport, ChatTurn};
    use crate::session::view::{AuditCard, ViewBody};

    /// How a scripted call should fail.
    #[derive(Debug, Clone)]
    pub(crate) enum Failure {
        Timeout,
        Server { status: u16, detail: Option<String> },
    }

    impl Failure {
        fn into_error(self, call: ApiCall) -> ApiError {
            match self {
                Self::Timeout => ApiError::Transport {
                    call,
                    reason: "timed out: operation timed out".into(),
                },
                Self::Server { status, detail } => ApiError::Server {
                    call,
                    status,
                    detail,
                },
            }
        }
    }

    #[derive(Default)]
    pub(crate) struct Backend {
        pub projects: HashMap<String, ProjectSnapshot>,
        pub calls: Vec<String>,
        pub fail: HashMap<String, Failure>,
        next_id: u32,
    }

    /// In-memory project service that behaves like the real one.
    #[derive(Default)]
    pub(crate) struct ScriptedService {
        pub backend: Mutex<Backend>,
    }

    impl ScriptedService {
        pub(crate) fn fail_next(&self, call: ApiCall, failure: Failure) {
            self.backend
                .lock()
                .unwrap()
                .fail
                .insert(call.to_string(), failure);
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.backend.lock().unwrap().calls.clone()
        }

        pub(crate) fn count(&self, call: ApiCall) -> usize {
            let name = call.to_string();
            self.calls().iter().filter(|c| **c == name).count()
        }

        pub(crate) fn set_status(&self, project_id: &str, status: &str) {
            self.backend
                .lock()
                .unwrap()
                .projects
                .get_mut(project_id)
                .unwrap()
                .status = status.to_string();
        }

        fn enter(&self, call: ApiCall) -> Result<std::sync::MutexGuard<'_, Backend>, ApiError> {
            let mut backend = self.backend.lock().unwrap();
            backend.calls.push(call.to_string());
            match backend.fail.remove(&call.to_string()) {
                Some(failure) => Err(failure.into_error(call)),
                None => Ok(backend),
            }
        }
    }

    fn not_found(call: ApiCall) -> ApiError {
        ApiError::Server {
            call,
            status: 404,
            detail: Some("Project not found".into()),
        }
    }

    #[async_trait]
    impl ProjectService for ScriptedService {
        async fn initiate(
            &self,
            _user_id: &str,
            submission: &BriefSubmission,
        ) -> Result<String, ApiError> {
            let mut backend = self.enter(ApiCall::Initiate)?;
            backend.next_id += 1;
            let id = format!("proj-{}", backend.next_id);
            let snapshot: ProjectSnapshot = serde_json::from_value(json!({
                "status": "interview_in_progress",
                "project_name": submission.brief.project_idea_summary,
                "interview_history": [
                    {"role": "assistant", "content": "Welcome! What is the goal of the project?"}
                ]
            }))
            .unwrap();
            backend.projects.insert(id.clone(), snapshot);
            Ok(id)
        }

        async fn chat(
            &self,
            _user_id: &str,
            project_id: &str,
            content: &str,
        ) -> Result<(), ApiError> {
            let mut backend = self.enter(ApiCall::Chat)?;
            let snap = backend
                .projects
                .get_mut(project_id)
                .ok_or_else(|| not_found(ApiCall::Chat))?;
            if content == RESTART_INTERVIEW_COMMAND {
                snap.interview_history = vec![ChatTurn::assistant("Let's start over.")];
                snap.compiled_brief = None;
                snap.status = "interview_in_progress".into();
                return Ok(());
            }
            if snap.status == "analysis_complete" {
                snap.post_analysis_history.push(ChatTurn::user(content));
                snap.post_analysis_history
                    .push(ChatTurn::assistant("Running the numbers again."));
                let next = snap.analysis_results.len() as u32 + 1;
                snap.analysis_results.push(AnalysisVersion {
                    version: next,
                    summary: content.to_string(),
                    result: json!({"calculated_revenue": 900 + next}).into(),
                });
                snap.active_analysis_version = Some(next);
                return Ok(());
            }
            snap.interview_history.push(ChatTurn::user(content));
            if content == "that's everything" {
                snap.interview_history
                    .push(ChatTurn::assistant("Thanks, the brief is ready."));
                snap.compiled_brief = Some(
                    serde_json::from_value(json!({"goal": "Open a cafe", "currency": "USD"}))
                        .unwrap(),
                );
                snap.status = "interview_complete".into();
            } else {
                snap.interview_history
                    .push(ChatTurn::assistant("Tell me more."));
            }
            Ok(())
        }

        async fn analyze(&self, _user_id: &str, project_id: &str) -> Result<(), ApiError> {
            let mut backend = self.enter(ApiCall::Analyze)?;
            let snap = backend
                .projects
                .get_mut(project_id)
                .ok_or_else(|| not_found(ApiCall::Analyze))?;
            let next = snap.analysis_results.len() as u32 + 1;
            snap.analysis_results.push(AnalysisVersion {
                version: next,
                summary: "Initial analysis".into(),
                result: json!({
                    "project_name": "Cafe",
                    "calculated_revenue": 1000,
                    "calculated_cost": 600,
                    "calculated_profit_loss": 400,
                    "summary_text": "Viable."
                })
                .into(),
            });
            snap.active_analysis_version = Some(next);
            snap.status = "analysis_complete".into();
            Ok(())
        }

        async fn get_session(
            &self,
            _user_id: &str,
            project_id: &str,
        ) -> Result<ProjectSnapshot, ApiError> {
            let backend = self.enter(ApiCall::GetSession)?;
            backend
                .projects
                .get(project_id)
                .cloned()
                .ok_or_else(|| not_found(ApiCall::GetSession))
        }

        async fn list_projects(&self, _user_id: &str) -> Result<Vec<ProjectSummary>, ApiError> {
            let backend = self.enter(ApiCall::ListProjects)?;
            let mut list: Vec<ProjectSummary> = backend
                .projects
                .iter()
                .map(|(id, snap)| ProjectSummary {
                    project_session_id: id.clone(),
                    project_name: snap.project_name.clone(),
                    status: snap.status.clone(),
                })
                .collect();
            list.sort_by(|a, b| a.project_session_id.cmp(&b.project_session_id));
            Ok(list)
        }

        async fn audit(
            &self,
            _user_id: &str,
            project_id: &str,
            version: u32,
        ) -> Result<AuditReport, ApiError> {
            let backend = self.enter(ApiCall::Audit)?;
            backend
                .projects
                .get(project_id)
                .and_then(|s| s.version(version))
                .ok_or_else(|| not_found(ApiCall::Audit))?;
            Ok(AuditReport {
                project_name_audited: Some("Cafe".into()),
                overall_audit_summary: Some(format!("Version {version} is consistent.")),
                ..Default::default()
            })
        }
    }

    fn controller() -> (Arc<ScriptedService>, SessionController) {
        let service = Arc::new(ScriptedService::default());
        let controller = SessionController::new(service.clone(), "user-42");
        (service, controller)
    }

    fn brief(summary: &str) -> UserAction {
        UserAction::SubmitBrief(BriefForm {
            summary: summary.into(),
            ..Default::default()
        })
    }

    async fn run(controller: &mut SessionController, action: UserAction) -> View {
        controller.handle(action).await.unwrap();
        controller.cycle().await
    }

    /// Drive a fresh controller to InterviewComplete.
    async fn interviewed() -> (Arc<ScriptedService>, SessionController) {
        let (service, mut c) = controller();
        run(&mut c, brief("Build a cafe")).await;
        run(&mut c, UserAction::SendChat("that's everything".into())).await;
        assert_eq!(c.state().stage, Stage::InterviewComplete);
        (service, c)
    }

    /// Drive a fresh controller to AnalysisComplete with one version.
    async fn analysed() -> (Arc<ScriptedService>, SessionController) {
        let (service, mut c) = interviewed().await;
        run(&mut c, UserAction::ProceedToAnalysis).await;
        assert_eq!(c.state().stage, Stage::AnalysisComplete);
        (service, c)
    }

    fn assert_id_invariant(c: &SessionController) {
        if c.state().stage != Stage::Form {
            assert!(
                c.state().project_session_id.is_some(),
                "stage {} without project id",
                c.state().stage
            );
        }
    }

    #[tokio::test]
    async fn blank_summary_makes_no_call() {
        let (service, mut c) = controller();
        let err = c.handle(brief("   ")).await.unwrap_err();
        assert_eq!(err, InputError::EmptySummary);
        assert!(c.state().pending().is_none());

        let view = c.cycle().await;
        assert_eq!(view.stage, Stage::Form);
        assert_eq!(view.error.as_deref(), Some("Please provide a project idea summary."));
        assert_eq!(service.count(ApiCall::Initiate), 0);
    }

    #[tokio::test]
    async fn submit_brief_starts_interview() {
        let (service, mut c) = controller();
        let view = run(&mut c, brief("Build a cafe")).await;

        assert_eq!(view.stage, Stage::InterviewInProgress);
        assert_eq!(c.state().project_session_id.as_deref(), Some("proj-1"));
        assert_eq!(service.count(ApiCall::Initiate), 1);
        match view.body {
            ViewBody::Interview { history, can_chat } => {
                assert!(can_chat);
                assert_eq!(history.len(), 1);
                assert_eq!(history[0].role, crate::session::snapshot::Role::Assistant);
            }
            other => panic!("expected interview, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_initiate_stays_on_form() {
        let (service, mut c) = controller();
        service.fail_next(
            ApiCall::Initiate,
            Failure::Server {
                status: 413,
                detail: Some("Files too large".into()),
            },
        );
        let view = run(&mut c, brief("Build a cafe")).await;
        assert_eq!(view.stage, Stage::Form);
        assert_eq!(view.error.as_deref(), Some("Files too large"));
        assert!(c.state().project_session_id.is_none());
    }

    #[tokio::test]
    async fn chat_never_appends_optimistically() {
        let (_service, mut c) = controller();
        run(&mut c, brief("Build a cafe")).await;

        c.handle(UserAction::SendChat("Forty seats".into()))
            .await
            .unwrap();
        // Nothing changes locally until the cycle re-reads the snapshot.
        assert_eq!(c.snapshot().unwrap().interview_history.len(), 1);

        let view = c.cycle().await;
        let ViewBody::Interview { history, .. } = view.body else {
            panic!("expected interview");
        };
        assert_eq!(history.len(), 3);
        assert_eq!(history[1], ChatTurn::user("Forty seats"));
    }

    #[tokio::test]
    async fn interview_history_is_append_only() {
        let (_service, mut c) = controller();
        run(&mut c, brief("Build a cafe")).await;
        let mut last = c.snapshot().unwrap().interview_history.len();
        for turn in ["Forty seats", "Suburb", "Nine months"] {
            run(&mut c, UserAction::SendChat(turn.into())).await;
            assert_eq!(c.state().stage, Stage::InterviewInProgress);
            let len = c.snapshot().unwrap().interview_history.len();
            assert!(len >= last);
            last = len;
        }
    }

    #[tokio::test]
    async fn restart_interview_goes_through_chat() {
        let (service, mut c) = interviewed().await;
        let view = run(&mut c, UserAction::RestartInterview).await;
        assert_eq!(view.stage, Stage::InterviewInProgress);
        assert!(c.snapshot().unwrap().compiled_brief.is_none());
        assert_eq!(service.count(ApiCall::Chat), 2);
    }

    #[tokio::test]
    async fn proceed_to_analysis_calls_analyze_once() {
        let (service, mut c) = interviewed().await;
        let before = c.snapshot().unwrap().analysis_results.len();

        c.handle(UserAction::ProceedToAnalysis).await.unwrap();
        let busy = c.busy_view().unwrap();
        assert_eq!(busy.stage, Stage::AnalysisInProgress);
        assert!(matches!(busy.body, ViewBody::Working { .. }));

        // A second press while the first is outstanding is rejected.
        assert_eq!(
            c.handle(UserAction::ProceedToAnalysis).await,
            Err(InputError::ActionPending)
        );

        let view = c.cycle().await;
        assert_eq!(view.stage, Stage::AnalysisComplete);
        assert_eq!(service.count(ApiCall::Analyze), 1);

        let snap = c.snapshot().unwrap();
        assert_eq!(snap.analysis_results.len(), before + 1);
        assert_eq!(snap.latest_version(), Some(before as u32 + 1));

        // The trigger was consumed; another cycle issues nothing.
        c.cycle().await;
        assert_eq!(service.count(ApiCall::Analyze), 1);
        assert!(c.busy_view().is_none());
    }

    #[tokio::test]
    async fn analysis_timeout_moves_to_failed_and_retry_works() {
        let (service, mut c) = interviewed().await;
        service.fail_next(ApiCall::Analyze, Failure::Timeout);

        let view = run(&mut c, UserAction::ProceedToAnalysis).await;
        assert_eq!(view.stage, Stage::AnalysisFailed);
        assert!(view.error.as_deref().is_some_and(|e| !e.is_empty()));
        assert!(c.snapshot().unwrap().analysis_results.is_empty());
        assert!(matches!(view.body, ViewBody::AnalysisFailed { .. }));

        // The error is surfaced once, the failed stage persists.
        let view = c.cycle().await;
        assert!(view.error.is_none());
        assert_eq!(view.stage, Stage::AnalysisFailed);

        let view = run(&mut c, UserAction::ProceedToAnalysis).await;
        assert_eq!(view.stage, Stage::AnalysisComplete);
        assert_eq!(service.count(ApiCall::Analyze), 2);
        assert!(c.state().analysis_failure.is_none());
    }

    #[tokio::test]
    async fn analysis_server_error_prefers_detail() {
        let (service, mut c) = interviewed().await;
        service.fail_next(
            ApiCall::Analyze,
            Failure::Server {
                status: 422,
                detail: Some("Pre-processing stage failed: no budget".into()),
            },
        );
        let view = run(&mut c, UserAction::ProceedToAnalysis).await;
        assert_eq!(
            view.body,
            ViewBody::AnalysisFailed {
                message: "Pre-processing stage failed: no budget".into()
            }
        );
    }

    #[tokio::test]
    async fn boardroom_what_if_appends_immutable_versions() {
        let (_service, mut c) = analysed().await;
        let v1 = c.snapshot().unwrap().version(1).unwrap().result.clone();

        run(&mut c, UserAction::SendChat("What if rent doubles?".into())).await;
        run(&mut c, UserAction::SendChat("What if we add delivery?".into())).await;

        let snap = c.snapshot().unwrap();
        let versions: Vec<u32> = snap.analysis_results.iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(snap.version(1).unwrap().result, v1);
        assert_eq!(snap.post_analysis_history.len(), 4);
        assert_eq!(c.selected_version(), Some(3));
    }

    #[tokio::test]
    async fn rewritten_versions_keep_first_seen_result() {
        let (service, mut c) = analysed().await;
        let original = c.snapshot().unwrap().version(1).unwrap().result.clone();
        {
            let mut backend = service.backend.lock().unwrap();
            let snap = backend.projects.get_mut("proj-1").unwrap();
            snap.analysis_results[0].result = json!({"calculated_revenue": 1}).into();
        }
        c.cycle().await;
        assert_eq!(c.snapshot().unwrap().version(1).unwrap().result, original);
    }

    #[tokio::test]
    async fn get_session_twice_is_identical() {
        let (service, _c) = analysed().await;
        let a = service.get_session("user-42", "proj-1").await.unwrap();
        let b = service.get_session("user-42", "proj-1").await.unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn audit_shows_overlay_over_results() {
        let (service, mut c) = analysed().await;
        let view = run(&mut c, UserAction::RequestAudit).await;

        assert_eq!(service.count(ApiCall::Audit), 1);
        assert_eq!(view.stage, Stage::AnalysisComplete);
        assert!(matches!(view.body, ViewBody::Results(_)));
        match view.audit {
            Some(AuditCard::Report { version, report }) => {
                assert_eq!(version, 1);
                assert_eq!(
                    report.overall_audit_summary.as_deref(),
                    Some("Version 1 is consistent.")
                );
            }
            other => panic!("expected audit report, got {other:?}"),
        }

        run(&mut c, UserAction::DismissAudit).await;
        assert!(c.state().audit_overlay.is_none());
    }

    #[tokio::test]
    async fn audit_failure_is_shown_in_overlay() {
        let (service, mut c) = analysed().await;
        service.fail_next(ApiCall::Audit, Failure::Timeout);
        let view = run(&mut c, UserAction::RequestAudit).await;
        assert!(matches!(view.audit, Some(AuditCard::Failed { version: 1, .. })));
        assert_eq!(view.stage, Stage::AnalysisComplete);
    }

    #[tokio::test]
    async fn audit_rejected_for_failed_version() {
        let (service, mut c) = analysed().await;
        {
            let mut backend = service.backend.lock().unwrap();
            let snap = backend.projects.get_mut("proj-1").unwrap();
            snap.analysis_results.push(AnalysisVersion {
                version: 2,
                summary: "what-if".into(),
                result: json!({"error": "model failed"}).into(),
            });
        }
        c.cycle().await;
        c.handle(UserAction::SelectVersion(2)).await.unwrap();

        let err = c.handle(UserAction::RequestAudit).await.unwrap_err();
        assert!(matches!(err, InputError::AuditUnavailable(_)));
        c.cycle().await;
        assert_eq!(service.count(ApiCall::Audit), 0);
    }

    #[tokio::test]
    async fn audit_not_allowed_before_analysis() {
        let (service, mut c) = interviewed().await;
        let err = c.handle(UserAction::RequestAudit).await.unwrap_err();
        assert!(matches!(err, InputError::NotAllowed { .. }));
        assert_eq!(service.count(ApiCall::Audit), 0);
    }

    #[tokio::test]
    async fn select_unknown_version_rejected() {
        let (_service, mut c) = analysed().await;
        assert_eq!(
            c.handle(UserAction::SelectVersion(9)).await,
            Err(InputError::UnknownVersion(9))
        );
    }

    #[tokio::test]
    async fn start_new_project_from_any_stage() {
        let (_service, mut c) = analysed().await;
        run(&mut c, UserAction::SelectVersion(1)).await;
        let view = run(&mut c, UserAction::StartNewProject).await;

        assert_eq!(view.stage, Stage::Form);
        assert!(c.state().project_session_id.is_none());
        assert!(c.state().selected_version.is_none());
        assert!(c.snapshot().is_none());
        assert_eq!(c.state().user_id, "user-42");
        match view.body {
            ViewBody::Form { projects } => assert_eq!(projects.len(), 1),
            other => panic!("expected form, got {other:?}"),
        }

        // A new initiate mints a new id.
        run(&mut c, brief("Build a bakery")).await;
        assert_eq!(c.state().project_session_id.as_deref(), Some("proj-2"));
    }

    #[tokio::test]
    async fn open_project_from_list() {
        let (_service, mut c) = analysed().await;
        run(&mut c, UserAction::StartNewProject).await;
        let view = run(&mut c, UserAction::OpenProject("proj-1".into())).await;
        assert_eq!(view.stage, Stage::AnalysisComplete);
        assert_eq!(view.project_id.as_deref(), Some("proj-1"));
    }

    #[tokio::test]
    async fn opening_unknown_project_returns_to_form() {
        let (_service, mut c) = controller();
        let view = run(&mut c, UserAction::OpenProject("nope".into())).await;
        assert_eq!(view.stage, Stage::Form);
        assert_eq!(view.error.as_deref(), Some("Project not found"));
        assert!(c.state().project_session_id.is_none());
        assert!(matches!(view.body, ViewBody::Form { .. }));
    }

    #[tokio::test]
    async fn server_status_is_authoritative() {
        let (service, mut c) = analysed().await;
        service.set_status("proj-1", "analysis_in_progress");
        let view = c.cycle().await;
        assert_eq!(view.stage, Stage::AnalysisInProgress);
        assert!(matches!(view.body, ViewBody::Working { .. }));
        assert!(c.handle(UserAction::SendChat("hi".into())).await.is_err());
    }

    #[tokio::test]
    async fn refresh_failure_keeps_cached_snapshot() {
        let (service, mut c) = analysed().await;
        service.fail_next(ApiCall::GetSession, Failure::Timeout);
        let view = c.cycle().await;
        assert_eq!(view.stage, Stage::AnalysisComplete);
        assert!(view.error.is_some());
        assert!(c.snapshot().is_some());
    }

    #[tokio::test]
    async fn project_id_present_outside_form_throughout_flow() {
        let (_service, mut c) = controller();
        let actions = vec![
            brief("Build a cafe"),
            UserAction::SendChat("Forty seats".into()),
            UserAction::SendChat("that's everything".into()),
            UserAction::ProceedToAnalysis,
            UserAction::SendChat("What if rent doubles?".into()),
            UserAction::SelectVersion(1),
            UserAction::RequestAudit,
            UserAction::DismissAudit,
            UserAction::StartNewProject,
        ];
        for action in actions {
            let _ = c.handle(action).await;
            assert_id_invariant(&c);
            c.cycle().await;
            assert_id_invariant(&c);
        }
        assert_eq!(c.state().stage, Stage::Form);
    }

    #[tokio::test]
    async fn reopened_failed_analysis_shows_version_detail() {
        let (service, mut c) = controller();
        service.backend.lock().unwrap().projects.insert(
            "proj-7".into(),
            serde_json::from_value(json!({
                "status": "analysis_failed",
                "compiled_brief": {"goal": "Open a cafe"},
                "analysis_results": [{
                    "version": 1,
                    "summary": "Initial analysis",
                    "result": {
                        "error": "HTTP 422",
                        "detail": "Pre-processing stage failed: budget missing"
                    }
                }]
            }))
            .unwrap(),
        );

        let view = run(&mut c, UserAction::OpenProject("proj-7".into())).await;
        assert_eq!(view.stage, Stage::AnalysisFailed);
        assert_eq!(
            view.body,
            ViewBody::AnalysisFailed {
                message: "Pre-processing stage failed: budget missing".into()
            }
        );
        assert!(c.state().analysis_failure.is_none());
    }

    #[tokio::test]
    async fn stage_guards_follow_transition_table() {
        use Stage::*;
        let stages = [
            Form,
            InterviewInProgress,
            InterviewComplete,
            AnalysisInProgress,
            AnalysisComplete,
            AnalysisFailed,
            AuditInProgress,
            AuditComplete,
        ];
        let actions = [
            brief("Build a cafe"),
            UserAction::SendChat("hello".into()),
            UserAction::RestartInterview,
            UserAction::ProceedToAnalysis,
            UserAction::RequestAudit,
        ];

        for stage in stages {
            for action in &actions {
                let (_service, mut c) = controller();
                c.state.project_session_id = Some("proj-1".into());
                c.state.stage = stage;

                let rejected = matches!(
                    c.handle(action.clone()).await,
                    Err(InputError::NotAllowed { .. })
                );
                let target = action.target_stage(stage).unwrap();
                let starts_project = matches!(action, UserAction::SubmitBrief(_));
                let expected =
                    (stage == Form) == starts_project && stage.can_transition_to(target);
                assert_eq!(!rejected, expected, "{} in {stage}", action.name());
            }
        }
    }

    #[tokio::test]
    async fn results_are_not_reanalysed_directly() {
        let (service, mut c) = analysed().await;
        assert!(matches!(
            c.handle(UserAction::ProceedToAnalysis).await,
            Err(InputError::NotAllowed { .. })
        ));
        c.cycle().await;
        assert_eq!(service.count(ApiCall::Analyze), 1);
    }

    #[tokio::test]
    async fn boardroom_chat_continues_after_audit_complete() {
        let (service, mut c) = analysed().await;
        service.set_status("proj-1", "audit_complete");
        c.cycle().await;
        assert_eq!(c.state().stage, Stage::AuditComplete);
        c.handle(UserAction::SendChat("What if rent doubles?".into()))
            .await
            .unwrap();
    }

    fn arb_action() -> impl Strategy<Value = UserAction> {
        prop_oneof![
            Just(brief("Build a cafe")),
            Just(brief("  ")),
            prop::sample::select(vec![
                "Forty seats",
                "that's everything",
                "What if rent doubles?",
                " ",
            ])
            .prop_map(|text| UserAction::SendChat(text.to_string())),
            Just(UserAction::RestartInterview),
            Just(UserAction::ProceedToAnalysis),
            (1u32..5).prop_map(UserAction::SelectVersion),
            Just(UserAction::RequestAudit),
            Just(UserAction::DismissAudit),
            Just(UserAction::Refresh),
            Just(UserAction::StartNewProject),
            Just(UserAction::OpenProject("proj-1".into())),
        ]
    }

    fn arb_failure() -> impl Strategy<Value = Option<ApiCall>> {
        prop::option::weighted(
            0.2,
            prop::sample::select(vec![
                ApiCall::Initiate,
                ApiCall::Chat,
                ApiCall::Analyze,
                ApiCall::GetSession,
                ApiCall::Audit,
            ]),
        )
    }

    fn mutating_calls(service: &ScriptedService) -> usize {
        [ApiCall::Initiate, ApiCall::Chat, ApiCall::Analyze, ApiCall::Audit]
            .into_iter()
            .map(|call| service.count(call))
            .sum()
    }

    /// Replay one generated session and check the invariants after every
    /// step.
    async fn replay(steps: Vec<(UserAction, Option<ApiCall>)>) -> Result<(), TestCaseError> {
        let (service, mut c) = controller();
        // (project, interview length, versions seen) of the last snapshot
        let mut seen: Option<(String, usize, Vec<AnalysisVersion>)> = None;

        for (action, failure) in steps {
            if let Some(call) = failure {
                service.fail_next(call, Failure::Timeout);
            }
            let restarts = action == UserAction::RestartInterview;

            let _ = c.handle(action).await;
            prop_assert!(
                c.state().stage == Stage::Form || c.state().project_session_id.is_some(),
                "stage {} without project id after handle",
                c.state().stage
            );

            let calls_before = mutating_calls(&service);
            c.cycle().await;
            prop_assert!(mutating_calls(&service) - calls_before <= 1);
            prop_assert!(
                c.state().stage == Stage::Form || c.state().project_session_id.is_some(),
                "stage {} without project id after cycle",
                c.state().stage
            );

            let (Some(id), Some(snap)) = (c.state().project_session_id.clone(), c.snapshot())
            else {
                seen = None;
                continue;
            };
            prop_assert!(snap.validate().is_ok());
            if let Some((last_id, history_len, versions)) = &seen {
                if *last_id == id {
                    if !restarts {
                        prop_assert!(snap.interview_history.len() >= *history_len);
                    }
                    prop_assert!(snap.analysis_results.len() >= versions.len());
                    for (old, new) in versions.iter().zip(&snap.analysis_results) {
                        prop_assert_eq!(old, new);
                    }
                }
            }
            seen = Some((
                id,
                snap.interview_history.len(),
                snap.analysis_results.clone(),
            ));
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn generated_sessions_keep_invariants(
            steps in prop::collection::vec((arb_action(), arb_failure()), 1..40)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(replay(steps))?;
        }
    }
}
