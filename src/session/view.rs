//! View model: what the render surface draws for one cycle.

use serde_json::Value;

use super::analysis::AnalysisResult;
use super::controller::auditable_version;
use super::snapshot::{AuditReport, ChatTurn, CompiledBrief, ProjectSnapshot, ProjectSummary};
use super::state::{AuditOverlay, SessionState};
use super::stage::Stage;

/// One screen.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub stage: Stage,
    /// One-shot error from the last cycle.
    pub error: Option<String>,
    pub body: ViewBody,
    pub audit: Option<AuditCard>,
}

/// Stage-specific part of the screen.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewBody {
    /// Brief form plus the user's existing projects.
    Form { projects: Vec<ProjectSummary> },
    Interview { history: Vec<ChatTurn>, can_chat: bool },
    BriefReview {
        brief: Option<CompiledBrief>,
        history: Vec<ChatTurn>,
    },
    /// Indeterminate progress while a long call runs.
    Working { label: String },
    AnalysisFailed { message: String },
    Results(ResultsView),
}

/// Analysis results and boardroom chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    pub versions: Vec<VersionTab>,
    pub selected: u32,
    pub card: ResultCard,
    pub boardroom: Vec<ChatTurn>,
    /// Why an audit can't be requested right now, if it can't.
    pub audit_blocked: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTab {
    pub version: u32,
    pub summary: String,
    pub failed: bool,
}

/// Display fields extracted from one [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCard {
    pub currency: String,
    pub revenue: String,
    pub cost: String,
    pub profit_loss: String,
    pub summary_text: String,
    pub target_entity_name: Option<String>,
    pub analyst_summary: Option<String>,
    /// Titled JSON blocks of the analyst report.
    pub analyst_sections: Vec<(String, Value)>,
    pub sub_reports: Vec<(String, Value)>,
    pub processing_log: Vec<String>,
    pub raw_llm_output: Option<String>,
    /// Set when the version carries an error marker.
    pub failure: Option<String>,
}

impl ResultCard {
    pub fn from_result(result: &AnalysisResult, fallback_currency: &str) -> Self {
        let failure = result.failure().map(|f| f.message().to_string());
        let report = result.analyst_report();
        let (currency, revenue, cost, profit_loss) = match result.financials() {
            Some(figures) => (
                figures
                    .currency
                    .clone()
                    .unwrap_or_else(|| fallback_currency.to_string()),
                figures.revenue_display(),
                figures.cost_display(),
                figures.profit_loss_display(),
            ),
            None => (
                fallback_currency.to_string(),
                "N/A".to_string(),
                "N/A".to_string(),
                "N/A".to_string(),
            ),
        };
        Self {
            currency,
            revenue,
            cost,
            profit_loss,
            summary_text: result
                .summary_text()
                .unwrap_or_else(|| "Not available.".to_string()),
            target_entity_name: result.target_entity_name().map(String::from),
            analyst_summary: report.and_then(|r| r.overall_summary_and_rationale.clone()),
            analyst_sections: report
                .map(|r| {
                    r.sections()
                        .into_iter()
                        .map(|(title, value)| (title.to_string(), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            sub_reports: result
                .sub_reports()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            processing_log: result.processing_log(),
            raw_llm_output: result.raw_llm_output(),
            failure,
        }
    }
}

/// The audit overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditCard {
    Report { version: u32, report: AuditReport },
    Failed { version: u32, message: String },
}

impl From<&AuditOverlay> for AuditCard {
    fn from(overlay: &AuditOverlay) -> Self {
        match &overlay.outcome {
            Ok(report) => Self::Report {
                version: overlay.version,
                report: report.clone(),
            },
            Err(message) => Self::Failed {
                version: overlay.version,
                message: message.clone(),
            },
        }
    }
}

impl View {
    /// Derive the screen from state and the cached snapshot.
    pub fn build(
        state: &SessionState,
        snapshot: Option<&ProjectSnapshot>,
        projects: &[ProjectSummary],
        error: Option<String>,
    ) -> Self {
        let body = match (state.stage, snapshot) {
            (Stage::Form, _) => ViewBody::Form {
                projects: projects.to_vec(),
            },
            (_, None) => ViewBody::Working {
                label: "Waiting for the project to load. Use /refresh to try again.".to_string(),
            },
            (Stage::InterviewInProgress, Some(snap)) => ViewBody::Interview {
                history: snap.interview_history.clone(),
                can_chat: true,
            },
            (Stage::InterviewComplete, Some(snap)) => ViewBody::BriefReview {
                brief: snap.compiled_brief.clone(),
                history: snap.interview_history.clone(),
            },
            (Stage::AnalysisInProgress, Some(_)) => ViewBody::Working {
                label: "Analysis is running on the server. Use /refresh to check on it."
                    .to_string(),
            },
            (Stage::AuditInProgress, Some(_)) => ViewBody::Working {
                label: "An audit is running on the server. Use /refresh to check on it."
                    .to_string(),
            },
            (Stage::AnalysisFailed, Some(snap)) => ViewBody::AnalysisFailed {
                message: state
                    .analysis_failure
                    .clone()
                    .or_else(|| reported_failure(snap))
                    .unwrap_or_else(|| "The analysis did not complete.".to_string()),
            },
            (Stage::AnalysisComplete | Stage::AuditComplete, Some(snap)) => {
                match results_view(state, snap) {
                    Some(results) => ViewBody::Results(results),
                    None => ViewBody::AnalysisFailed {
                        message: "Analysis results are not available.".to_string(),
                    },
                }
            }
        };

        Self {
            project_id: state.project_session_id.clone(),
            project_name: snapshot.and_then(|s| s.project_name.clone()),
            stage: state.stage,
            error,
            body,
            audit: state.audit_overlay.as_ref().map(AuditCard::from),
        }
    }

    /// The view shown while a blocking call is in flight.
    pub fn working(state: &SessionState, stage: Stage, label: String) -> Self {
        Self {
            project_id: state.project_session_id.clone(),
            project_name: None,
            stage,
            error: None,
            body: ViewBody::Working { label },
            audit: None,
        }
    }
}

/// Failure text of the active version, else of the newest failed one.
fn reported_failure(snap: &ProjectSnapshot) -> Option<String> {
    let active = snap
        .default_version()
        .and_then(|n| snap.version(n))
        .and_then(|v| v.result.failure());
    active
        .or_else(|| {
            snap.analysis_results
                .iter()
                .rev()
                .find_map(|v| v.result.failure())
        })
        .map(|f| f.message().to_string())
}

fn results_view(state: &SessionState, snap: &ProjectSnapshot) -> Option<ResultsView> {
    let selected = state.selected_version.or_else(|| snap.default_version())?;
    let entry = snap.version(selected)?;
    let fallback_currency = snap
        .compiled_brief
        .as_ref()
        .and_then(|b| b.currency.clone())
        .unwrap_or_else(|| "USD".to_string());

    Some(ResultsView {
        versions: snap
            .analysis_results
            .iter()
            .map(|v| VersionTab {
                version: v.version,
                summary: v.summary.clone(),
                failed: v.result.has_error_marker(),
            })
            .collect(),
        selected,
        card: ResultCard::from_result(&entry.result, &fallback_currency),
        boardroom: snap.post_analysis_history.clone(),
        audit_blocked: auditable_version(Some(snap), Some(selected))
            .err()
            .map(|e| e.to_string()),
    })
}
