//! reqwest implementation of [`ProjectService`].

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;

use super::wire::{
    AnalyzeRequest, AuditRequest, ChatRequest, ErrorBody, InitiateResponse, ProjectList,
};
use super::ProjectService;
use crate::config::{ClientConfig, Timeouts};
use crate::error::{ApiCall, ApiError};
use crate::session::brief::BriefSubmission;
use crate::session::snapshot::{AuditReport, ChatTurn, ProjectSnapshot, ProjectSummary};

/// Talks to the project service over HTTP.
pub struct HttpProjectService {
    client: reqwest::Client,
    base_url: Url,
    timeouts: Timeouts,
}

impl HttpProjectService {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            timeouts: config.timeouts.clone(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments. Segments are
    /// percent-encoded, so ids can't escape their position in the path.
    fn endpoint(&self, call: ApiCall, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport {
                call,
                reason: format!("base URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and return the raw body of a 2xx response.
    async fn send_raw(&self, call: ApiCall, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await.map_err(|e| transport(call, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport(call, e))?;

        if !status.is_success() {
            let detail = ErrorBody::detail_from(&body);
            tracing::warn!(
                call = %call,
                status = status.as_u16(),
                detail = detail.as_deref().unwrap_or(""),
                "Project service returned an error"
            );
            return Err(ApiError::Server {
                call,
                status: status.as_u16(),
                detail,
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        call: ApiCall,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.send_raw(call, request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(call = %call, error = %e, "Malformed response body");
            ApiError::Malformed {
                call,
                reason: e.to_string(),
            }
        })
    }

    /// For calls whose success body carries nothing we need. An empty body
    /// is fine; anything else must at least be JSON.
    async fn send_unit(&self, call: ApiCall, request: RequestBuilder) -> Result<(), ApiError> {
        let body = self.send_raw(call, request).await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        serde_json::from_str::<serde_json::Value>(&body)
            .map(|_| ())
            .map_err(|e| ApiError::Malformed {
                call,
                reason: e.to_string(),
            })
    }
}

fn transport(call: ApiCall, err: reqwest::Error) -> ApiError {
    let reason = if err.is_timeout() {
        format!("timed out: {err}")
    } else {
        err.to_string()
    };
    tracing::warn!(call = %call, reason = %reason, "Project service unreachable");
    ApiError::Transport { call, reason }
}

#[async_trait]
impl ProjectService for HttpProjectService {
    async fn initiate(
        &self,
        user_id: &str,
        submission: &BriefSubmission,
    ) -> Result<String, ApiError> {
        let call = ApiCall::Initiate;
        let brief_json = serde_json::to_string(&submission.brief).map_err(|e| {
            ApiError::Malformed {
                call,
                reason: format!("could not encode brief: {e}"),
            }
        })?;

        let mut form = Form::new().text("user_brief_json", brief_json);
        for attachment in &submission.attachments {
            let part = Part::bytes(attachment.bytes.clone())
                .file_name(attachment.file_name.clone())
                .mime_str(attachment.content_type)
                .map_err(|e| transport(call, e))?;
            form = form.part("files", part);
        }

        tracing::info!(
            files = submission.attachments.len(),
            currency = %submission.brief.currency,
            "Initiating project"
        );

        let request = self
            .client
            .post(self.endpoint(call, &["project", "initiate"])?)
            .bearer_auth(user_id)
            .timeout(self.timeouts.initiate)
            .multipart(form);
        let response: InitiateResponse = self.send_json(call, request).await?;

        if response.project_session_id.trim().is_empty() {
            return Err(ApiError::Malformed {
                call,
                reason: "empty project_session_id".to_string(),
            });
        }
        tracing::info!(project_id = %response.project_session_id, "Project initiated");
        Ok(response.project_session_id)
    }

    async fn chat(&self, user_id: &str, project_id: &str, content: &str) -> Result<(), ApiError> {
        let call = ApiCall::Chat;
        let body = ChatRequest {
            project_session_id: project_id.to_string(),
            message: ChatTurn::user(content),
        };
        let request = self
            .client
            .post(self.endpoint(call, &["project", "chat"])?)
            .bearer_auth(user_id)
            .timeout(self.timeouts.chat)
            .json(&body);
        self.send_unit(call, request).await
    }

    async fn analyze(&self, user_id: &str, project_id: &str) -> Result<(), ApiError> {
        let call = ApiCall::Analyze;
        let body = AnalyzeRequest {
            project_session_id: project_id.to_string(),
        };
        tracing::info!(project_id, timeout = ?self.timeouts.analyze, "Starting analysis");
        let request = self
            .client
            .post(self.endpoint(call, &["project", "analyze"])?)
            .bearer_auth(user_id)
            .timeout(self.timeouts.analyze)
            .json(&body);
        self.send_unit(call, request).await
    }

    async fn get_session(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<ProjectSnapshot, ApiError> {
        let call = ApiCall::GetSession;
        let request = self
            .client
            .get(self.endpoint(call, &["project", project_id])?)
            .bearer_auth(user_id)
            .timeout(self.timeouts.read);
        let snapshot: ProjectSnapshot = self.send_json(call, request).await?;
        snapshot
            .validate()
            .map_err(|reason| ApiError::Malformed { call, reason })?;
        Ok(snapshot)
    }

    async fn list_projects(&self, user_id: &str) -> Result<Vec<ProjectSummary>, ApiError> {
        let call = ApiCall::ListProjects;
        let request = self
            .client
            .get(self.endpoint(call, &["projects"])?)
            .bearer_auth(user_id)
            .timeout(self.timeouts.read);
        let list: ProjectList = self.send_json(call, request).await?;
        Ok(list.projects)
    }

    async fn audit(
        &self,
        user_id: &str,
        project_id: &str,
        version: u32,
    ) -> Result<AuditReport, ApiError> {
        let call = ApiCall::Audit;
        let body = AuditRequest {
            project_session_id: project_id.to_string(),
            version_to_audit: version,
        };
        tracing::info!(project_id, version, "Requesting audit");
        let request = self
            .client
            .post(self.endpoint(call, &["perform_audit"])?)
            .bearer_auth(user_id)
            .timeout(self.timeouts.audit)
            .json(&body);
        self.send_json(call, request).await
    }
}
