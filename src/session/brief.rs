//! The initial brief form and its file attachments.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Currency all financial figures of a project are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "PKR")]
    Pkr,
    #[serde(rename = "AED")]
    Aed,
    #[serde(rename = "SAR")]
    Sar,
    #[serde(rename = "EUR")]
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 5] = [Self::Usd, Self::Pkr, Self::Aed, Self::Sar, Self::Eur];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Pkr => "PKR",
            Self::Aed => "AED",
            Self::Sar => "SAR",
            Self::Eur => "EUR",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::Usd
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = InputError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.code() == upper)
            .ok_or_else(|| InputError::UnknownCurrency(s.trim().to_string()))
    }
}

/// What the user filled into the brief form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BriefForm {
    pub summary: String,
    pub currency: Currency,
    pub attachments: Vec<PathBuf>,
}

/// A document ready for the multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Content type for an accepted file, by extension.
    pub fn content_type_for(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "pdf" => Some("application/pdf"),
            "txt" => Some("text/plain"),
            _ => None,
        }
    }

    /// Check that `path` has an accepted file type.
    pub fn check(path: &Path) -> Result<&'static str, InputError> {
        Self::content_type_for(path).ok_or_else(|| InputError::UnsupportedAttachment {
            path: path.to_path_buf(),
        })
    }

    /// Read a file from disk.
    pub async fn load(path: &Path) -> Result<Self, InputError> {
        let content_type = Self::check(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| InputError::AttachmentUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }
}

/// The `user_brief_json` document sent with the initiate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBrief {
    pub project_idea_summary: String,
    pub has_existing_files: bool,
    pub existing_files_description: String,
    pub currency: Currency,
}

/// A validated brief with its attachments loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BriefSubmission {
    pub brief: UserBrief,
    pub attachments: Vec<Attachment>,
}

impl BriefSubmission {
    /// Validate a form and load its attachments.
    ///
    /// Nothing is sent anywhere; every failure is an [`InputError`].
    pub async fn prepare(form: &BriefForm) -> Result<Self, InputError> {
        let summary = form.summary.trim();
        if summary.is_empty() {
            return Err(InputError::EmptySummary);
        }
        // Reject bad types before reading anything.
        for path in &form.attachments {
            Attachment::check(path)?;
        }
        let mut attachments = Vec::with_capacity(form.attachments.len());
        for path in &form.attachments {
            attachments.push(Attachment::load(path).await?);
        }

        let existing_files_description = if attachments.is_empty() {
            "No files uploaded.".to_string()
        } else {
            let names: Vec<&str> = attachments.iter().map(|a| a.file_name.as_str()).collect();
            format!("{} files uploaded: {}", attachments.len(), names.join(", "))
        };

        Ok(Self {
            brief: UserBrief {
                project_idea_summary: summary.to_string(),
                has_existing_files: !attachments.is_empty(),
                existing_files_description,
                currency: form.currency,
            },
            attachments,
        })
    }
}
