use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl AttachmentRef {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
            content_type: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Success,
    Failed,
    InvalidUrl,
}

impl RelayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayStatus::Success => "success",
            RelayStatus::Failed => "failed",
            RelayStatus::InvalidUrl => "invalid_url",
        }
    }
}

/// Per-file result of relaying one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReport {
    pub source: AttachmentRef,
    pub status: RelayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_url: Option<String>,
}
