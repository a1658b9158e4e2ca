use std::sync::Arc;

use futures::future::join_all;
use reqwest::Url;
use tracing::{debug, warn};

use crate::model::attachment::{AttachmentRef, RelayReport, RelayStatus};
use crate::providers::TaskSystem;

/// Shown in place of a URL when the upload succeeded but none came back.
pub const NO_URL_SENTINEL: &str = "uploaded (no URL available)";
const FALLBACK_FILENAME: &str = "attachment";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Uploaded(String),
    UploadedWithoutUrl,
    Failed(String),
    InvalidUrl,
}

impl RelayOutcome {
    pub fn status(&self) -> RelayStatus {
        match self {
            RelayOutcome::Uploaded(_) | RelayOutcome::UploadedWithoutUrl => RelayStatus::Success,
            RelayOutcome::Failed(_) => RelayStatus::Failed,
            RelayOutcome::InvalidUrl => RelayStatus::InvalidUrl,
        }
    }

    pub fn destination_url(&self) -> Option<&str> {
        match self {
            RelayOutcome::Uploaded(url) => Some(url),
            _ => None,
        }
    }
}

/// Last non-empty path segment, percent-decoded.
pub fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

fn parse_source(source_url: &str) -> Option<Url> {
    let url = Url::parse(source_url.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

/// Copies files from the inbox's storage onto tasks.
pub struct AttachmentRelay {
    client: reqwest::Client,
    tasks: Arc<dyn TaskSystem>,
}

impl AttachmentRelay {
    pub fn new(client: reqwest::Client, tasks: Arc<dyn TaskSystem>) -> Self {
        Self { client, tasks }
    }

    pub async fn relay(&self, source_url: &str, parent_id: &str) -> RelayOutcome {
        self.relay_ref(&AttachmentRef::from_url(source_url), parent_id)
            .await
    }

    async fn relay_ref(&self, source: &AttachmentRef, parent_id: &str) -> RelayOutcome {
        let Some(url) = parse_source(&source.url) else {
            debug!(url = %source.url, "attachment url rejected");
            return RelayOutcome::InvalidUrl;
        };

        let resp = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => return RelayOutcome::Failed(format!("download failed: {e}")),
        };
        if !resp.status().is_success() {
            return RelayOutcome::Failed(format!("download returned {}", resp.status()));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .or_else(|| source.content_type.clone())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        let filename = filename_from_url(&url);

        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => return RelayOutcome::Failed(format!("download body failed: {e}")),
        };

        match self
            .tasks
            .upload_attachment(parent_id, &filename, &content_type, bytes)
            .await
        {
            Ok(uploaded) => match uploaded.permanent_url.or(uploaded.download_url) {
                Some(url) => RelayOutcome::Uploaded(url),
                None => RelayOutcome::UploadedWithoutUrl,
            },
            Err(e) => RelayOutcome::Failed(format!("upload failed: {e}")),
        }
    }

    /// Relays every reference concurrently. One report per input, in order.
    pub async fn relay_all(&self, refs: &[AttachmentRef], parent_id: &str) -> Vec<RelayReport> {
        let outcomes = join_all(refs.iter().map(|r| self.relay_ref(r, parent_id))).await;

        refs.iter()
            .zip(outcomes)
            .map(|(source, outcome)| {
                if let RelayOutcome::Failed(reason) = &outcome {
                    warn!(url = %source.url, parent = parent_id, reason = %reason, "attachment relay failed");
                }
                RelayReport {
                    source: source.clone(),
                    status: outcome.status(),
                    destination_url: outcome.destination_url().map(String::from),
                }
            })
            .collect()
    }
}
