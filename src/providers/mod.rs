pub mod asana;
pub mod intercom;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::model::task::{EnumOption, NewTask, RemoteField, Story, Task, UploadedAttachment};
use crate::model::ticket::{Ticket, TicketRef, TicketState};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{system} returned {status}: {body}")]
    Status {
        system: &'static str,
        status: u16,
        body: String,
    },
    #[error("{system} request failed: {source}")]
    Transport {
        system: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{system} response could not be decoded: {message}")]
    Decode {
        system: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn transport(system: &'static str) -> impl FnOnce(reqwest::Error) -> ApiError {
        move |source| ApiError::Transport { system, source }
    }

    pub fn decode(system: &'static str, message: impl Into<String>) -> ApiError {
        ApiError::Decode {
            system,
            message: message.into(),
        }
    }
}

/// The task tracker. Every method is one outbound call.
#[async_trait]
pub trait TaskSystem: Send + Sync {
    fn name(&self) -> &str;
    async fn list_custom_fields(&self, project_id: &str) -> Result<Vec<RemoteField>, ApiError>;
    async fn enum_options(&self, field_id: &str) -> Result<Vec<EnumOption>, ApiError>;
    async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError>;
    async fn get_task(&self, task_id: &str) -> Result<Task, ApiError>;
    async fn set_custom_fields(
        &self,
        task_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), ApiError>;
    async fn add_comment(&self, task_id: &str, text: &str) -> Result<(), ApiError>;
    async fn get_story(&self, story_id: &str) -> Result<Story, ApiError>;
    async fn upload_attachment(
        &self,
        parent_id: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedAttachment, ApiError>;
}

/// The support inbox.
#[async_trait]
pub trait InboxSystem: Send + Sync {
    fn name(&self) -> &str;
    async fn get_ticket(&self, ticket: &TicketRef) -> Result<Ticket, ApiError>;
    async fn set_attributes(
        &self,
        ticket: &TicketRef,
        attributes: &Map<String, Value>,
    ) -> Result<(), ApiError>;
    async fn ticket_states(&self) -> Result<Vec<TicketState>, ApiError>;
    /// Moves a ticket to `state_id` and, when `close` is set, closes it in the same write.
    async fn update_state(
        &self,
        ticket_id: &str,
        state_id: &str,
        close: bool,
    ) -> Result<(), ApiError>;
    /// Conversations carry no ticket state; they can only be closed.
    async fn close_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;
    async fn add_note(&self, ticket: &TicketRef, body: &str) -> Result<(), ApiError>;
    async fn contact_name(&self, contact_id: &str) -> Result<Option<String>, ApiError>;
}

pub fn http_client(config: &AppConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub fn create_task_system(config: &AppConfig, client: reqwest::Client) -> Option<Arc<dyn TaskSystem>> {
    let cfg = config.asana.as_ref()?;
    Some(Arc::new(asana::AsanaProvider::new(
        cfg.api_url.clone(),
        cfg.token.clone(),
        cfg.workspace_id.clone(),
        cfg.project_id.clone(),
        client,
    )))
}

pub fn create_inbox_system(config: &AppConfig, client: reqwest::Client) -> Option<Arc<dyn InboxSystem>> {
    let cfg = config.intercom.as_ref()?;
    Some(Arc::new(intercom::IntercomProvider::new(
        cfg.api_url.clone(),
        cfg.token.clone(),
        cfg.admin_id.clone(),
        client,
    )))
}
