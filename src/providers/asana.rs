use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{ApiError, TaskSystem};
use crate::model::task::{
    EnumOption, FieldKind, FieldValue, NewTask, RemoteField, Story, Task, UploadedAttachment,
};

const SYSTEM: &str = "Asana";
const TASK_FIELDS: &str =
    "gid,name,permalink_url,custom_fields.gid,custom_fields.name,custom_fields.display_value";

pub struct AsanaProvider {
    base_url: String,
    token: String,
    workspace_id: String,
    project_id: String,
    client: reqwest::Client,
}

impl AsanaProvider {
    pub fn new(
        base_url: String,
        token: String,
        workspace_id: String,
        project_id: String,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            workspace_id,
            project_id,
            client,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let resp = req
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ApiError::transport(SYSTEM))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                system: SYSTEM,
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| ApiError::decode(SYSTEM, e.to_string()))?;
        Ok(envelope.data)
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct FieldSetting {
    custom_field: AsanaField,
}

#[derive(Deserialize)]
struct AsanaField {
    gid: String,
    name: String,
    resource_subtype: Option<String>,
    #[serde(rename = "type")]
    legacy_type: Option<String>,
}

#[derive(Deserialize)]
struct FieldWithOptions {
    #[serde(default)]
    enum_options: Vec<AsanaEnumOption>,
}

#[derive(Deserialize)]
struct AsanaEnumOption {
    gid: String,
    name: String,
    enabled: Option<bool>,
}

#[derive(Deserialize)]
struct AsanaTask {
    gid: String,
    #[serde(default)]
    name: String,
    permalink_url: Option<String>,
    #[serde(default)]
    custom_fields: Vec<AsanaFieldValue>,
}

#[derive(Deserialize)]
struct AsanaFieldValue {
    gid: String,
    #[serde(default)]
    name: String,
    display_value: Option<String>,
}

#[derive(Deserialize)]
struct AsanaStory {
    gid: String,
    #[serde(default)]
    text: String,
    resource_subtype: Option<String>,
    source: Option<String>,
    created_by: Option<AsanaUser>,
    target: Option<AsanaRef>,
}

#[derive(Deserialize)]
struct AsanaUser {
    gid: String,
    name: Option<String>,
}

#[derive(Deserialize)]
struct AsanaRef {
    gid: String,
}

#[derive(Deserialize)]
struct AsanaAttachment {
    permanent_url: Option<String>,
    download_url: Option<String>,
}

impl From<AsanaTask> for Task {
    fn from(task: AsanaTask) -> Self {
        Task {
            id: task.gid,
            name: task.name,
            url: task.permalink_url,
            fields: task
                .custom_fields
                .into_iter()
                .map(|f| FieldValue {
                    field_id: f.gid,
                    name: f.name,
                    display: f.display_value.filter(|v| !v.trim().is_empty()),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl TaskSystem for AsanaProvider {
    fn name(&self) -> &str {
        SYSTEM
    }

    async fn list_custom_fields(&self, project_id: &str) -> Result<Vec<RemoteField>, ApiError> {
        let url = format!("{}/projects/{project_id}/custom_field_settings", self.base_url);
        let settings: Vec<FieldSetting> = self
            .send(self.client.get(&url).query(&[(
                "opt_fields",
                "custom_field.gid,custom_field.name,custom_field.resource_subtype,custom_field.type",
            )]))
            .await?;

        Ok(settings
            .into_iter()
            .map(|s| {
                let subtype = s
                    .custom_field
                    .resource_subtype
                    .or(s.custom_field.legacy_type)
                    .unwrap_or_default();
                RemoteField {
                    id: s.custom_field.gid,
                    name: s.custom_field.name,
                    kind: FieldKind::from_subtype(&subtype),
                }
            })
            .collect())
    }

    async fn enum_options(&self, field_id: &str) -> Result<Vec<EnumOption>, ApiError> {
        let url = format!("{}/custom_fields/{field_id}", self.base_url);
        let field: FieldWithOptions = self
            .send(self.client.get(&url).query(&[(
                "opt_fields",
                "enum_options.gid,enum_options.name,enum_options.enabled",
            )]))
            .await?;

        Ok(field
            .enum_options
            .into_iter()
            .map(|o| EnumOption {
                id: o.gid,
                name: o.name,
                enabled: o.enabled.unwrap_or(true),
            })
            .collect())
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
        let mut data = json!({
            "name": task.name,
            "notes": task.notes,
            "projects": [self.project_id],
            "workspace": self.workspace_id,
        });
        if !task.custom_fields.is_empty() {
            data["custom_fields"] = Value::Object(task.custom_fields.clone());
        }

        let created: AsanaTask = self
            .send(
                self.client
                    .post(format!("{}/tasks", self.base_url))
                    .query(&[("opt_fields", TASK_FIELDS)])
                    .json(&json!({ "data": data })),
            )
            .await?;
        debug!(task_id = %created.gid, "asana task created");
        Ok(created.into())
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
        let task: AsanaTask = self
            .send(
                self.client
                    .get(format!("{}/tasks/{task_id}", self.base_url))
                    .query(&[("opt_fields", TASK_FIELDS)]),
            )
            .await?;
        Ok(task.into())
    }

    async fn set_custom_fields(
        &self,
        task_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        let _: Value = self
            .send(
                self.client
                    .put(format!("{}/tasks/{task_id}", self.base_url))
                    .query(&[("opt_fields", "gid")])
                    .json(&json!({ "data": { "custom_fields": fields } })),
            )
            .await?;
        Ok(())
    }

    async fn add_comment(&self, task_id: &str, text: &str) -> Result<(), ApiError> {
        let _: Value = self
            .send(
                self.client
                    .post(format!("{}/tasks/{task_id}/stories", self.base_url))
                    .query(&[("opt_fields", "gid")])
                    .json(&json!({ "data": { "text": text } })),
            )
            .await?;
        Ok(())
    }

    async fn get_story(&self, story_id: &str) -> Result<Story, ApiError> {
        let story: AsanaStory = self
            .send(
                self.client
                    .get(format!("{}/stories/{story_id}", self.base_url))
                    .query(&[(
                        "opt_fields",
                        "gid,text,resource_subtype,source,created_by.gid,created_by.name,target.gid",
                    )]),
            )
            .await?;

        Ok(Story {
            id: story.gid,
            text: story.text,
            task_id: story.target.map(|t| t.gid),
            author_id: story.created_by.as_ref().map(|u| u.gid.clone()),
            author_name: story.created_by.and_then(|u| u.name),
            source: story.source,
            is_comment: story.resource_subtype.as_deref() == Some("comment_added"),
        })
    }

    async fn upload_attachment(
        &self,
        parent_id: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedAttachment, ApiError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(ApiError::transport(SYSTEM))?;
        let form = reqwest::multipart::Form::new()
            .text("parent", parent_id.to_string())
            .part("file", part);

        let uploaded: AsanaAttachment = self
            .send(
                self.client
                    .post(format!("{}/attachments", self.base_url))
                    .query(&[("opt_fields", "permanent_url,download_url")])
                    .multipart(form),
            )
            .await?;

        Ok(UploadedAttachment {
            permanent_url: uploaded.permanent_url.filter(|u| !u.is_empty()),
            download_url: uploaded.download_url.filter(|u| !u.is_empty()),
        })
    }
}
