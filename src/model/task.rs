use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a task-system custom field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    ShortText,
    Number,
    EnumChoice,
    Date,
    File,
    /// Any subtype the sync does not convert into (people, multi-select, ...).
    Other(String),
}

impl FieldKind {
    pub fn from_subtype(subtype: &str) -> Self {
        match subtype {
            "text" => FieldKind::ShortText,
            "number" => FieldKind::Number,
            "enum" => FieldKind::EnumChoice,
            "date" => FieldKind::Date,
            "file" | "attachment" => FieldKind::File,
            other => FieldKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::ShortText => f.write_str("short-text"),
            FieldKind::Number => f.write_str("number"),
            FieldKind::EnumChoice => f.write_str("enumerated-choice"),
            FieldKind::Date => f.write_str("date"),
            FieldKind::File => f.write_str("file"),
            FieldKind::Other(name) => write!(f, "other({name})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteField {
    pub id: String,
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumOption {
    pub id: String,
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

/// Current value of one custom field on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field_id: String,
    pub name: String,
    /// Human readable rendering as reported by the task system.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldValue>,
}

impl Task {
    pub fn field_by_id(&self, field_id: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Payload for creating a task in the configured project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub name: String,
    pub notes: String,
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
}

/// A comment on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// Product surface the comment came from ("web", "api", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub is_comment: bool,
}

/// Where an uploaded attachment can be reached afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadedAttachment {
    pub permanent_url: Option<String>,
    pub download_url: Option<String>,
}
