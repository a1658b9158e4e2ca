use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbox records come in two shapes that share most behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketKind {
    Conversation,
    Ticket,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Conversation => "conversation",
            TicketKind::Ticket => "ticket",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketRef {
    pub id: String,
    pub kind: TicketKind,
}

impl TicketRef {
    pub fn ticket(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TicketKind::Ticket,
        }
    }

    pub fn conversation(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TicketKind::Conversation,
        }
    }

    /// Text stored in the task's link field. Tickets keep the bare id;
    /// conversations carry a `conversation:` prefix.
    pub fn link_text(&self) -> String {
        match self.kind {
            TicketKind::Ticket => self.id.clone(),
            TicketKind::Conversation => format!("{CONVERSATION_PREFIX}{}", self.id),
        }
    }

    /// Inverse of [`TicketRef::link_text`]. A bare id is a ticket.
    pub fn from_link_text(text: &str) -> Option<Self> {
        let text = text.trim();
        let reference = match text.strip_prefix(CONVERSATION_PREFIX) {
            Some(id) => Self::conversation(id.trim()),
            None => Self::ticket(text.strip_prefix(TICKET_PREFIX).unwrap_or(text).trim()),
        };
        (!reference.id.is_empty()).then_some(reference)
    }
}

const CONVERSATION_PREFIX: &str = "conversation:";
const TICKET_PREFIX: &str = "ticket:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketState {
    pub id: String,
    #[serde(default)]
    pub internal_label: String,
    #[serde(default)]
    pub external_label: String,
    #[serde(default)]
    pub category: String,
    /// Ticket types this state applies to. Empty means every type.
    #[serde(default)]
    pub ticket_type_ids: Vec<String>,
}

impl TicketState {
    pub fn applies_to(&self, ticket_type_id: &str) -> bool {
        self.ticket_type_ids.is_empty() || self.ticket_type_ids.iter().any(|t| t == ticket_type_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(rename = "ref")]
    pub reference: TicketRef,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Ticket attributes or conversation custom attributes, by display name.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub state: Option<TicketState>,
    pub ticket_type_id: Option<String>,
    #[serde(default)]
    pub contact_ids: Vec<String>,
    #[serde(default = "open_default")]
    pub open: bool,
    pub url: Option<String>,
}

fn open_default() -> bool {
    true
}

impl Ticket {
    pub fn id(&self) -> &str {
        &self.reference.id
    }

    /// Non-empty string value of an attribute, with numbers rendered as text.
    pub fn attribute_text(&self, name: &str) -> Option<String> {
        match self.attributes.get(name)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
