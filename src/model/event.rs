use serde::{Deserialize, Serialize};

use super::ticket::TicketRef;

/// The two systems the bridge sits between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum System {
    Inbox,
    Tasks,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Set when the source system says an app, not a person, wrote this.
    #[serde(default)]
    pub integration_app: bool,
}

impl Author {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("Unknown")
    }
}

/// One inbound change, consumed once per webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    TicketStatusChanged {
        ticket: TicketRef,
        state_id: Option<String>,
        author: Author,
    },
    NoteAdded {
        ticket: TicketRef,
        /// Note body as delivered, usually HTML.
        body: String,
        author: Author,
    },
    TaskCommented {
        task_id: String,
        story_id: String,
        author: Author,
    },
    TaskFieldChanged {
        task_id: String,
        field_id: Option<String>,
        author: Author,
    },
}

impl SyncEvent {
    /// Identifier of the record the event concerns in its source system.
    pub fn source_id(&self) -> &str {
        match self {
            SyncEvent::TicketStatusChanged { ticket, .. } | SyncEvent::NoteAdded { ticket, .. } => {
                &ticket.id
            }
            SyncEvent::TaskCommented { task_id, .. } | SyncEvent::TaskFieldChanged { task_id, .. } => {
                task_id
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::TicketStatusChanged { .. } => "ticket_status_changed",
            SyncEvent::NoteAdded { .. } => "note_added",
            SyncEvent::TaskCommented { .. } => "task_commented",
            SyncEvent::TaskFieldChanged { .. } => "task_field_changed",
        }
    }
}
