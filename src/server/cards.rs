use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::model::ticket::Ticket;
use crate::util::html;

/// Buttons a card can send back in `component_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardAction {
    CreateTask,
    SyncFiles,
    Refresh,
}

impl CardAction {
    pub const ALL: [CardAction; 3] = [CardAction::CreateTask, CardAction::SyncFiles, CardAction::Refresh];

    pub fn id(&self) -> &'static str {
        match self {
            CardAction::CreateTask => "create_task",
            CardAction::SyncFiles => "sync_files",
            CardAction::Refresh => "refresh",
        }
    }
}

impl fmt::Display for CardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl FromStr for CardAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardAction::ALL
            .into_iter()
            .find(|action| action.id() == s.trim())
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

fn canvas(components: Vec<Value>) -> Value {
    json!({ "canvas": { "content": { "components": components } } })
}

fn text(text: &str, style: &str) -> Value {
    json!({ "type": "text", "text": text, "style": style })
}

fn submit_button(action: CardAction, label: &str, style: &str) -> Value {
    json!({
        "type": "button",
        "id": action.id(),
        "label": label,
        "style": style,
        "action": { "type": "submit" }
    })
}

fn notice_components(notice: Option<&str>) -> Vec<Value> {
    notice
        .map(|n| vec![text(n, "muted"), json!({ "type": "divider" })])
        .unwrap_or_default()
}

/// Form shown while a ticket has no task.
pub fn create_form(ticket: &Ticket, notice: Option<&str>) -> Value {
    let mut components = notice_components(notice);
    components.push(text("Create an Asana task", "header"));
    components.push(json!({
        "type": "input",
        "id": "title",
        "label": "Title",
        "value": ticket.title.clone().unwrap_or_default(),
    }));
    components.push(json!({
        "type": "textarea",
        "id": "description",
        "label": "Description",
        "value": ticket.description.as_deref().map(html::html_to_text).unwrap_or_default(),
    }));
    components.push(submit_button(CardAction::CreateTask, "Create task", "primary"));
    canvas(components)
}

pub fn linked(task_id: &str, task_url: Option<&str>, notice: Option<&str>) -> Value {
    let mut components = notice_components(notice);
    components.push(text("Linked to an Asana task", "header"));
    components.push(text(&format!("Task {task_id}"), "paragraph"));
    if let Some(url) = task_url {
        components.push(json!({
            "type": "button",
            "id": "open_task",
            "label": "Open task",
            "style": "link",
            "action": { "type": "url", "url": url }
        }));
    }
    components.push(submit_button(CardAction::SyncFiles, "Sync files", "secondary"));
    components.push(submit_button(CardAction::Refresh, "Refresh", "secondary"));
    canvas(components)
}

pub fn error(message: &str) -> Value {
    canvas(vec![
        text(message, "error"),
        submit_button(CardAction::Refresh, "Try again", "secondary"),
    ])
}
