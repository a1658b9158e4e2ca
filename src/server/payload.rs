//! Inbound payload shapes and their translation into `SyncEvent`s.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::model::event::{Author, SyncEvent};
use crate::model::ticket::TicketRef;
use crate::providers::intercom::id_text;

/// Body of a card `initialize` or `submit` request.
#[derive(Debug, Default, Deserialize)]
pub struct CanvasRequest {
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub input_values: Map<String, Value>,
    #[serde(default)]
    pub conversation: Option<Value>,
    #[serde(default)]
    pub contact: Option<Value>,
}

impl CanvasRequest {
    /// The record the card was opened on. Tickets are conversations carrying a
    /// ticket, or an explicit `"type": "ticket"`.
    pub fn ticket_ref(&self) -> Option<TicketRef> {
        let conversation = self.conversation.as_ref()?;
        let id = conversation.get("id").map(id_text).filter(|id| !id.is_empty())?;
        let is_ticket = conversation.get("type").and_then(Value::as_str) == Some("ticket")
            || conversation.get("ticket").is_some_and(|t| !t.is_null());
        Some(if is_ticket {
            TicketRef::ticket(id)
        } else {
            TicketRef::conversation(id)
        })
    }

    pub fn contact_id(&self) -> Option<String> {
        self.contact
            .as_ref()
            .and_then(|c| c.get("id"))
            .map(id_text)
            .filter(|id| !id.is_empty())
    }

    pub fn input_text(&self, key: &str) -> Option<String> {
        self.input_values
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

fn intercom_author(value: Option<&Value>) -> Author {
    let Some(value) = value else {
        return Author::default();
    };
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    Author {
        id: value.get("id").map(id_text).filter(|id| !id.is_empty()),
        name: value
            .get("name")
            .and_then(Value::as_str)
            .map(String::from),
        integration_app: matches!(kind, "bot" | "app"),
    }
}

/// Most recent part of `part_type` on a conversation or ticket item.
fn last_part<'a>(item: &'a Value, part_types: &[&str]) -> Option<&'a Value> {
    let parts = item
        .pointer("/conversation_parts/conversation_parts")
        .or_else(|| item.pointer("/ticket_parts/ticket_parts"))?
        .as_array()?;
    parts.iter().rev().find(|part| {
        part.get("part_type")
            .and_then(Value::as_str)
            .is_some_and(|t| part_types.contains(&t))
    })
}

fn item_ref(item: &Value) -> Option<TicketRef> {
    let id = item.get("id").map(id_text).filter(|id| !id.is_empty())?;
    Some(match item.get("type").and_then(Value::as_str) {
        Some("ticket") => TicketRef::ticket(id),
        _ => TicketRef::conversation(id),
    })
}

/// Inbox notification topics the bridge acts on.
pub fn intercom_event(notification: &Value) -> Option<SyncEvent> {
    let topic = notification.get("topic").and_then(Value::as_str)?;
    let item = notification.pointer("/data/item")?;
    let ticket = item_ref(item)?;

    match topic {
        "conversation.admin.noted" | "ticket.note.created" => {
            let part = last_part(item, &["note"])?;
            let body = part.get("body").and_then(Value::as_str)?.to_string();
            Some(SyncEvent::NoteAdded {
                ticket,
                body,
                author: intercom_author(part.get("author")),
            })
        }
        "ticket.state.updated" => {
            let state_id = item
                .get("ticket_state")
                .and_then(|s| s.get("id"))
                .or_else(|| item.get("ticket_state_id"))
                .map(id_text)
                .filter(|id| !id.is_empty());
            let author = last_part(item, &["ticket_state_updated_by_admin", "state_change"])
                .and_then(|part| part.get("author"));
            Some(SyncEvent::TicketStatusChanged {
                ticket,
                state_id,
                author: intercom_author(author),
            })
        }
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AsanaWebhook {
    #[serde(default)]
    pub events: Vec<AsanaEvent>,
}

#[derive(Debug, Deserialize)]
pub struct AsanaEvent {
    pub action: String,
    pub resource: AsanaResource,
    pub parent: Option<AsanaResource>,
    pub user: Option<AsanaResource>,
    pub change: Option<AsanaChange>,
}

#[derive(Debug, Deserialize)]
pub struct AsanaResource {
    pub gid: String,
    #[serde(default)]
    pub resource_type: String,
    pub resource_subtype: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AsanaChange {
    pub field: Option<String>,
    pub new_value: Option<Value>,
}

impl AsanaEvent {
    fn author(&self) -> Author {
        Author {
            id: self.user.as_ref().map(|u| u.gid.clone()),
            name: None,
            integration_app: false,
        }
    }

    pub fn to_sync_event(&self) -> Option<SyncEvent> {
        match (self.action.as_str(), self.resource.resource_type.as_str()) {
            ("changed", "task") => {
                let field_id = match &self.change {
                    Some(change) => match change.field.as_deref() {
                        Some("custom_fields") => change
                            .new_value
                            .as_ref()
                            .and_then(|v| v.get("gid"))
                            .and_then(Value::as_str)
                            .map(String::from),
                        None => None,
                        Some(_) => return None,
                    },
                    None => None,
                };
                Some(SyncEvent::TaskFieldChanged {
                    task_id: self.resource.gid.clone(),
                    field_id,
                    author: self.author(),
                })
            }
            ("added", "story") => {
                if self
                    .resource
                    .resource_subtype
                    .as_deref()
                    .is_some_and(|s| s != "comment_added")
                {
                    return None;
                }
                let parent = self.parent.as_ref().filter(|p| p.resource_type == "task")?;
                Some(SyncEvent::TaskCommented {
                    task_id: parent.gid.clone(),
                    story_id: self.resource.gid.clone(),
                    author: self.author(),
                })
            }
            _ => None,
        }
    }
}

impl AsanaWebhook {
    /// Relevant events, in delivery order, without repeats.
    pub fn sync_events(&self) -> Vec<SyncEvent> {
        let mut events: Vec<SyncEvent> = Vec::new();
        for event in self.events.iter().filter_map(AsanaEvent::to_sync_event) {
            if !events.contains(&event) {
                events.push(event);
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ticket::TicketKind;
    use serde_json::json;

    #[test]
    fn canvas_request_finds_ticket_and_inputs() {
        let request: CanvasRequest = serde_json::from_value(json!({
            "component_id": "create_task",
            "input_values": {"title": "  Login broken ", "description": ""},
            "conversation": {"id": 123, "ticket": {"id": "9"}},
            "contact": {"id": "c1"}
        }))
        .unwrap();

        assert_eq!(request.ticket_ref(), Some(TicketRef::ticket("123")));
        assert_eq!(request.contact_id().as_deref(), Some("c1"));
        assert_eq!(request.input_text("title").as_deref(), Some("Login broken"));
        assert_eq!(request.input_text("description"), None);
    }

    #[test]
    fn plain_conversation_is_not_a_ticket() {
        let request: CanvasRequest =
            serde_json::from_value(json!({"conversation": {"id": "55", "ticket": null}})).unwrap();
        assert_eq!(request.ticket_ref().unwrap().kind, TicketKind::Conversation);
        assert!(CanvasRequest::default().ticket_ref().is_none());
    }

    #[test]
    fn admin_note_becomes_note_event() {
        let event = intercom_event(&json!({
            "topic": "conversation.admin.noted",
            "data": {"item": {
                "type": "conversation",
                "id": "77",
                "conversation_parts": {"conversation_parts": [
                    {"part_type": "comment", "body": "<p>hi</p>"},
                    {"part_type": "note", "body": "<p>check logs</p>",
                     "author": {"type": "admin", "id": 5, "name": "Ada"}}
                ]}
            }}
        }))
        .unwrap();

        assert_eq!(
            event,
            SyncEvent::NoteAdded {
                ticket: TicketRef::conversation("77"),
                body: "<p>check logs</p>".into(),
                author: Author {
                    id: Some("5".into()),
                    name: Some("Ada".into()),
                    integration_app: false,
                },
            }
        );
    }

    #[test]
    fn bot_authored_ticket_note_is_marked() {
        let event = intercom_event(&json!({
            "topic": "ticket.note.created",
            "data": {"item": {
                "type": "ticket",
                "id": "T1",
                "ticket_parts": {"ticket_parts": [
                    {"part_type": "note", "body": "<p>auto</p>", "author": {"type": "bot", "id": "1"}}
                ]}
            }}
        }))
        .unwrap();
        let SyncEvent::NoteAdded { ticket, author, .. } = &event else {
            panic!("expected a note event, got {event:?}");
        };
        assert!(author.integration_app);
        assert_eq!(ticket.id, "T1");
        assert_eq!(event.source_id(), "T1");
    }

    #[test]
    fn state_update_carries_state_id() {
        let event = intercom_event(&json!({
            "topic": "ticket.state.updated",
            "data": {"item": {"type": "ticket", "id": "T1", "ticket_state": {"id": 3}}}
        }))
        .unwrap();
        assert!(matches!(
            event,
            SyncEvent::TicketStatusChanged { state_id: Some(ref id), .. } if id == "3"
        ));
    }

    #[test]
    fn other_topics_are_ignored() {
        assert!(intercom_event(&json!({"topic": "ping", "data": {"item": {"id": "1"}}})).is_none());
        assert!(intercom_event(&json!({"topic": "conversation.admin.noted"})).is_none());
    }

    #[test]
    fn asana_events_map_to_sync_events() {
        let webhook: AsanaWebhook = serde_json::from_value(json!({"events": [
            {"action": "changed",
             "resource": {"gid": "A1", "resource_type": "task"},
             "user": {"gid": "u1", "resource_type": "user"},
             "change": {"field": "custom_fields", "action": "changed",
                        "new_value": {"gid": "f-status", "resource_type": "custom_field"}}},
            {"action": "changed",
             "resource": {"gid": "A1", "resource_type": "task"},
             "user": {"gid": "u1", "resource_type": "user"},
             "change": {"field": "custom_fields", "action": "changed",
                        "new_value": {"gid": "f-status", "resource_type": "custom_field"}}},
            {"action": "changed",
             "resource": {"gid": "A1", "resource_type": "task"},
             "change": {"field": "name", "action": "changed"}},
            {"action": "added",
             "resource": {"gid": "s1", "resource_type": "story", "resource_subtype": "comment_added"},
             "parent": {"gid": "A1", "resource_type": "task"},
             "user": {"gid": "u2", "resource_type": "user"}},
            {"action": "added",
             "resource": {"gid": "s2", "resource_type": "story", "resource_subtype": "assigned"},
             "parent": {"gid": "A1", "resource_type": "task"}}
        ]}))
        .unwrap();

        let events = webhook.sync_events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            SyncEvent::TaskFieldChanged {
                task_id: "A1".into(),
                field_id: Some("f-status".into()),
                author: Author {
                    id: Some("u1".into()),
                    name: None,
                    integration_app: false,
                },
            }
        );
        assert!(matches!(
            &events[1],
            SyncEvent::TaskCommented { task_id, story_id, .. } if task_id == "A1" && story_id == "s1"
        ));
    }
}
