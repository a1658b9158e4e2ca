use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::fields::FieldMapping;
use crate::model::link::{LinkRecord, LinkSource};
use crate::model::task::Task;
use crate::model::ticket::{Ticket, TicketRef};
use crate::providers::{InboxSystem, TaskSystem};

/// Which of the three stores accepted a new link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recorded {
    pub ticket_attribute: bool,
    pub task_field: bool,
}

/// Resolves ticket/task pairs across the ticket attribute, the task's custom
/// field and an in-process map. Any one of them may be unavailable.
pub struct LinkResolver {
    link_attribute: String,
    ticket_field_name: String,
    memory: RwLock<HashMap<String, TicketRef>>,
}

impl LinkResolver {
    pub fn new(link_attribute: String, ticket_field_name: String) -> Self {
        Self {
            link_attribute,
            ticket_field_name,
            memory: RwLock::new(HashMap::new()),
        }
    }

    fn remembered_ticket(&self, task_id: &str) -> Option<TicketRef> {
        self.memory.read().ok()?.get(task_id).cloned()
    }

    fn remembered_task(&self, ticket: &TicketRef) -> Option<String> {
        self.memory
            .read()
            .ok()?
            .iter()
            .find(|(_, linked)| *linked == ticket)
            .map(|(task, _)| task.clone())
    }

    pub fn remember(&self, record: &LinkRecord) {
        if let Ok(mut memory) = self.memory.write() {
            memory.insert(record.task_id.clone(), record.ticket.clone());
        }
    }

    /// Record linked to `task`: field by id, then field by name, then memory.
    pub fn ticket_for_task(&self, task: &Task, mapping: &FieldMapping) -> Option<(TicketRef, LinkSource)> {
        let from_field = |text: Option<&String>, source: LinkSource| {
            text.and_then(|t| TicketRef::from_link_text(t))
                .map(|reference| (reference, source))
        };

        from_field(
            mapping
                .ticket_field()
                .and_then(|f| task.field_by_id(&f.id))
                .and_then(|v| v.display.as_ref()),
            LinkSource::TaskFieldById,
        )
        .or_else(|| {
            from_field(
                task.field_by_name(&self.ticket_field_name)
                    .and_then(|v| v.display.as_ref()),
                LinkSource::TaskFieldByName,
            )
        })
        .or_else(|| {
            self.remembered_ticket(&task.id)
                .map(|reference| (reference, LinkSource::Memory))
        })
    }

    /// Task linked to `ticket`: ticket attribute, then memory.
    pub fn task_for_ticket(&self, ticket: &Ticket) -> Option<(String, LinkSource)> {
        ticket
            .attribute_text(&self.link_attribute)
            .map(|id| (id, LinkSource::TicketAttribute))
            .or_else(|| {
                self.remembered_task(&ticket.reference)
                    .map(|id| (id, LinkSource::Memory))
            })
    }

    /// Records a new link on the ticket, then the task, then in memory.
    pub async fn record(
        &self,
        inbox: &dyn InboxSystem,
        tasks: &dyn TaskSystem,
        ticket: &TicketRef,
        task_id: &str,
        mapping: &FieldMapping,
    ) -> Recorded {
        let mut recorded = Recorded::default();

        let mut attributes = Map::new();
        attributes.insert(self.link_attribute.clone(), Value::String(task_id.to_string()));
        match inbox.set_attributes(ticket, &attributes).await {
            Ok(()) => recorded.ticket_attribute = true,
            Err(e) => warn!(ticket = %ticket.id, task = task_id, error = %e, "could not store link on ticket"),
        }

        if let Some(field) = mapping.ticket_field() {
            let mut fields = Map::new();
            fields.insert(field.id.clone(), Value::String(ticket.link_text()));
            match tasks.set_custom_fields(task_id, &fields).await {
                Ok(()) => recorded.task_field = true,
                Err(e) => warn!(ticket = %ticket.id, task = task_id, error = %e, "could not store link on task"),
            }
        } else {
            debug!(task = task_id, "no ticket id field; task-side link skipped");
        }

        self.remember(&LinkRecord {
            ticket: ticket.clone(),
            task_id: task_id.to_string(),
        });
        recorded
    }
}
