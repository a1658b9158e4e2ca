use serde::{Deserialize, Serialize};

use super::ticket::TicketRef;

/// One ticket or conversation paired with one task. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRecord {
    pub ticket: TicketRef,
    pub task_id: String,
}

/// Which backing store answered a link lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSource {
    TicketAttribute,
    TaskFieldById,
    TaskFieldByName,
    Memory,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::TicketAttribute => "ticket_attribute",
            LinkSource::TaskFieldById => "task_field_id",
            LinkSource::TaskFieldByName => "task_field_name",
            LinkSource::Memory => "memory",
        }
    }
}
