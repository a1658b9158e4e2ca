//! Provenance tags and the two loop guards.
//!
//! Every comment or note the bridge writes starts with a literal bracketed tag
//! naming where it came from, e.g. `[Intercom note by Ada]`. Inbound text that
//! starts with the tag of the opposite direction was written by the bridge and
//! is never relayed back. The tag text is a compatibility contract with notes
//! already stored in both systems; do not reword it.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::event::{Author, System};

const INBOX_TAG: &str = "Intercom note";
const TASKS_TAG: &str = "Asana comment";

/// Direction a piece of text travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    InboxToTasks,
    TasksToInbox,
}

impl Direction {
    pub fn from_source(source: System) -> Self {
        match source {
            System::Inbox => Direction::InboxToTasks,
            System::Tasks => Direction::TasksToInbox,
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Direction::InboxToTasks => Direction::TasksToInbox,
            Direction::TasksToInbox => Direction::InboxToTasks,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Direction::InboxToTasks => INBOX_TAG,
            Direction::TasksToInbox => TASKS_TAG,
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            INBOX_TAG => Some(Direction::InboxToTasks),
            TASKS_TAG => Some(Direction::TasksToInbox),
            _ => None,
        }
    }
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\[(Intercom note|Asana comment)(?: by [^\]\n]*)?\]\s*")
            .expect("valid regex")
    })
}

pub fn tag(direction: Direction, author: &str) -> String {
    let author = author.trim();
    if author.is_empty() {
        format!("[{}]", direction.label())
    } else {
        format!("[{} by {}]", direction.label(), author)
    }
}

pub fn tagged(direction: Direction, author: &str, text: &str) -> String {
    format!("{} {}", tag(direction, author), text.trim())
}

/// Direction of the provenance tag `text` starts with, if any.
pub fn leading_tag(text: &str) -> Option<Direction> {
    tag_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| Direction::from_label(m.as_str()))
}

/// `text` without one leading provenance tag.
pub fn strip_tag(text: &str) -> &str {
    match tag_re().find(text) {
        Some(m) => &text[m.end()..],
        None => text.trim_start(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCheck {
    /// Relay this text (tag already stripped).
    Relay(String),
    /// Text was written by the bridge travelling the other way.
    Echo,
    /// Source system marked the author as an integration app.
    IntegrationAuthored,
    Empty,
}

impl LoopCheck {
    pub fn reason(&self) -> &'static str {
        match self {
            LoopCheck::Relay(_) => "relay",
            LoopCheck::Echo => "echo",
            LoopCheck::IntegrationAuthored => "integration_authored",
            LoopCheck::Empty => "empty",
        }
    }
}

/// Both loop guards. Neither alone is sufficient: the tag guard only catches
/// text the bridge wrote, the author guard only catches writes by known apps.
#[derive(Debug, Clone, Default)]
pub struct LoopGuard {
    /// Task-system user the bridge writes as.
    pub tasks_integration_user: Option<String>,
}

impl LoopGuard {
    pub fn is_integration_author(&self, source: System, author: &Author) -> bool {
        if author.integration_app {
            return true;
        }
        match source {
            System::Tasks => match (&self.tasks_integration_user, &author.id) {
                (Some(bot), Some(id)) => bot == id,
                _ => false,
            },
            System::Inbox => false,
        }
    }

    pub fn check(&self, source: System, author: &Author, text: &str) -> LoopCheck {
        let authored_by_app = self.is_integration_author(source, author);
        let direction = Direction::from_source(source);
        let echo = leading_tag(text) == Some(direction.reverse());

        if authored_by_app {
            return LoopCheck::IntegrationAuthored;
        }
        if echo {
            return LoopCheck::Echo;
        }
        let cleaned = strip_tag(text).trim();
        if cleaned.is_empty() {
            return LoopCheck::Empty;
        }
        LoopCheck::Relay(cleaned.to_string())
    }
}
