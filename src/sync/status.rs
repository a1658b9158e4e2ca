use crate::model::ticket::{Ticket, TicketState};

const RESOLVED_CATEGORY: &str = "resolved";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedOn {
    InternalLabel,
    ExternalLabel,
    Category,
}

fn norm(text: &str) -> String {
    text.trim().to_lowercase()
}

/// States usable for a ticket of `ticket_type_id`; all states when the type is unknown.
pub fn applicable_states<'a>(
    states: &'a [TicketState],
    ticket_type_id: Option<&str>,
) -> Vec<&'a TicketState> {
    match ticket_type_id {
        Some(type_id) => states.iter().filter(|s| s.applies_to(type_id)).collect(),
        None => states.iter().collect(),
    }
}

/// First state matching `label` on internal label, then external label, then
/// category. Case-insensitive, whitespace-trimmed.
pub fn resolve_state<'a>(
    label: &str,
    states: &'a [TicketState],
    ticket_type_id: Option<&str>,
) -> Option<(&'a TicketState, MatchedOn)> {
    let wanted = norm(label);
    if wanted.is_empty() {
        return None;
    }
    let candidates = applicable_states(states, ticket_type_id);

    let passes: [(MatchedOn, fn(&TicketState) -> &str); 3] = [
        (MatchedOn::InternalLabel, |s| s.internal_label.as_str()),
        (MatchedOn::ExternalLabel, |s| s.external_label.as_str()),
        (MatchedOn::Category, |s| s.category.as_str()),
    ];
    passes.iter().find_map(|(matched_on, key)| {
        candidates
            .iter()
            .find(|s| norm(key(s)) == wanted)
            .map(|s| (*s, *matched_on))
    })
}

/// Allow/deny lists deciding whether a status also closes the ticket.
#[derive(Debug, Clone, Default)]
pub struct StatusPolicy {
    pub close_statuses: Vec<String>,
    pub keep_open_statuses: Vec<String>,
}

impl StatusPolicy {
    fn listed(list: &[String], label: &str) -> bool {
        let wanted = norm(label);
        list.iter().any(|l| norm(l) == wanted)
    }

    /// Close decision from the lists alone, for records without ticket states.
    pub fn closes_label(&self, label: &str) -> bool {
        !Self::listed(&self.keep_open_statuses, label) && Self::listed(&self.close_statuses, label)
    }

    pub fn should_close(&self, label: &str, state: &TicketState) -> bool {
        if Self::listed(&self.keep_open_statuses, label) {
            return false;
        }
        Self::listed(&self.close_statuses, label) || norm(&state.category) == RESOLVED_CATEGORY
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPlan {
    /// One write: move to `state_id`, closing in the same call when `close`.
    Update { state_id: String, close: bool },
    /// Ticket already reflects the status.
    Unchanged { state_id: String },
    NoMatch,
}

pub fn plan_status_update(
    label: &str,
    states: &[TicketState],
    ticket: &Ticket,
    policy: &StatusPolicy,
) -> StatusPlan {
    let Some((state, _)) = resolve_state(label, states, ticket.ticket_type_id.as_deref()) else {
        return StatusPlan::NoMatch;
    };
    let close = policy.should_close(label, state);
    let already_there = ticket.state.as_ref().map(|s| s.id.as_str()) == Some(state.id.as_str());
    if already_there && (!close || !ticket.open) {
        return StatusPlan::Unchanged {
            state_id: state.id.clone(),
        };
    }
    StatusPlan::Update {
        state_id: state.id.clone(),
        close,
    }
}

/// Labels a ticket state can appear as on the task, most preferred first.
pub fn status_labels(state: &TicketState) -> Vec<&str> {
    let mut labels: Vec<&str> = Vec::with_capacity(2);
    for label in [&state.external_label, &state.internal_label] {
        let label = label.trim();
        if !label.is_empty() && !labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            labels.push(label);
        }
    }
    labels
}
