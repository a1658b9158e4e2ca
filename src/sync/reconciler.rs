use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::convert::{convert_attribute, extract_attachment_refs, fixed_zone, to_enum_option_id};
use super::fields::{CriticalFields, FieldMapper, FieldMapping};
use super::links::{LinkResolver, Recorded};
use super::provenance::{self, Direction, LoopCheck, LoopGuard};
use super::relay::{AttachmentRelay, NO_URL_SENTINEL};
use super::status::{plan_status_update, status_labels, StatusPlan, StatusPolicy};
use crate::config::{AppConfig, FieldMapEntry, FileAttributeEntry};
use crate::model::attachment::{AttachmentRef, RelayReport, RelayStatus};
use crate::model::event::{Author, SyncEvent, System};
use crate::model::task::{NewTask, Task};
use crate::model::ticket::{Ticket, TicketKind, TicketRef};
use crate::providers::{ApiError, InboxSystem, TaskSystem};
use crate::util::html;

/// Everything the reconciler needs from configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub project_id: String,
    pub critical: CriticalFields,
    pub link_attribute: String,
    pub zone: FixedOffset,
    pub policy: StatusPolicy,
    pub field_map: Vec<FieldMapEntry>,
    pub file_attributes: Vec<FileAttributeEntry>,
    pub tasks_integration_user: Option<String>,
}

impl SyncSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let sync = &config.sync;
        Self {
            project_id: config
                .asana
                .as_ref()
                .map(|a| a.project_id.clone())
                .unwrap_or_default(),
            critical: CriticalFields {
                ticket_field: sync.ticket_field_name.clone(),
                status_field: sync.status_field_name.clone(),
            },
            link_attribute: sync.link_attribute.clone(),
            zone: fixed_zone(sync.utc_offset_hours).unwrap_or_else(|| Utc.fix()),
            policy: StatusPolicy {
                close_statuses: sync.close_statuses.clone(),
                keep_open_statuses: sync.keep_open_statuses.clone(),
            },
            field_map: sync.field_map.clone(),
            file_attributes: sync.file_attributes.clone(),
            tasks_integration_user: config
                .asana
                .as_ref()
                .and_then(|a| a.integration_user_id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    Unlinked {
        ticket: Ticket,
    },
    Linked {
        ticket: Ticket,
        task_id: String,
        task_url: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub ticket: TicketRef,
    /// Title typed into the card; the ticket title is used when empty.
    pub title: Option<String>,
    pub description: Option<String>,
    pub contact_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created {
        task: Task,
        recorded: Recorded,
        files: Vec<RelayReport>,
    },
    AlreadyLinked {
        task_id: String,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilesOutcome {
    Synced {
        task_id: String,
        reports: Vec<RelayReport>,
    },
    NoFiles {
        task_id: String,
    },
    NotLinked,
    Failed(String),
}

/// Why an event produced no write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    Loop(&'static str),
    EmptyText,
    NotLinked,
    NotAComment,
    NotStatusField,
    StatusFieldMissing,
    EmptyStatus,
    NoMatchingState(String),
    NoMatchingOption(String),
    AlreadyInSync,
}

impl Skip {
    pub fn as_str(&self) -> &'static str {
        match self {
            Skip::Loop(reason) => *reason,
            Skip::EmptyText => "empty_text",
            Skip::NotLinked => "not_linked",
            Skip::NotAComment => "not_a_comment",
            Skip::NotStatusField => "not_status_field",
            Skip::StatusFieldMissing => "status_field_missing",
            Skip::EmptyStatus => "empty_status",
            Skip::NoMatchingState(_) => "no_matching_state",
            Skip::NoMatchingOption(_) => "no_matching_option",
            Skip::AlreadyInSync => "already_in_sync",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    CommentAdded {
        task_id: String,
    },
    NoteAdded {
        ticket_id: String,
    },
    TicketStateUpdated {
        ticket_id: String,
        state_id: String,
        close: bool,
    },
    TaskStatusUpdated {
        task_id: String,
        option_id: String,
    },
    ConversationClosed {
        conversation_id: String,
    },
    Skipped(Skip),
    Failed(String),
}

impl EventOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            EventOutcome::CommentAdded { .. } => "comment_added",
            EventOutcome::NoteAdded { .. } => "note_added",
            EventOutcome::TicketStateUpdated { .. } => "ticket_state_updated",
            EventOutcome::TaskStatusUpdated { .. } => "task_status_updated",
            EventOutcome::ConversationClosed { .. } => "conversation_closed",
            EventOutcome::Skipped(_) => "skipped",
            EventOutcome::Failed(_) => "failed",
        }
    }

    /// JSON acknowledgement for a webhook delivery.
    pub fn to_json(&self) -> Value {
        match self {
            EventOutcome::Skipped(skip) => json!({ "status": "skipped", "reason": skip.as_str() }),
            EventOutcome::Failed(message) => json!({ "status": "failed", "error": message }),
            applied => json!({ "status": applied.status() }),
        }
    }
}

fn destination_text(report: &RelayReport) -> &str {
    report.destination_url.as_deref().unwrap_or(NO_URL_SENTINEL)
}

fn files_summary(reports: &[RelayReport]) -> String {
    let synced = reports
        .iter()
        .filter(|r| r.status == RelayStatus::Success)
        .count();
    let mut lines = vec![format!(
        "Files synced to task ({synced} of {}):",
        reports.len()
    )];
    for report in reports {
        let name = report
            .source
            .filename
            .as_deref()
            .unwrap_or(&report.source.url);
        let result = match report.status {
            RelayStatus::Success => destination_text(report),
            status => status.as_str(),
        };
        lines.push(format!("{name}: {result}"));
    }
    lines.join("\n")
}

fn task_notes(request: &CreateTaskRequest, ticket: &Ticket, requester: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(description) = request
        .description
        .as_deref()
        .or(ticket.description.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        parts.push(html::html_to_text(description));
    }
    let mut footer = Vec::new();
    if let Some(name) = requester {
        footer.push(format!("Requester: {name}"));
    }
    match &ticket.url {
        Some(url) => footer.push(format!("Intercom {}: {url}", ticket.reference.kind.as_str())),
        None => footer.push(format!(
            "Intercom {} {}",
            ticket.reference.kind.as_str(),
            ticket.id()
        )),
    }
    parts.push(footer.join("\n"));
    parts.join("\n\n")
}

/// Applies inbound events from either system to its counterpart.
pub struct SyncReconciler {
    inbox: Arc<dyn InboxSystem>,
    tasks: Arc<dyn TaskSystem>,
    fields: FieldMapper,
    links: LinkResolver,
    relay: AttachmentRelay,
    guard: LoopGuard,
    settings: SyncSettings,
}

impl SyncReconciler {
    pub fn new(
        inbox: Arc<dyn InboxSystem>,
        tasks: Arc<dyn TaskSystem>,
        client: reqwest::Client,
        settings: SyncSettings,
    ) -> Self {
        Self {
            fields: FieldMapper::new(
                tasks.clone(),
                settings.project_id.clone(),
                settings.critical.clone(),
            ),
            links: LinkResolver::new(
                settings.link_attribute.clone(),
                settings.critical.ticket_field.clone(),
            ),
            relay: AttachmentRelay::new(client, tasks.clone()),
            guard: LoopGuard {
                tasks_integration_user: settings.tasks_integration_user.clone(),
            },
            inbox,
            tasks,
            settings,
        }
    }

    /// Drops the cached field schema and loads it again.
    pub async fn refresh_fields(&self) -> Result<Arc<FieldMapping>, ApiError> {
        self.fields.invalidate();
        self.fields.refresh().await
    }

    pub async fn link_state(&self, ticket: &TicketRef) -> Result<LinkState, ApiError> {
        let ticket = self.inbox.get_ticket(ticket).await?;
        Ok(match self.links.task_for_ticket(&ticket) {
            Some((task_id, _)) => {
                let task_url = match self.tasks.get_task(&task_id).await {
                    Ok(task) => task.url,
                    Err(e) => {
                        debug!(task = %task_id, error = %e, "linked task not readable");
                        None
                    }
                };
                LinkState::Linked {
                    ticket,
                    task_id,
                    task_url,
                }
            }
            None => LinkState::Unlinked { ticket },
        })
    }

    async fn requester_name(&self, contact_id: Option<&str>) -> Option<String> {
        let contact_id = contact_id?;
        match self.inbox.contact_name(contact_id).await {
            Ok(name) => name,
            Err(e) => {
                debug!(contact = contact_id, error = %e, "contact name unavailable");
                None
            }
        }
    }

    async fn status_option_id(&self, field_id: &str, labels: &[&str]) -> Option<String> {
        for label in labels {
            if let Some(id) = to_enum_option_id(self.tasks.as_ref(), field_id, label).await {
                return Some(id);
            }
        }
        None
    }

    /// Mapped ticket attributes converted to task field values. Unconvertible
    /// values and unknown fields are left out.
    async fn mapped_fields(&self, ticket: &Ticket, mapping: &FieldMapping) -> Map<String, Value> {
        let conversions = self.settings.field_map.iter().filter_map(|entry| {
            let Some(field) = mapping.get(&entry.field) else {
                debug!(field = %entry.field, "mapped field not in project; skipped");
                return None;
            };
            let value = ticket
                .attributes
                .get(&entry.attribute)
                .filter(|v| !v.is_null())?;
            Some(async move {
                convert_attribute(
                    self.tasks.as_ref(),
                    field,
                    value,
                    entry.format,
                    &self.settings.zone,
                )
                .await
                .map(|converted| (field.id.clone(), converted))
            })
        });
        let mut fields: Map<String, Value> = join_all(conversions).await.into_iter().flatten().collect();

        if let (Some(state), Some(status)) = (&ticket.state, mapping.status_field()) {
            if let Some(option_id) = self.status_option_id(&status.id, &status_labels(state)).await {
                fields.insert(status.id.clone(), Value::String(option_id));
            }
        }
        fields
    }

    /// Creates the task for a ticket once. A ticket that already carries a
    /// link is never given a second task.
    pub async fn create_task(&self, request: &CreateTaskRequest) -> CreateOutcome {
        let (ticket, mapping, requester) = tokio::join!(
            self.inbox.get_ticket(&request.ticket),
            self.fields.snapshot(),
            self.requester_name(request.contact_id.as_deref()),
        );
        let ticket = match ticket {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(ticket = %request.ticket.id, error = %e, "ticket fetch failed");
                return CreateOutcome::Failed(format!("Could not load the ticket: {e}"));
            }
        };

        if let Some((task_id, source)) = self.links.task_for_ticket(&ticket) {
            info!(ticket = %ticket.id(), task = %task_id, source = source.as_str(), "ticket already linked");
            return CreateOutcome::AlreadyLinked { task_id };
        }

        let requester = match request.contact_id {
            Some(_) => requester,
            None => {
                self.requester_name(ticket.contact_ids.first().map(String::as_str))
                    .await
            }
        };

        let name = request
            .title
            .as_deref()
            .or(ticket.title.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("Intercom {} {}", ticket.reference.kind.as_str(), ticket.id()));
        let new_task = NewTask {
            name,
            notes: task_notes(request, &ticket, requester.as_deref()),
            custom_fields: self.mapped_fields(&ticket, &mapping).await,
        };

        let task = match self.tasks.create_task(&new_task).await {
            Ok(task) => task,
            Err(e) => {
                warn!(ticket = %ticket.id(), error = %e, "task creation failed");
                return CreateOutcome::Failed(format!("Could not create the task: {e}"));
            }
        };
        info!(ticket = %ticket.id(), task = %task.id, "task created");

        let recorded = self
            .links
            .record(
                self.inbox.as_ref(),
                self.tasks.as_ref(),
                &request.ticket,
                &task.id,
                &mapping,
            )
            .await;
        let files = self.relay_file_attributes(&ticket, &task.id, &mapping).await;

        CreateOutcome::Created {
            task,
            recorded,
            files,
        }
    }

    /// Relays every configured file attribute onto the task and writes the new
    /// URLs into the attribute's target field when it has one.
    async fn relay_file_attributes(
        &self,
        ticket: &Ticket,
        task_id: &str,
        mapping: &FieldMapping,
    ) -> Vec<RelayReport> {
        let groups: Vec<(&FileAttributeEntry, Vec<AttachmentRef>)> = self
            .settings
            .file_attributes
            .iter()
            .filter_map(|entry| {
                let refs = extract_attachment_refs(ticket.attributes.get(&entry.attribute)?);
                (!refs.is_empty()).then_some((entry, refs))
            })
            .collect();

        let relayed = join_all(
            groups
                .iter()
                .map(|(_, refs)| self.relay.relay_all(refs, task_id)),
        )
        .await;

        let mut all = Vec::new();
        let mut writes = Map::new();
        for ((entry, _), reports) in groups.iter().zip(relayed) {
            if let Some(field) = entry.field.as_deref().and_then(|name| mapping.get(name)) {
                let urls: Vec<&str> = reports
                    .iter()
                    .filter(|r| r.status == RelayStatus::Success)
                    .map(destination_text)
                    .collect();
                if !urls.is_empty() {
                    writes.insert(field.id.clone(), Value::String(urls.join("\n")));
                }
            }
            all.extend(reports);
        }

        if !writes.is_empty() {
            if let Err(e) = self.tasks.set_custom_fields(task_id, &writes).await {
                warn!(task = task_id, error = %e, "could not write attachment links");
            }
        }
        all
    }

    /// Re-hosts a linked ticket's files on its task and leaves a note listing
    /// what happened to each one.
    pub async fn sync_files(&self, ticket: &TicketRef) -> FilesOutcome {
        let (fetched, mapping) = tokio::join!(self.inbox.get_ticket(ticket), self.fields.snapshot());
        let fetched = match fetched {
            Ok(t) => t,
            Err(e) => {
                warn!(ticket = %ticket.id, error = %e, "ticket fetch failed");
                return FilesOutcome::Failed(format!("Could not load the ticket: {e}"));
            }
        };
        let Some((task_id, _)) = self.links.task_for_ticket(&fetched) else {
            return FilesOutcome::NotLinked;
        };

        let reports = self.relay_file_attributes(&fetched, &task_id, &mapping).await;
        if reports.is_empty() {
            return FilesOutcome::NoFiles { task_id };
        }

        let note = html::text_to_html(&provenance::tagged(
            Direction::TasksToInbox,
            "",
            &files_summary(&reports),
        ));
        if let Err(e) = self.inbox.add_note(ticket, &note).await {
            warn!(ticket = %ticket.id, error = %e, "could not add file summary note");
        }
        FilesOutcome::Synced { task_id, reports }
    }

    pub async fn handle(&self, event: SyncEvent) -> EventOutcome {
        let kind = event.kind();
        let source_id = event.source_id().to_string();

        let outcome = match event {
            SyncEvent::NoteAdded {
                ticket,
                body,
                author,
            } => self.note_to_comment(&ticket, &body, &author).await,
            SyncEvent::TaskCommented {
                task_id,
                story_id,
                author,
            } => self.comment_to_note(&task_id, &story_id, &author).await,
            SyncEvent::TaskFieldChanged {
                task_id,
                field_id,
                author,
            } => {
                self.task_status_to_ticket(&task_id, field_id.as_deref(), &author)
                    .await
            }
            SyncEvent::TicketStatusChanged {
                ticket,
                state_id,
                author,
            } => {
                self.ticket_status_to_task(&ticket, state_id.as_deref(), &author)
                    .await
            }
        };

        match &outcome {
            EventOutcome::Skipped(skip) => {
                debug!(kind, id = %source_id, reason = skip.as_str(), "event skipped")
            }
            EventOutcome::Failed(message) => {
                warn!(kind, id = %source_id, error = %message, "event failed")
            }
            applied => info!(kind, id = %source_id, outcome = ?applied, "event applied"),
        }
        outcome
    }

    async fn note_to_comment(&self, ticket: &TicketRef, body: &str, author: &Author) -> EventOutcome {
        let text = html::html_to_text(body);
        let images: Vec<AttachmentRef> = html::image_sources(body)
            .into_iter()
            .map(AttachmentRef::from_url)
            .collect();

        let text = match self.guard.check(System::Inbox, author, &text) {
            LoopCheck::Relay(text) => text,
            LoopCheck::Empty if images.is_empty() => return EventOutcome::Skipped(Skip::EmptyText),
            LoopCheck::Empty => String::new(),
            check => return EventOutcome::Skipped(Skip::Loop(check.reason())),
        };

        let fetched = match self.inbox.get_ticket(ticket).await {
            Ok(t) => t,
            Err(e) => return EventOutcome::Failed(format!("ticket fetch failed: {e}")),
        };
        let Some((task_id, _)) = self.links.task_for_ticket(&fetched) else {
            return EventOutcome::Skipped(Skip::NotLinked);
        };

        let mut parts = vec![text];
        if !images.is_empty() {
            let reports = self.relay.relay_all(&images, &task_id).await;
            let uploaded: Vec<&str> = reports
                .iter()
                .filter(|r| r.status == RelayStatus::Success)
                .map(destination_text)
                .collect();
            if !uploaded.is_empty() {
                parts.push(format!("Attachments:\n{}", uploaded.join("\n")));
            }
        }
        let body = parts.join("\n\n");
        if body.trim().is_empty() {
            return EventOutcome::Skipped(Skip::EmptyText);
        }

        let comment = provenance::tagged(Direction::InboxToTasks, author.display_name(), &body);
        match self.tasks.add_comment(&task_id, &comment).await {
            Ok(()) => EventOutcome::CommentAdded { task_id },
            Err(e) => EventOutcome::Failed(format!("comment failed: {e}")),
        }
    }

    async fn comment_to_note(&self, task_id: &str, story_id: &str, author: &Author) -> EventOutcome {
        let story = match self.tasks.get_story(story_id).await {
            Ok(story) => story,
            Err(e) => return EventOutcome::Failed(format!("story fetch failed: {e}")),
        };
        if !story.is_comment {
            return EventOutcome::Skipped(Skip::NotAComment);
        }

        let author = Author {
            id: story.author_id.clone().or_else(|| author.id.clone()),
            name: story.author_name.clone().or_else(|| author.name.clone()),
            integration_app: author.integration_app || story.source.as_deref() == Some("api"),
        };
        let text = match self.guard.check(System::Tasks, &author, &story.text) {
            LoopCheck::Relay(text) => text,
            LoopCheck::Empty => return EventOutcome::Skipped(Skip::EmptyText),
            check => return EventOutcome::Skipped(Skip::Loop(check.reason())),
        };

        let task_id = story.task_id.as_deref().unwrap_or(task_id);
        let (task, mapping) = tokio::join!(self.tasks.get_task(task_id), self.fields.snapshot());
        let task = match task {
            Ok(task) => task,
            Err(e) => return EventOutcome::Failed(format!("task fetch failed: {e}")),
        };
        let Some((ticket, source)) = self.links.ticket_for_task(&task, &mapping) else {
            return EventOutcome::Skipped(Skip::NotLinked);
        };
        debug!(
            task = %task.id,
            ticket = %ticket.id,
            kind = ticket.kind.as_str(),
            source = source.as_str(),
            "link resolved"
        );

        let note = html::text_to_html(&provenance::tagged(
            Direction::TasksToInbox,
            author.display_name(),
            &text,
        ));
        match self.inbox.add_note(&ticket, &note).await {
            Ok(()) => EventOutcome::NoteAdded { ticket_id: ticket.id },
            Err(e) => EventOutcome::Failed(format!("note failed: {e}")),
        }
    }

    async fn task_status_to_ticket(
        &self,
        task_id: &str,
        field_id: Option<&str>,
        author: &Author,
    ) -> EventOutcome {
        if self.guard.is_integration_author(System::Tasks, author) {
            return EventOutcome::Skipped(Skip::Loop(LoopCheck::IntegrationAuthored.reason()));
        }

        let mapping = self.fields.snapshot().await;
        let Some(status_field) = mapping.status_field() else {
            return EventOutcome::Skipped(Skip::StatusFieldMissing);
        };
        if field_id.is_some_and(|id| !mapping.is_status_field(id)) {
            return EventOutcome::Skipped(Skip::NotStatusField);
        }

        let task = match self.tasks.get_task(task_id).await {
            Ok(task) => task,
            Err(e) => return EventOutcome::Failed(format!("task fetch failed: {e}")),
        };
        let Some(label) = task
            .field_by_id(&status_field.id)
            .and_then(|v| v.display.clone())
            .filter(|l| !l.trim().is_empty())
        else {
            return EventOutcome::Skipped(Skip::EmptyStatus);
        };
        let Some((ticket_ref, _)) = self.links.ticket_for_task(&task, &mapping) else {
            return EventOutcome::Skipped(Skip::NotLinked);
        };
        if ticket_ref.kind == TicketKind::Conversation {
            return self.task_status_to_conversation(&ticket_ref, label).await;
        }

        let ticket_id = ticket_ref.id.clone();
        let (ticket, states) = tokio::join!(self.inbox.get_ticket(&ticket_ref), self.inbox.ticket_states());
        let (ticket, states) = match (ticket, states) {
            (Ok(ticket), Ok(states)) => (ticket, states),
            (Err(e), _) | (_, Err(e)) => {
                return EventOutcome::Failed(format!("ticket or state catalog fetch failed: {e}"))
            }
        };

        match plan_status_update(&label, &states, &ticket, &self.settings.policy) {
            StatusPlan::NoMatch => {
                info!(
                    ticket = %ticket_id,
                    status = %label,
                    ticket_type = ?ticket.ticket_type_id,
                    "no ticket state matches task status"
                );
                EventOutcome::Skipped(Skip::NoMatchingState(label))
            }
            StatusPlan::Unchanged { .. } => EventOutcome::Skipped(Skip::AlreadyInSync),
            StatusPlan::Update { state_id, close } => {
                match self.inbox.update_state(&ticket_id, &state_id, close).await {
                    Ok(()) => EventOutcome::TicketStateUpdated {
                        ticket_id,
                        state_id,
                        close,
                    },
                    Err(e) => EventOutcome::Failed(format!("state update failed: {e}")),
                }
            }
        }
    }

    /// Conversations have no states to move between; a closing status closes them.
    async fn task_status_to_conversation(&self, conversation: &TicketRef, label: String) -> EventOutcome {
        if !self.settings.policy.closes_label(&label) {
            return EventOutcome::Skipped(Skip::NoMatchingState(label));
        }
        match self.inbox.get_ticket(conversation).await {
            Ok(fetched) if !fetched.open => return EventOutcome::Skipped(Skip::AlreadyInSync),
            Ok(_) => {}
            Err(e) => return EventOutcome::Failed(format!("conversation fetch failed: {e}")),
        }
        match self.inbox.close_conversation(&conversation.id).await {
            Ok(()) => EventOutcome::ConversationClosed {
                conversation_id: conversation.id.clone(),
            },
            Err(e) => EventOutcome::Failed(format!("conversation close failed: {e}")),
        }
    }

    async fn ticket_status_to_task(
        &self,
        ticket: &TicketRef,
        state_id: Option<&str>,
        author: &Author,
    ) -> EventOutcome {
        if self.guard.is_integration_author(System::Inbox, author) {
            return EventOutcome::Skipped(Skip::Loop(LoopCheck::IntegrationAuthored.reason()));
        }

        let (fetched, states, mapping) = tokio::join!(
            self.inbox.get_ticket(ticket),
            self.inbox.ticket_states(),
            self.fields.snapshot(),
        );
        let fetched = match fetched {
            Ok(t) => t,
            Err(e) => return EventOutcome::Failed(format!("ticket fetch failed: {e}")),
        };
        let Some((task_id, _)) = self.links.task_for_ticket(&fetched) else {
            return EventOutcome::Skipped(Skip::NotLinked);
        };
        let Some(status_field) = mapping.status_field() else {
            return EventOutcome::Skipped(Skip::StatusFieldMissing);
        };

        let catalog = states.unwrap_or_else(|e| {
            debug!(error = %e, "state catalog unavailable; using the ticket's own state");
            Vec::new()
        });
        let state = state_id
            .and_then(|id| catalog.iter().find(|s| s.id == id))
            .or(fetched.state.as_ref());
        let labels = state.map(status_labels).unwrap_or_default();
        if labels.is_empty() {
            return EventOutcome::Skipped(Skip::EmptyStatus);
        }

        let task = match self.tasks.get_task(&task_id).await {
            Ok(task) => task,
            Err(e) => return EventOutcome::Failed(format!("task fetch failed: {e}")),
        };
        let current = task
            .field_by_id(&status_field.id)
            .and_then(|v| v.display.as_deref())
            .map(str::trim);
        if current.is_some_and(|c| labels.iter().any(|l| l.eq_ignore_ascii_case(c))) {
            return EventOutcome::Skipped(Skip::AlreadyInSync);
        }

        let Some(option_id) = self.status_option_id(&status_field.id, &labels).await else {
            return EventOutcome::Skipped(Skip::NoMatchingOption(labels.join(" / ")));
        };
        let mut fields = Map::new();
        fields.insert(status_field.id.clone(), Value::String(option_id.clone()));
        match self.tasks.set_custom_fields(&task_id, &fields).await {
            Ok(()) => EventOutcome::TaskStatusUpdated { task_id, option_id },
            Err(e) => EventOutcome::Failed(format!("status write failed: {e}")),
        }
    }
}
