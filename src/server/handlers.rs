use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::cards::{self, CardAction};
use super::payload::{intercom_event, AsanaWebhook, CanvasRequest};
use super::verify::{verify_asana, verify_intercom_canvas, verify_intercom_webhook, HOOK_SECRET_HEADER};
use super::AppState;
use crate::model::attachment::RelayStatus;
use crate::model::ticket::TicketRef;
use crate::sync::reconciler::{
    CreateOutcome, CreateTaskRequest, FilesOutcome, LinkState, SyncReconciler,
};

type JsonReply = (StatusCode, Json<Value>);

fn status(code: StatusCode, status: &str) -> JsonReply {
    (code, Json(json!({ "status": status })))
}

fn card(card: Value) -> JsonReply {
    (StatusCode::OK, Json(card))
}

pub(super) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Card for the ticket as it is now, with an optional line on top.
async fn current_card(sync: &SyncReconciler, ticket: &TicketRef, notice: Option<&str>) -> Value {
    match sync.link_state(ticket).await {
        Ok(LinkState::Unlinked { ticket }) => cards::create_form(&ticket, notice),
        Ok(LinkState::Linked {
            task_id, task_url, ..
        }) => cards::linked(&task_id, task_url.as_deref(), notice),
        Err(e) => {
            warn!(ticket = %ticket.id, error = %e, "could not load ticket for card");
            cards::error(&format!("Could not load this {}: {e}", ticket.kind.as_str()))
        }
    }
}

fn canvas_request(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<CanvasRequest, JsonReply> {
    if let Err(reason) = verify_intercom_canvas(state.intercom_secret.as_deref(), headers, body) {
        return Err(status(StatusCode::UNAUTHORIZED, reason));
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "unreadable card request");
        card(cards::error("Could not read this request."))
    })
}

pub(super) async fn intercom_initialize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = match canvas_request(&state, &headers, &body) {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    let Some(ticket) = request.ticket_ref() else {
        return card(cards::error("Open this app from a conversation or ticket."));
    };
    card(current_card(&state.sync, &ticket, None).await)
}

pub(super) async fn intercom_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = match canvas_request(&state, &headers, &body) {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    let Some(ticket) = request.ticket_ref() else {
        return card(cards::error("Open this app from a conversation or ticket."));
    };
    let component_id = request.component_id.clone().unwrap_or_default();
    let action = match component_id.parse::<CardAction>() {
        Ok(action) => action,
        Err(unknown) => {
            warn!(component = %unknown.0, "unknown card action");
            return card(cards::error(&format!("Unknown action \"{}\".", unknown.0)));
        }
    };
    info!(ticket = %ticket.id, action = %action, "card action");

    let sync = &state.sync;
    let reply = match action {
        CardAction::CreateTask => {
            let create = CreateTaskRequest {
                ticket: ticket.clone(),
                title: request.input_text("title"),
                description: request.input_text("description"),
                contact_id: request.contact_id(),
            };
            match sync.create_task(&create).await {
                CreateOutcome::Created { task, files, .. } => {
                    let mut notice = String::from("Task created.");
                    if !files.is_empty() {
                        let ok = files.iter().filter(|f| f.status == RelayStatus::Success).count();
                        notice.push_str(&format!(" {ok} of {} files attached.", files.len()));
                    }
                    cards::linked(&task.id, task.url.as_deref(), Some(&notice))
                }
                CreateOutcome::AlreadyLinked { .. } => {
                    current_card(sync, &ticket, Some("A task already exists for this ticket.")).await
                }
                CreateOutcome::Failed(message) => cards::error(&message),
            }
        }
        CardAction::SyncFiles => match sync.sync_files(&ticket).await {
            FilesOutcome::Synced { reports, .. } => {
                let ok = reports.iter().filter(|r| r.status == RelayStatus::Success).count();
                let notice = format!("Synced {ok} of {} files.", reports.len());
                current_card(sync, &ticket, Some(&notice)).await
            }
            FilesOutcome::NoFiles { .. } => current_card(sync, &ticket, Some("No files to sync.")).await,
            FilesOutcome::NotLinked => {
                current_card(sync, &ticket, Some("Create a task before syncing files.")).await
            }
            FilesOutcome::Failed(message) => cards::error(&message),
        },
        CardAction::Refresh => {
            let notice = match sync.refresh_fields().await {
                Ok(mapping) => format!("Field mapping reloaded ({} fields).", mapping.len()),
                Err(e) => {
                    warn!(error = %e, "field mapping refresh failed");
                    format!("Field mapping could not be reloaded: {e}")
                }
            };
            current_card(sync, &ticket, Some(&notice)).await
        }
    };
    card(reply)
}

pub(super) async fn intercom_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(reason) = verify_intercom_webhook(state.intercom_secret.as_deref(), &headers, &body) {
        return status(StatusCode::UNAUTHORIZED, reason);
    }
    // Malformed deliveries are acknowledged so the sender does not retry them.
    let notification: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "unreadable notification");
            return status(StatusCode::OK, "bad_json");
        }
    };

    let Some(event) = intercom_event(&notification) else {
        let topic = notification
            .get("topic")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        debug!(topic, "notification ignored");
        return status(StatusCode::OK, "ignored");
    };
    let outcome = state.sync.handle(event).await;
    (StatusCode::OK, Json(outcome.to_json()))
}

pub(super) async fn asana_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Handshake: echo the secret and do nothing else.
    if let Some(secret) = headers.get(HOOK_SECRET_HEADER) {
        info!("webhook handshake received");
        let mut response = StatusCode::OK.into_response();
        response.headers_mut().insert(HOOK_SECRET_HEADER, secret.clone());
        return response;
    }

    if let Err(reason) = verify_asana(state.asana_secret.as_deref(), &headers, &body) {
        return status(StatusCode::UNAUTHORIZED, reason).into_response();
    }
    let webhook: AsanaWebhook = match serde_json::from_slice(&body) {
        Ok(webhook) => webhook,
        Err(e) => {
            warn!(error = %e, "unreadable webhook batch");
            return status(StatusCode::OK, "bad_json").into_response();
        }
    };

    let events = webhook.sync_events();
    debug!(received = webhook.events.len(), relevant = events.len(), "webhook events");
    let mut results = Vec::with_capacity(events.len());
    for event in events {
        results.push(state.sync.handle(event).await.to_json());
    }
    (StatusCode::OK, Json(json!({ "status": "ok", "results": results }))).into_response()
}
