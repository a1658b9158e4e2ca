//! HTTP surface: card endpoints for the inbox, webhook receivers for both systems.

mod cards;
mod handlers;
mod payload;
mod verify;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::sync::reconciler::SyncReconciler;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub struct AppState {
    pub sync: SyncReconciler,
    /// Secret from the task system handshake; signatures are only checked when set.
    pub asana_secret: Option<String>,
    /// Client secret of the inbox app, used for both webhook and card signatures.
    pub intercom_secret: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/intercom/initialize", post(handlers::intercom_initialize))
        .route("/intercom/submit", post(handlers::intercom_submit))
        .route("/intercom/webhook", post(handlers::intercom_webhook))
        .route("/asana/webhook", post(handlers::asana_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("deskbridge listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::model::task::FieldKind;
    use crate::model::ticket::TicketState;
    use crate::providers::tests::{MockInbox, MockTasks};
    use crate::providers::TaskSystem;
    use crate::sync::reconciler::SyncSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Map, Value};
    use tower::ServiceExt;

    struct TestApp {
        inbox: Arc<MockInbox>,
        tasks: Arc<MockTasks>,
        state: Arc<AppState>,
    }

    fn test_app(asana_secret: Option<&str>) -> TestApp {
        let tasks = Arc::new(MockTasks::with_fields(vec![
            MockTasks::field("f-ticket", "Intercom Ticket ID", FieldKind::ShortText),
            MockTasks::field("f-status", "Status", FieldKind::EnumChoice),
        ]));
        tasks.set_options("f-status", &["New", "In Progress", "Done"]);

        let inbox = Arc::new(MockInbox::default());
        *inbox.states.lock().unwrap() = ["New", "In Progress", "Done"]
            .iter()
            .enumerate()
            .map(|(i, label)| TicketState {
                id: (i + 1).to_string(),
                internal_label: label.to_string(),
                external_label: label.to_string(),
                category: (if *label == "Done" { "resolved" } else { "in_progress" }).into(),
                ticket_type_ids: vec!["K".into()],
            })
            .collect();
        let mut ticket = MockInbox::ticket("T1");
        ticket.ticket_type_id = Some("K".into());
        inbox.insert_ticket(ticket);

        let sync = SyncReconciler::new(
            inbox.clone(),
            tasks.clone(),
            reqwest::Client::new(),
            SyncSettings::from_config(&AppConfig::default()),
        );
        let state = Arc::new(AppState {
            sync,
            asana_secret: asana_secret.map(String::from),
            intercom_secret: None,
        });
        TestApp { inbox, tasks, state }
    }

    async fn post_json(app: &TestApp, path: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = router(app.state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn component_ids(card: &Value) -> Vec<String> {
        card.pointer("/canvas/content/components")
            .and_then(Value::as_array)
            .unwrap()
            .iter()
            .filter_map(|c| c.get("id").and_then(Value::as_str).map(String::from))
            .collect()
    }

    fn submit(component: &str) -> Value {
        json!({
            "component_id": component,
            "input_values": {"title": "Login broken"},
            "conversation": {"id": "T1", "type": "ticket"}
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = test_app(None);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = router(app.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn asana_handshake_echoes_secret() {
        let app = test_app(Some("configured"));
        let req = Request::builder()
            .method("POST")
            .uri("/asana/webhook")
            .header("X-Hook-Secret", "abc123")
            .body(Body::empty())
            .unwrap();
        let resp = router(app.state.clone()).oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("x-hook-secret").unwrap(), "abc123");
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn asana_bad_signature_is_rejected() {
        let app = test_app(Some("configured"));
        let body = json!({"events": []}).to_string();
        let req = Request::builder()
            .method("POST")
            .uri("/asana/webhook")
            .header("X-Hook-Signature", verify::sign_sha256("wrong", body.as_bytes()))
            .body(Body::from(body.clone()))
            .unwrap();
        let resp = router(app.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .method("POST")
            .uri("/asana/webhook")
            .header("X-Hook-Signature", verify::sign_sha256("configured", body.as_bytes()))
            .body(Body::from(body))
            .unwrap();
        let resp = router(app.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn initialize_shows_create_form_for_unlinked_ticket() {
        let app = test_app(None);
        let (status, card) = post_json(
            &app,
            "/intercom/initialize",
            json!({"conversation": {"id": "T1", "type": "ticket"}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(component_ids(&card), vec!["title", "description", "create_task"]);
    }

    async fn post_raw(app: &TestApp, path: &str, body: &'static str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .body(Body::from(body))
            .unwrap();
        let resp = router(app.state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn initialize_answers_bad_json_with_error_card() {
        let app = test_app(None);
        let (status, card) = post_raw(&app, "/intercom/initialize", "{not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(card.pointer("/canvas/content/components/0/style"), Some(&json!("error")));
    }

    #[tokio::test]
    async fn webhooks_acknowledge_bad_json() {
        let app = test_app(None);
        for path in ["/intercom/webhook", "/asana/webhook"] {
            let (status, body) = post_raw(&app, path, "{not json").await;
            assert_eq!(status, StatusCode::OK, "{path}");
            assert_eq!(body, json!({"status": "bad_json"}), "{path}");
        }
        assert!(app.tasks.comments.lock().unwrap().is_empty());
        assert!(app.inbox.state_writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submitting_create_twice_makes_one_task() {
        let app = test_app(None);

        let (_, first) = post_json(&app, "/intercom/submit", submit("create_task")).await;
        assert_eq!(component_ids(&first), vec!["open_task", "sync_files", "refresh"]);
        assert_eq!(first.pointer("/canvas/content/components/0/text"), Some(&json!("Task created.")));

        let (_, second) = post_json(&app, "/intercom/submit", submit("create_task")).await;
        assert_eq!(
            second.pointer("/canvas/content/components/0/text"),
            Some(&json!("A task already exists for this ticket."))
        );
        assert_eq!(app.tasks.created_count(), 1);
        assert_eq!(app.tasks.created.lock().unwrap()[0].name, "Login broken");
    }

    #[tokio::test]
    async fn unknown_component_returns_error_card() {
        let app = test_app(None);
        let (status, card) = post_json(&app, "/intercom/submit", submit("explode")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(card.pointer("/canvas/content/components/0/style"), Some(&json!("error")));
        assert_eq!(app.tasks.created_count(), 0);
    }

    #[tokio::test]
    async fn intercom_note_becomes_task_comment() {
        let app = test_app(None);
        post_json(&app, "/intercom/submit", submit("create_task")).await;

        let (status, body) = post_json(
            &app,
            "/intercom/webhook",
            json!({
                "topic": "ticket.note.created",
                "data": {"item": {
                    "type": "ticket",
                    "id": "T1",
                    "ticket_parts": {"ticket_parts": [
                        {"part_type": "note", "body": "<p>Please check logs</p>",
                         "author": {"type": "admin", "id": "5", "name": "Ada"}}
                    ]}
                }}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "comment_added"}));
        let comments = app.tasks.comments.lock().unwrap().clone();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, "A1");
        assert!(comments[0].1.contains("Please check logs"));
    }

    #[tokio::test]
    async fn unhandled_topic_is_ignored() {
        let app = test_app(None);
        let (status, body) =
            post_json(&app, "/intercom/webhook", json!({"topic": "ping", "data": {}})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ignored"}));
    }

    #[tokio::test]
    async fn asana_status_change_updates_ticket_state() {
        let app = test_app(None);
        post_json(&app, "/intercom/submit", submit("create_task")).await;

        let mut values = Map::new();
        values.insert("f-status".into(), json!("f-status-opt-2"));
        app.tasks.set_custom_fields("A1", &values).await.unwrap();

        let (status, body) = post_json(
            &app,
            "/asana/webhook",
            json!({"events": [{
                "action": "changed",
                "resource": {"gid": "A1", "resource_type": "task"},
                "user": {"gid": "u1", "resource_type": "user"},
                "change": {"field": "custom_fields", "action": "changed",
                           "new_value": {"gid": "f-status", "resource_type": "custom_field"}}
            }]}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["status"], "ticket_state_updated");
        let writes = app.inbox.state_writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "T1");
        assert_eq!(writes[0].1, "3");
    }
}
