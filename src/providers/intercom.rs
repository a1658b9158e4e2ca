use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{ApiError, InboxSystem};
use crate::model::ticket::{Ticket, TicketKind, TicketRef, TicketState};

const SYSTEM: &str = "Intercom";
const API_VERSION: &str = "2.11";
const TITLE_ATTRIBUTE: &str = "_default_title_";
const DESCRIPTION_ATTRIBUTE: &str = "_default_description_";

pub struct IntercomProvider {
    base_url: String,
    token: String,
    admin_id: String,
    client: reqwest::Client,
}

impl IntercomProvider {
    pub fn new(base_url: String, token: String, admin_id: String, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            admin_id,
            client,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let resp = req
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .header("Intercom-Version", API_VERSION)
            .send()
            .await
            .map_err(ApiError::transport(SYSTEM))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                system: SYSTEM,
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|e| ApiError::decode(SYSTEM, e.to_string()))
    }

    fn record_url(&self, ticket: &TicketRef) -> String {
        match ticket.kind {
            TicketKind::Ticket => format!("{}/tickets/{}", self.base_url, ticket.id),
            TicketKind::Conversation => format!("{}/conversations/{}", self.base_url, ticket.id),
        }
    }
}

#[derive(Deserialize)]
struct ContactList {
    #[serde(default)]
    contacts: Vec<IdOnly>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: Value,
}

#[derive(Deserialize)]
struct RawTicket {
    id: Value,
    #[serde(default)]
    ticket_attributes: Map<String, Value>,
    ticket_state: Option<Value>,
    ticket_type: Option<IdOnly>,
    contacts: Option<ContactList>,
    open: Option<bool>,
    link: Option<String>,
}

#[derive(Deserialize)]
struct RawConversation {
    id: Value,
    title: Option<String>,
    #[serde(default)]
    custom_attributes: Map<String, Value>,
    source: Option<ConversationSource>,
    contacts: Option<ContactList>,
    open: Option<bool>,
}

#[derive(Deserialize)]
struct ConversationSource {
    subject: Option<String>,
    body: Option<String>,
}

#[derive(Deserialize)]
struct StateList {
    #[serde(default)]
    data: Vec<RawState>,
}

#[derive(Deserialize)]
struct RawState {
    id: Value,
    #[serde(default)]
    internal_label: String,
    #[serde(default)]
    external_label: String,
    #[serde(default)]
    category: String,
    ticket_types: Option<TypeList>,
}

#[derive(Deserialize)]
struct TypeList {
    #[serde(default)]
    data: Vec<IdOnly>,
}

#[derive(Deserialize)]
struct RawContact {
    name: Option<String>,
    email: Option<String>,
}

/// Intercom ids arrive as strings or numbers depending on the endpoint.
pub fn id_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse_state(value: &Value) -> Option<TicketState> {
    match value {
        Value::Object(obj) => Some(TicketState {
            id: obj.get("id").map(id_text).unwrap_or_default(),
            internal_label: non_empty(obj.get("internal_label")).unwrap_or_default(),
            external_label: non_empty(obj.get("external_label")).unwrap_or_default(),
            category: non_empty(obj.get("category")).unwrap_or_default(),
            ticket_type_ids: Vec::new(),
        }),
        // Older API versions report only the category string.
        Value::String(category) => Some(TicketState {
            id: String::new(),
            internal_label: String::new(),
            external_label: String::new(),
            category: category.clone(),
            ticket_type_ids: Vec::new(),
        }),
        _ => None,
    }
}

fn contact_ids(contacts: Option<ContactList>) -> Vec<String> {
    contacts
        .map(|c| c.contacts.iter().map(|c| id_text(&c.id)).collect())
        .unwrap_or_default()
}

#[async_trait]
impl InboxSystem for IntercomProvider {
    fn name(&self) -> &str {
        SYSTEM
    }

    async fn get_ticket(&self, ticket: &TicketRef) -> Result<Ticket, ApiError> {
        let url = self.record_url(ticket);
        match ticket.kind {
            TicketKind::Ticket => {
                let raw: RawTicket = self.send(self.client.get(&url)).await?;
                Ok(Ticket {
                    reference: TicketRef::ticket(id_text(&raw.id)),
                    title: non_empty(raw.ticket_attributes.get(TITLE_ATTRIBUTE)),
                    description: non_empty(raw.ticket_attributes.get(DESCRIPTION_ATTRIBUTE)),
                    state: raw.ticket_state.as_ref().and_then(parse_state),
                    ticket_type_id: raw.ticket_type.map(|t| id_text(&t.id)),
                    contact_ids: contact_ids(raw.contacts),
                    open: raw.open.unwrap_or(true),
                    url: raw.link,
                    attributes: raw.ticket_attributes,
                })
            }
            TicketKind::Conversation => {
                let raw: RawConversation = self.send(self.client.get(&url)).await?;
                let (subject, body) = raw
                    .source
                    .map(|s| (s.subject, s.body))
                    .unwrap_or((None, None));
                Ok(Ticket {
                    reference: TicketRef::conversation(id_text(&raw.id)),
                    title: raw.title.or(subject).filter(|t| !t.trim().is_empty()),
                    description: body,
                    attributes: raw.custom_attributes,
                    state: None,
                    ticket_type_id: None,
                    contact_ids: contact_ids(raw.contacts),
                    open: raw.open.unwrap_or(true),
                    url: None,
                })
            }
        }
    }

    async fn set_attributes(
        &self,
        ticket: &TicketRef,
        attributes: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        let body = match ticket.kind {
            TicketKind::Ticket => json!({ "ticket_attributes": attributes }),
            TicketKind::Conversation => json!({ "custom_attributes": attributes }),
        };
        let _: Value = self
            .send(self.client.put(self.record_url(ticket)).json(&body))
            .await?;
        Ok(())
    }

    async fn ticket_states(&self) -> Result<Vec<TicketState>, ApiError> {
        let list: StateList = self
            .send(self.client.get(format!("{}/ticket_states", self.base_url)))
            .await?;
        Ok(list
            .data
            .into_iter()
            .map(|s| TicketState {
                id: id_text(&s.id),
                internal_label: s.internal_label,
                external_label: s.external_label,
                category: s.category,
                ticket_type_ids: s
                    .ticket_types
                    .map(|t| t.data.iter().map(|t| id_text(&t.id)).collect())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn update_state(
        &self,
        ticket_id: &str,
        state_id: &str,
        close: bool,
    ) -> Result<(), ApiError> {
        let mut body = json!({
            "ticket_state_id": state_id,
            "admin_id": self.admin_id,
        });
        if close {
            body["open"] = Value::Bool(false);
        }
        let _: Value = self
            .send(
                self.client
                    .put(format!("{}/tickets/{ticket_id}", self.base_url))
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn close_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/parts", self.record_url(&TicketRef::conversation(conversation_id)));
        let _: Value = self
            .send(self.client.post(url).json(&json!({
                "message_type": "close",
                "type": "admin",
                "admin_id": self.admin_id,
            })))
            .await?;
        Ok(())
    }

    async fn add_note(&self, ticket: &TicketRef, body: &str) -> Result<(), ApiError> {
        let url = format!("{}/reply", self.record_url(ticket));
        let _: Value = self
            .send(self.client.post(url).json(&json!({
                "message_type": "note",
                "type": "admin",
                "admin_id": self.admin_id,
                "body": body,
            })))
            .await?;
        Ok(())
    }

    async fn contact_name(&self, contact_id: &str) -> Result<Option<String>, ApiError> {
        let contact: RawContact = self
            .send(
                self.client
                    .get(format!("{}/contacts/{contact_id}", self.base_url)),
            )
            .await?;
        Ok(contact
            .name
            .filter(|n| !n.trim().is_empty())
            .or(contact.email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn provider(server: &Server) -> IntercomProvider {
        IntercomProvider::new(
            server.url(),
            "ic-token".into(),
            "42".into(),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn get_ticket_reads_state_type_and_attributes() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/tickets/T1")
            .match_header("authorization", "Bearer ic-token")
            .match_header("intercom-version", "2.11")
            .with_status(200)
            .with_body(
                r#"{"type":"ticket","id":"T1",
                    "ticket_attributes":{"_default_title_":"Printer on fire","Asana Task ID":"A1"},
                    "ticket_state":{"id":"7","internal_label":"In progress","external_label":"Working on it","category":"in_progress"},
                    "ticket_type":{"id":"K"},
                    "contacts":{"contacts":[{"id":"c1"}]},
                    "open":true}"#,
            )
            .create_async()
            .await;

        let ticket = provider(&server)
            .get_ticket(&TicketRef::ticket("T1"))
            .await
            .unwrap();
        assert_eq!(ticket.title.as_deref(), Some("Printer on fire"));
        assert_eq!(ticket.attribute_text("Asana Task ID").as_deref(), Some("A1"));
        assert_eq!(ticket.state.as_ref().unwrap().id, "7");
        assert_eq!(ticket.ticket_type_id.as_deref(), Some("K"));
        assert_eq!(ticket.contact_ids, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn get_conversation_uses_custom_attributes() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/conversations/123")
            .with_status(200)
            .with_body(
                r#"{"type":"conversation","id":123,"title":null,
                    "custom_attributes":{"Asana Task ID":""},
                    "source":{"subject":"Login broken","body":"<p>help</p>"},
                    "open":true}"#,
            )
            .create_async()
            .await;

        let ticket = provider(&server)
            .get_ticket(&TicketRef::conversation("123"))
            .await
            .unwrap();
        assert_eq!(ticket.id(), "123");
        assert_eq!(ticket.title.as_deref(), Some("Login broken"));
        assert_eq!(ticket.attribute_text("Asana Task ID"), None);
    }

    #[tokio::test]
    async fn ticket_states_carry_ticket_types() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/ticket_states")
            .with_status(200)
            .with_body(
                r#"{"type":"list","data":[
                    {"id":"1","internal_label":"Open","external_label":"Received","category":"submitted","ticket_types":{"data":[{"id":"K"}]}},
                    {"id":"2","internal_label":"Done","external_label":"Resolved","category":"resolved"}
                ]}"#,
            )
            .create_async()
            .await;

        let states = provider(&server).ticket_states().await.unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].ticket_type_ids, vec!["K".to_string()]);
        assert!(states[1].ticket_type_ids.is_empty());
    }

    #[tokio::test]
    async fn update_state_sends_state_and_close_in_one_write() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/tickets/T1")
            .match_body(Matcher::Json(json!({
                "ticket_state_id": "2",
                "admin_id": "42",
                "open": false
            })))
            .with_status(200)
            .with_body(r#"{"id":"T1"}"#)
            .expect(1)
            .create_async()
            .await;

        provider(&server).update_state("T1", "2", true).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn close_conversation_posts_a_close_part() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/conversations/123/parts")
            .match_body(Matcher::Json(json!({
                "message_type": "close",
                "type": "admin",
                "admin_id": "42"
            })))
            .with_status(200)
            .with_body(r#"{"id":"123","open":false}"#)
            .expect(1)
            .create_async()
            .await;

        provider(&server).close_conversation("123").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn notes_post_to_reply_endpoint() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/conversations/123/reply")
            .match_body(Matcher::PartialJson(json!({
                "message_type": "note",
                "admin_id": "42",
                "body": "[Asana comment by Ada] done"
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        provider(&server)
            .add_note(&TicketRef::conversation("123"), "[Asana comment by Ada] done")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn contact_name_falls_back_to_email() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/contacts/c1")
            .with_status(200)
            .with_body(r#"{"name":"","email":"ada@example.com"}"#)
            .create_async()
            .await;

        let name = provider(&server).contact_name("c1").await.unwrap();
        assert_eq!(name.as_deref(), Some("ada@example.com"));
    }
}
