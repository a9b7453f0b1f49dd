use anyhow::{anyhow, Result};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use mailbot_api_server::database::{
    EmailThread, NewMessage, NewThread, ThreadMessage, ThreadQuery, ThreadStore, ThreadSummary,
};
use mailbot_api_server::handlers;
use mailbot_api_server::services::completion::{ChatMessage, CompletionBackend};
use mailbot_api_server::services::responder::{BOT_SENDER, FALLBACK_REPLY};
use mailbot_api_server::services::ResponderEngine;

/// In-memory stand-in for the Postgres repository, mirroring its filter
/// semantics. Counts store accesses so tests can assert that validation
/// happens first.
#[derive(Default)]
struct InMemoryStore {
    threads: Mutex<Vec<EmailThread>>,
    accesses: AtomicUsize,
}

impl InMemoryStore {
    fn message_count(&self, id: Uuid) -> usize {
        self.threads
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.messages.len())
            .unwrap_or(0)
    }

    fn single_thread(&self) -> EmailThread {
        let threads = self.threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        threads[0].clone()
    }
}

#[async_trait::async_trait]
impl ThreadStore for InMemoryStore {
    async fn create_thread(&self, new: NewThread, messages: Vec<NewMessage>) -> Result<Uuid> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        let id = Uuid::new_v4();
        let thread = EmailThread {
            id,
            sender: new.sender,
            recipient: new.recipient,
            subject: new.subject,
            created_at: Utc::now(),
            messages: messages
                .into_iter()
                .map(|m| ThreadMessage {
                    sender: m.sender,
                    body: m.body,
                    created_at: Utc::now(),
                })
                .collect(),
        };
        self.threads.lock().unwrap().push(thread);
        Ok(id)
    }

    async fn fetch_thread(&self, id: Uuid) -> Result<Option<EmailThread>> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .threads
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn append_messages(&self, id: Uuid, messages: Vec<NewMessage>) -> Result<Vec<ThreadMessage>> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        let mut threads = self.threads.lock().unwrap();
        let thread = threads
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow!("no such thread"))?;
        let stored: Vec<ThreadMessage> = messages
            .into_iter()
            .map(|m| ThreadMessage {
                sender: m.sender,
                body: m.body,
                created_at: Utc::now(),
            })
            .collect();
        thread.messages.extend(stored.clone());
        Ok(stored)
    }

    async fn query_threads(&self, filter: ThreadQuery) -> Result<Vec<EmailThread>> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        let keyword = filter.keywords.as_ref().map(|k| k.to_lowercase());
        Ok(self
            .threads
            .lock()
            .unwrap()
            .iter()
            .filter(|t| filter.sender.as_ref().map_or(true, |s| &t.sender == s))
            .filter(|t| filter.recipient.as_ref().map_or(true, |r| &t.recipient == r))
            .filter(|t| {
                keyword.as_ref().map_or(true, |kw| {
                    t.subject.to_lowercase().contains(kw)
                        || t.messages.iter().any(|m| m.body.to_lowercase().contains(kw))
                })
            })
            .take(100)
            .cloned()
            .collect())
    }

    async fn list_summaries(&self) -> Result<Vec<ThreadSummary>> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .threads
            .lock()
            .unwrap()
            .iter()
            .take(100)
            .map(|t| ThreadSummary {
                id: t.id,
                subject: t.subject.clone(),
                sender: t.sender.clone(),
                created_at: t.created_at,
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Backend returning a fixed reply.
struct StubBackend;

const STUB_REPLY: &str = "Thanks for reaching out. A specialist will follow up shortly.";

#[async_trait::async_trait]
impl CompletionBackend for StubBackend {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(STUB_REPLY.to_string())
    }
}

/// Backend that fails deterministically, like a missing API key or an
/// unreachable endpoint.
struct FailingBackend;

#[async_trait::async_trait]
impl CompletionBackend for FailingBackend {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(anyhow!("completion API error: 401 - invalid key"))
    }
}

fn test_app(backend: Arc<dyn CompletionBackend>) -> (Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::default());
    let responder = Arc::new(ResponderEngine::new(backend));
    let app = handlers::router(store.clone(), responder);
    (app, store)
}

async fn send_json(app: &Router, method: &str, uri: &str, payload: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    let request = match payload {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn create_email(app: &Router, sender: &str, subject: &str, body: &str) -> String {
    let (status, response) = send_json(
        app,
        "POST",
        "/send-email",
        Some(json!({
            "sender": sender,
            "recipient": "sales@techcorpx.com",
            "subject": subject,
            "body": body,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"], "Email sent successfully");
    response["email_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn create_stores_original_message_and_one_bot_reply() {
    let (app, store) = test_app(Arc::new(StubBackend));

    create_email(&app, "john.doe@company.com", "Cloud Services Inquiry", "Tell me about pricing.").await;

    let thread = store.single_thread();
    assert_eq!(thread.messages.len(), 2);
    assert_eq!(thread.messages[0].sender, "john.doe@company.com");
    assert_eq!(thread.messages[0].body, "Tell me about pricing.");
    assert_eq!(thread.messages[1].sender, BOT_SENDER);
    assert_eq!(thread.messages[1].body, STUB_REPLY);
}

#[tokio::test]
async fn reply_appends_exactly_human_then_bot() {
    let (app, store) = test_app(Arc::new(StubBackend));
    let id = create_email(&app, "a@x.com", "Pricing", "What are your AI solution prices?").await;

    let (status, response) = send_json(
        &app,
        "POST",
        "/reply-email",
        Some(json!({ "email_id": id, "sender": "a@x.com", "body": "Any discounts?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"], "Reply added successfully");

    let thread = response["thread"].as_array().unwrap();
    assert_eq!(thread.len(), 4);
    assert_eq!(thread[2]["sender"], "a@x.com");
    assert_eq!(thread[2]["body"], "Any discounts?");
    assert_eq!(thread[3]["sender"], BOT_SENDER);

    assert_eq!(store.message_count(id.parse().unwrap()), 4);
}

#[tokio::test]
async fn reply_to_unknown_id_is_not_found_and_mutates_nothing() {
    let (app, store) = test_app(Arc::new(StubBackend));
    let id = create_email(&app, "a@x.com", "Pricing", "Hello").await;

    let (status, response) = send_json(
        &app,
        "POST",
        "/reply-email",
        Some(json!({ "email_id": Uuid::new_v4().to_string(), "sender": "a@x.com", "body": "Hi?" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["error"], "NotFound");
    assert_eq!(store.message_count(id.parse().unwrap()), 2);
}

#[tokio::test]
async fn reply_with_malformed_id_fails_before_any_store_access() {
    let (app, store) = test_app(Arc::new(StubBackend));

    let (status, response) = send_json(
        &app,
        "POST",
        "/reply-email",
        Some(json!({ "email_id": "not-a-uuid", "sender": "a@x.com", "body": "Hi?" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "BadRequest");
    assert_eq!(store.accesses.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_completion_persists_fallback_reply_verbatim() {
    let (app, store) = test_app(Arc::new(FailingBackend));

    let (status, _) = send_json(
        &app,
        "POST",
        "/send-email",
        Some(json!({
            "sender": "a@x.com",
            "recipient": "sales@techcorpx.com",
            "subject": "Pricing",
            "body": "Hello",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let thread = store.single_thread();
    assert_eq!(thread.messages.len(), 2);
    assert_eq!(thread.messages[1].sender, BOT_SENDER);
    assert_eq!(thread.messages[1].body, FALLBACK_REPLY);
}

#[tokio::test]
async fn keyword_query_is_case_insensitive_and_ignores_unrelated_threads() {
    let (app, _store) = test_app(Arc::new(StubBackend));
    create_email(&app, "a@x.com", "Cloud Services Inquiry", "Interested in storage plans.").await;
    create_email(&app, "b@x.com", "Unrelated Topic", "Nothing relevant here.").await;

    let (status, response) = send_json(
        &app,
        "POST",
        "/get-emails",
        Some(json!({ "keywords": "cloud" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let threads = response.as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["subject"], "Cloud Services Inquiry");
}

#[tokio::test]
async fn query_filters_by_exact_sender() {
    let (app, _store) = test_app(Arc::new(StubBackend));
    create_email(&app, "a@x.com", "First", "Hello").await;
    create_email(&app, "b@x.com", "Second", "Hello").await;

    let (status, response) = send_json(
        &app,
        "POST",
        "/get-emails",
        Some(json!({ "sender": "a@x.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let threads = response.as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["sender"], "a@x.com");
}

#[tokio::test]
async fn summaries_expose_id_subject_sender_and_formatted_timestamp() {
    let (app, _store) = test_app(Arc::new(StubBackend));
    let id = create_email(&app, "a@x.com", "Pricing", "Hello").await;

    let (status, response) = send_json(&app, "GET", "/get-email-ids", None).await;

    assert_eq!(status, StatusCode::OK);
    let entries = response.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], id.as_str());
    assert_eq!(entries[0]["subject"], "Pricing");
    assert_eq!(entries[0]["sender"], "a@x.com");

    // "%Y-%m-%d %H:%M:%S"
    let timestamp = entries[0]["timestamp"].as_str().unwrap();
    assert_eq!(timestamp.len(), 19);
    assert_eq!(&timestamp[4..5], "-");
    assert_eq!(&timestamp[13..14], ":");
}

#[tokio::test]
async fn end_to_end_create_then_reply_matches_contract() {
    let (app, _store) = test_app(Arc::new(StubBackend));

    let id = create_email(&app, "a@x.com", "Pricing", "What are your AI solution prices?").await;
    let (status, response) = send_json(
        &app,
        "POST",
        "/reply-email",
        Some(json!({ "email_id": id, "sender": "a@x.com", "body": "Any discounts?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let thread = response["thread"].as_array().unwrap();
    assert_eq!(thread.len(), 4);
    assert_eq!(thread[0]["body"], "What are your AI solution prices?");
    assert_eq!(thread[2]["sender"], "a@x.com");
    assert_eq!(thread[2]["body"], "Any discounts?");
    assert_eq!(thread[3]["sender"], BOT_SENDER);
}

#[tokio::test]
async fn health_endpoints_respond() {
    let (app, _store) = test_app(Arc::new(StubBackend));

    let (status, body) = send_json(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = send_json(&app, "GET", "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}
