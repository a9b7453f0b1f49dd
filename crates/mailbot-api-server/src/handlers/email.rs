use crate::database::{EmailThread, NewMessage, NewThread, ThreadQuery, ThreadStore};
use crate::models::email::*;
use crate::services::responder::BOT_SENDER;
use crate::services::ResponderEngine;
use crate::utils::error::ApiError;
use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Accept an inbound email: store it as a new thread with the bot's first
/// reply already appended. The completion call runs before persistence, so a
/// masked completion failure still produces a stored (fallback) reply.
pub async fn send_email_handler(
    Extension(store): Extension<Arc<dyn ThreadStore>>,
    Extension(responder): Extension<Arc<ResponderEngine>>,
    Json(request): Json<SendEmailRequest>,
) -> Result<Json<SendEmailResponse>, ApiError> {
    info!(
        "Inbound email from {} to {}: {}",
        request.sender, request.recipient, request.subject
    );

    let bot_reply = responder.respond(&request.body, &[]).await;

    let thread_id = store
        .create_thread(
            NewThread {
                sender: request.sender.clone(),
                recipient: request.recipient,
                subject: request.subject,
            },
            vec![
                NewMessage {
                    sender: request.sender,
                    body: request.body,
                },
                NewMessage {
                    sender: BOT_SENDER.to_string(),
                    body: bot_reply,
                },
            ],
        )
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(SendEmailResponse {
        message: "Email sent successfully".to_string(),
        email_id: thread_id.to_string(),
    }))
}

/// Append a human reply and the bot's answer to an existing thread and
/// return the full updated message list.
pub async fn reply_email_handler(
    Extension(store): Extension<Arc<dyn ThreadStore>>,
    Extension(responder): Extension<Arc<ResponderEngine>>,
    Json(request): Json<ReplyEmailRequest>,
) -> Result<Json<ReplyEmailResponse>, ApiError> {
    // Identifier validation comes before any store access.
    let thread_id = Uuid::parse_str(&request.email_id)
        .map_err(|_| ApiError::BadRequest("Invalid email ID format".to_string()))?;

    let thread = store
        .fetch_thread(thread_id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Email not found with ID: {}", request.email_id)))?;

    info!(
        "Reply from {} on thread {} ({} prior messages)",
        request.sender,
        thread_id,
        thread.messages.len()
    );

    let bot_reply = responder.respond(&request.body, &thread.messages).await;

    let appended = store
        .append_messages(
            thread_id,
            vec![
                NewMessage {
                    sender: request.sender,
                    body: request.body,
                },
                NewMessage {
                    sender: BOT_SENDER.to_string(),
                    body: bot_reply,
                },
            ],
        )
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let mut messages = thread.messages;
    messages.extend(appended);

    Ok(Json(ReplyEmailResponse {
        message: "Reply added successfully".to_string(),
        thread: messages,
    }))
}

pub async fn query_emails_handler(
    Extension(store): Extension<Arc<dyn ThreadStore>>,
    Json(request): Json<QueryEmailsRequest>,
) -> Result<Json<Vec<EmailThread>>, ApiError> {
    let threads = store
        .query_threads(ThreadQuery {
            sender: request.sender,
            recipient: request.recipient,
            keywords: request.keywords,
        })
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(threads))
}

pub async fn list_email_ids_handler(
    Extension(store): Extension<Arc<dyn ThreadStore>>,
) -> Result<Json<Vec<EmailSummary>>, ApiError> {
    let summaries = store
        .list_summaries()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let entries = summaries
        .into_iter()
        .map(|s| EmailSummary {
            id: s.id.to_string(),
            subject: s.subject,
            sender: s.sender,
            timestamp: s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();

    Ok(Json(entries))
}
