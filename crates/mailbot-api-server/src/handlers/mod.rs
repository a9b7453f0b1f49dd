pub mod email;
pub mod health;

use crate::database::ThreadStore;
use crate::services::ResponderEngine;
use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// API routes with their injected dependencies. Transport-level layers
/// (CORS, tracing, static files) are added by the caller.
pub fn router(store: Arc<dyn ThreadStore>, responder: Arc<ResponderEngine>) -> Router {
    Router::new()
        .route("/send-email", post(email::send_email_handler))
        .route("/reply-email", post(email::reply_email_handler))
        .route("/get-emails", post(email::query_emails_handler))
        .route("/get-email-ids", get(email::list_email_ids_handler))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .layer(Extension(store))
        .layer(Extension(responder))
}
