use crate::database::ThreadMessage;
use serde::{Deserialize, Serialize};

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplyEmailRequest {
    pub email_id: String,
    pub sender: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryEmailsRequest {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub message: String,
    pub email_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReplyEmailResponse {
    pub message: String,
    pub thread: Vec<ThreadMessage>,
}

/// Thread listing entry for selection UIs; timestamp pre-formatted for
/// display.
#[derive(Debug, Serialize)]
pub struct EmailSummary {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub timestamp: String,
}
