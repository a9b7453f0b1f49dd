use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One stored conversation: the immutable envelope fields plus the ordered,
/// append-only message history.
#[derive(Debug, Clone, Serialize)]
pub struct EmailThread {
    pub id: Uuid,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ThreadMessage>,
}

/// One turn in a thread, human or automated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub sender: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Fields of a thread fixed at creation time. The id and timestamps are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
}

/// A message to append; the store stamps the timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: String,
    pub body: String,
}

/// Filter for thread queries. Every present field narrows the result:
/// sender and recipient match exactly, keywords is a case-insensitive
/// substring match against the subject or any message body.
#[derive(Debug, Clone, Default)]
pub struct ThreadQuery {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub keywords: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ThreadSummary {
    pub id: Uuid,
    pub subject: String,
    pub sender: String,
    pub created_at: DateTime<Utc>,
}
