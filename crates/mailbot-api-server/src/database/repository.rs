use super::{DbPool, EmailThread, NewMessage, NewThread, ThreadMessage, ThreadQuery, ThreadSummary};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Maximum number of threads returned by query and summary listings.
const LIST_LIMIT: i64 = 100;

/// Persistence contract for email threads. Handlers receive this as an
/// injected dependency so tests can substitute an in-memory store.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Insert a new thread together with its initial messages, in one
    /// transaction. Returns the assigned identifier.
    async fn create_thread(&self, new: NewThread, messages: Vec<NewMessage>) -> Result<Uuid>;

    /// Load a thread and its full ordered message history.
    async fn fetch_thread(&self, id: Uuid) -> Result<Option<EmailThread>>;

    /// Append messages to an existing thread, in argument order, and return
    /// the stored rows.
    async fn append_messages(&self, id: Uuid, messages: Vec<NewMessage>) -> Result<Vec<ThreadMessage>>;

    /// Filter threads; see [`ThreadQuery`]. Capped at 100 results.
    async fn query_threads(&self, filter: ThreadQuery) -> Result<Vec<EmailThread>>;

    /// Identifier, subject, sender and creation time for every thread,
    /// newest first, capped at 100.
    async fn list_summaries(&self) -> Result<Vec<ThreadSummary>>;

    /// Cheap connectivity check for the readiness probe.
    async fn ping(&self) -> Result<()>;
}

pub struct Repository {
    pub pool: DbPool,
}

#[derive(FromRow)]
struct ThreadRow {
    id: Uuid,
    sender: String,
    recipient: String,
    subject: String,
    created_at: DateTime<Utc>,
}

impl ThreadRow {
    fn into_thread(self, messages: Vec<ThreadMessage>) -> EmailThread {
        EmailThread {
            id: self.id,
            sender: self.sender,
            recipient: self.recipient,
            subject: self.subject,
            created_at: self.created_at,
            messages,
        }
    }
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Ensure the thread tables exist. Messages carry a BIGSERIAL id so the
    /// append order of a thread is stable without a separate sequence column.
    pub async fn ensure_email_tables(&self) -> Result<()> {
        let pool = self.pool.get_pool();

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS email_threads (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                subject TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS email_thread_messages (
                id BIGSERIAL PRIMARY KEY,
                thread_id UUID NOT NULL REFERENCES email_threads(id) ON DELETE CASCADE,
                sender TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"#
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_thread_messages_thread ON email_thread_messages(thread_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_email_threads_sender ON email_threads(sender)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_email_threads_recipient ON email_threads(recipient)")
            .execute(pool)
            .await?;

        debug!("Email thread tables ensured");
        Ok(())
    }

    /// Fetch messages for a batch of threads and group them by thread id,
    /// preserving per-thread append order.
    async fn fetch_messages_grouped(&self, thread_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<ThreadMessage>>> {
        #[derive(FromRow)]
        struct MessageRow {
            thread_id: Uuid,
            sender: String,
            body: String,
            created_at: DateTime<Utc>,
        }

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT thread_id, sender, body, created_at
               FROM email_thread_messages
               WHERE thread_id = ANY($1)
               ORDER BY thread_id, id ASC"#
        )
        .bind(thread_ids)
        .fetch_all(self.pool.get_pool())
        .await?;

        let mut grouped: HashMap<Uuid, Vec<ThreadMessage>> = HashMap::new();
        for row in rows {
            grouped.entry(row.thread_id).or_default().push(ThreadMessage {
                sender: row.sender,
                body: row.body,
                created_at: row.created_at,
            });
        }

        Ok(grouped)
    }
}

#[async_trait]
impl ThreadStore for Repository {
    async fn create_thread(&self, new: NewThread, messages: Vec<NewMessage>) -> Result<Uuid> {
        let mut transaction = self.pool.get_pool().begin().await?;

        let thread_id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO email_threads (sender, recipient, subject)
               VALUES ($1, $2, $3)
               RETURNING id"#
        )
        .bind(&new.sender)
        .bind(&new.recipient)
        .bind(&new.subject)
        .fetch_one(&mut *transaction)
        .await?;

        for message in &messages {
            sqlx::query(
                r#"INSERT INTO email_thread_messages (thread_id, sender, body)
                   VALUES ($1, $2, $3)"#
            )
            .bind(thread_id)
            .bind(&message.sender)
            .bind(&message.body)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        debug!("Created thread {} with {} messages", thread_id, messages.len());

        Ok(thread_id)
    }

    async fn fetch_thread(&self, id: Uuid) -> Result<Option<EmailThread>> {
        let row = sqlx::query_as::<_, ThreadRow>(
            r#"SELECT id, sender, recipient, subject, created_at
               FROM email_threads
               WHERE id = $1"#
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let messages = sqlx::query_as::<_, ThreadMessage>(
            r#"SELECT sender, body, created_at
               FROM email_thread_messages
               WHERE thread_id = $1
               ORDER BY id ASC"#
        )
        .bind(id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(Some(row.into_thread(messages)))
    }

    async fn append_messages(&self, id: Uuid, messages: Vec<NewMessage>) -> Result<Vec<ThreadMessage>> {
        let mut transaction = self.pool.get_pool().begin().await?;
        let mut stored = Vec::with_capacity(messages.len());

        for message in &messages {
            let row = sqlx::query_as::<_, ThreadMessage>(
                r#"INSERT INTO email_thread_messages (thread_id, sender, body)
                   VALUES ($1, $2, $3)
                   RETURNING sender, body, created_at"#
            )
            .bind(id)
            .bind(&message.sender)
            .bind(&message.body)
            .fetch_one(&mut *transaction)
            .await?;

            stored.push(row);
        }

        transaction.commit().await?;
        debug!("Appended {} messages to thread {}", stored.len(), id);

        Ok(stored)
    }

    async fn query_threads(&self, filter: ThreadQuery) -> Result<Vec<EmailThread>> {
        let keyword_pattern = filter.keywords.as_ref().map(|kw| format!("%{}%", kw));

        let rows = sqlx::query_as::<_, ThreadRow>(
            r#"SELECT t.id, t.sender, t.recipient, t.subject, t.created_at
               FROM email_threads t
               WHERE ($1::text IS NULL OR t.sender = $1)
                 AND ($2::text IS NULL OR t.recipient = $2)
                 AND ($3::text IS NULL
                      OR t.subject ILIKE $3
                      OR EXISTS (SELECT 1 FROM email_thread_messages m
                                 WHERE m.thread_id = t.id AND m.body ILIKE $3))
               ORDER BY t.created_at DESC
               LIMIT $4"#
        )
        .bind(filter.sender.as_deref())
        .bind(filter.recipient.as_deref())
        .bind(keyword_pattern.as_deref())
        .bind(LIST_LIMIT)
        .fetch_all(self.pool.get_pool())
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut grouped = self.fetch_messages_grouped(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let messages = grouped.remove(&row.id).unwrap_or_default();
                row.into_thread(messages)
            })
            .collect())
    }

    async fn list_summaries(&self) -> Result<Vec<ThreadSummary>> {
        let summaries = sqlx::query_as::<_, ThreadSummary>(
            r#"SELECT id, subject, sender, created_at
               FROM email_threads
               ORDER BY created_at DESC
               LIMIT $1"#
        )
        .bind(LIST_LIMIT)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(summaries)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.get_pool()).await?;
        Ok(())
    }
}
