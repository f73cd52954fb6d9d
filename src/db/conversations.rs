//! Direct conversation repository.
//!
//! Conversations are keyed by the sorted participant pair; a partial
//! unique index over `(user_a, user_b) WHERE active = 1` makes resolve
//! idempotent even under concurrent creation. Each conversation caches
//! its last message for the client's inbox view.

use super::DbError;
use salon_proto::{
    ConversationId, DirectMessageKind, DirectMessageRecord, MessageId, ReadReceipt, UserId,
};
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Inbox placeholder shown when every message has been hard-deleted.
const EMPTY_CONVERSATION_PLACEHOLDER: &str = "conversation started";

/// A direct conversation row.
#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub last_message_text: Option<String>,
    pub last_message_sender: Option<UserId>,
    pub last_message_at: Option<i64>,
    pub created_at: i64,
}

impl ConversationRecord {
    /// Whether the given user is one of the two participants.
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.user_a == *user || self.user_b == *user
    }

    /// The other participant.
    pub fn peer_of(&self, user: &UserId) -> &UserId {
        if self.user_a == *user { &self.user_b } else { &self.user_a }
    }
}

/// Order a participant pair canonically.
pub fn canonical_pair<'p>(a: &'p UserId, b: &'p UserId) -> (&'p UserId, &'p UserId) {
    if a.as_str() <= b.as_str() { (a, b) } else { (b, a) }
}

/// Repository for direct conversation operations.
pub struct ConversationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ConversationRepository<'a> {
    /// Create a new conversation repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve the active conversation for a pair, creating it if absent.
    ///
    /// Idempotent: a concurrent create racing on the same pair loses the
    /// unique index and falls back to the winner's row.
    pub async fn resolve_or_create(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<ConversationRecord, DbError> {
        let (lo, hi) = canonical_pair(a, b);

        if let Some(existing) = self.find_by_pair(lo, hi).await? {
            return Ok(existing);
        }

        let id = ConversationId::generate();
        let now = chrono::Utc::now().timestamp_millis();
        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (id, user_a, user_b, active, created_at)
            VALUES (?, ?, ?, 1, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(lo.as_str())
        .bind(hi.as_str())
        .bind(now)
        .execute(self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(ConversationRecord {
                id,
                user_a: lo.clone(),
                user_b: hi.clone(),
                last_message_text: None,
                last_message_sender: None,
                last_message_at: None,
                created_at: now,
            }),
            // Lost the race on the pair index: the winner's row is the
            // canonical one.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => self
                .find_by_pair(lo, hi)
                .await?
                .ok_or_else(|| DbError::Internal("conversation vanished after race".into())),
            Err(e) => Err(e.into()),
        }
    }

    /// Find the active conversation for a canonical pair.
    async fn find_by_pair(
        &self,
        lo: &UserId,
        hi: &UserId,
    ) -> Result<Option<ConversationRecord>, DbError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, user_a, user_b, last_message_text, last_message_sender,
                   last_message_at, created_at
            FROM conversations
            WHERE user_a = ? AND user_b = ? AND active = 1
            "#,
        )
        .bind(lo.as_str())
        .bind(hi.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(ConversationRow::into_record))
    }

    /// Find an active conversation by id.
    pub async fn find(&self, id: &ConversationId) -> Result<Option<ConversationRecord>, DbError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, user_a, user_b, last_message_text, last_message_sender,
                   last_message_at, created_at
            FROM conversations
            WHERE id = ? AND active = 1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(ConversationRow::into_record))
    }

    /// Persist a direct message and refresh the conversation's cached
    /// last message, atomically.
    pub async fn insert_message(&self, msg: &DirectMessageRecord) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO direct_messages (id, conversation_id, sender, text, kind, media_ref, is_read, sent_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(msg.id.as_str())
        .bind(msg.conversation_id.as_str())
        .bind(msg.sender.as_str())
        .bind(msg.text.as_deref())
        .bind(msg.kind.as_str())
        .bind(msg.media_ref.as_deref())
        .bind(msg.sent_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_text = ?, last_message_sender = ?, last_message_at = ?
            WHERE id = ?
            "#,
        )
        .bind(msg.text.as_deref().unwrap_or("[media]"))
        .bind(msg.sender.as_str())
        .bind(msg.sent_at)
        .bind(msg.conversation_id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Find a single message within a conversation.
    pub async fn find_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Option<DirectMessageRecord>, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender, text, kind, media_ref, is_read, sent_at
            FROM direct_messages
            WHERE conversation_id = ? AND id = ?
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(message_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let mut receipts = self.receipts_for(std::slice::from_ref(message_id)).await?;
        Ok(Some(row.into_record(receipts.remove(message_id.as_str()).unwrap_or_default())))
    }

    /// Page through a conversation's history, oldest first.
    ///
    /// Fetches one row past the window so `has_more` needs no second
    /// query.
    pub async fn history(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
        skip: u32,
    ) -> Result<(Vec<DirectMessageRecord>, bool), DbError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender, text, kind, media_ref, is_read, sent_at
            FROM direct_messages
            WHERE conversation_id = ?
            ORDER BY sent_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(i64::from(limit) + 1)
        .bind(i64::from(skip))
        .fetch_all(self.pool)
        .await?;

        let has_more = rows.len() > limit as usize;
        let rows = &rows[..rows.len().min(limit as usize)];

        let ids: Vec<MessageId> = rows.iter().map(|r| MessageId::from(r.0.clone())).collect();
        let mut receipts = self.receipts_for(&ids).await?;

        let messages = rows
            .iter()
            .map(|row| {
                let rs = receipts.remove(row.0.as_str()).unwrap_or_default();
                row.clone().into_record(rs)
            })
            .collect();
        Ok((messages, has_more))
    }

    /// Mark every unread message from the peer as read by `reader`.
    ///
    /// Returns the ids newly marked. Re-marking is a no-op, so the
    /// operation commutes with itself.
    pub async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        reader: &UserId,
        read_at: i64,
    ) -> Result<Vec<MessageId>, DbError> {
        let mut tx = self.pool.begin().await?;

        let unread: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM direct_messages
            WHERE conversation_id = ? AND sender != ? AND is_read = 0
            ORDER BY sent_at ASC
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(reader.as_str())
        .fetch_all(&mut *tx)
        .await?;

        for id in &unread {
            sqlx::query(
                r#"
                INSERT INTO direct_reads (message_id, reader, read_at)
                VALUES (?, ?, ?)
                ON CONFLICT (message_id, reader) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(reader.as_str())
            .bind(read_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE direct_messages SET is_read = 1 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(unread.into_iter().map(MessageId::from).collect())
    }

    /// Irreversibly remove a message and recompute the cached last
    /// message. When nothing remains the cache falls back to a
    /// placeholder so the inbox row stays renderable.
    pub async fn purge_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM direct_messages WHERE conversation_id = ? AND id = ?")
            .bind(conversation_id.as_str())
            .bind(message_id.as_str())
            .execute(&mut *tx)
            .await?;

        let newest = sqlx::query_as::<_, (Option<String>, String, i64)>(
            r#"
            SELECT text, sender, sent_at FROM direct_messages
            WHERE conversation_id = ?
            ORDER BY sent_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        match newest {
            Some((text, sender, sent_at)) => {
                sqlx::query(
                    r#"
                    UPDATE conversations
                    SET last_message_text = ?, last_message_sender = ?, last_message_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(text.as_deref().unwrap_or("[media]"))
                .bind(&sender)
                .bind(sent_at)
                .bind(conversation_id.as_str())
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE conversations
                    SET last_message_text = ?, last_message_sender = NULL,
                        last_message_at = created_at
                    WHERE id = ?
                    "#,
                )
                .bind(EMPTY_CONVERSATION_PLACEHOLDER)
                .bind(conversation_id.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn receipts_for(
        &self,
        ids: &[MessageId],
    ) -> Result<HashMap<String, Vec<ReadReceipt>>, DbError> {
        let mut out: HashMap<String, Vec<ReadReceipt>> = HashMap::new();
        if ids.is_empty() {
            return Ok(out);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT message_id, reader, read_at FROM direct_reads \
             WHERE message_id IN ({placeholders}) ORDER BY read_at ASC"
        );
        let mut query = sqlx::query_as::<_, (String, String, i64)>(&sql);
        for id in ids {
            query = query.bind(id.as_str());
        }
        for (message_id, reader, read_at) in query.fetch_all(self.pool).await? {
            out.entry(message_id)
                .or_default()
                .push(ReadReceipt { reader: UserId::from(reader), read_at });
        }
        Ok(out)
    }
}

type ConversationRow =
    (String, String, String, Option<String>, Option<String>, Option<i64>, i64);

trait IntoConversationRecord {
    fn into_record(self) -> ConversationRecord;
}

impl IntoConversationRecord for ConversationRow {
    fn into_record(self) -> ConversationRecord {
        let (id, user_a, user_b, last_text, last_sender, last_at, created_at) = self;
        ConversationRecord {
            id: ConversationId::from(id),
            user_a: UserId::from(user_a),
            user_b: UserId::from(user_b),
            last_message_text: last_text,
            last_message_sender: last_sender.map(UserId::from),
            last_message_at: last_at,
            created_at,
        }
    }
}

type MessageRow =
    (String, String, String, Option<String>, String, Option<String>, bool, i64);

trait IntoMessageRecord {
    fn into_record(self, read_receipts: Vec<ReadReceipt>) -> DirectMessageRecord;
}

impl IntoMessageRecord for MessageRow {
    fn into_record(self, read_receipts: Vec<ReadReceipt>) -> DirectMessageRecord {
        let (id, conversation_id, sender, text, kind, media_ref, is_read, sent_at) = self;
        DirectMessageRecord {
            id: MessageId::from(id),
            conversation_id: ConversationId::from(conversation_id),
            sender: UserId::from(sender),
            text,
            kind: DirectMessageKind::parse(&kind).unwrap_or(DirectMessageKind::Text),
            media_ref,
            is_read,
            read_receipts,
            sent_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;

    fn msg(conv: &ConversationId, sender: &str, text: &str, sent_at: i64) -> DirectMessageRecord {
        DirectMessageRecord {
            id: MessageId::generate(),
            conversation_id: conv.clone(),
            sender: UserId::from(sender),
            text: Some(text.into()),
            kind: DirectMessageKind::Text,
            media_ref: None,
            is_read: false,
            read_receipts: Vec::new(),
            sent_at,
        }
    }

    #[tokio::test]
    async fn resolve_is_idempotent_and_order_insensitive() {
        let db = Database::new(":memory:").await.unwrap();
        let (a, b) = (UserId::from("alice"), UserId::from("bob"));
        let c1 = db.conversations().resolve_or_create(&a, &b).await.unwrap();
        let c2 = db.conversations().resolve_or_create(&b, &a).await.unwrap();
        assert_eq!(c1.id, c2.id);
        assert!(c1.has_participant(&a) && c1.has_participant(&b));
        assert_eq!(c1.peer_of(&a), &b);
    }

    #[tokio::test]
    async fn history_pages_oldest_first_with_has_more() {
        let db = Database::new(":memory:").await.unwrap();
        let conv = db
            .conversations()
            .resolve_or_create(&UserId::from("a"), &UserId::from("b"))
            .await
            .unwrap();
        for i in 0..5 {
            db.conversations().insert_message(&msg(&conv.id, "a", &format!("m{i}"), 1000 + i)).await.unwrap();
        }

        let (page, has_more) = db.conversations().history(&conv.id, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(has_more);
        assert_eq!(page[0].text.as_deref(), Some("m0"));

        let (page, has_more) = db.conversations().history(&conv.id, 2, 4).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(!has_more);
        assert_eq!(page[0].text.as_deref(), Some("m4"));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_skips_own_messages() {
        let db = Database::new(":memory:").await.unwrap();
        let conv = db
            .conversations()
            .resolve_or_create(&UserId::from("a"), &UserId::from("b"))
            .await
            .unwrap();
        db.conversations().insert_message(&msg(&conv.id, "a", "hi", 1)).await.unwrap();
        db.conversations().insert_message(&msg(&conv.id, "b", "yo", 2)).await.unwrap();

        let marked = db.conversations().mark_read(&conv.id, &UserId::from("b"), 99).await.unwrap();
        assert_eq!(marked.len(), 1);
        let again = db.conversations().mark_read(&conv.id, &UserId::from("b"), 100).await.unwrap();
        assert!(again.is_empty());

        let (page, _) = db.conversations().history(&conv.id, 10, 0).await.unwrap();
        let a_msg = page.iter().find(|m| m.sender.as_str() == "a").unwrap();
        assert!(a_msg.is_read);
        assert_eq!(a_msg.read_receipts.len(), 1);
        assert_eq!(a_msg.read_receipts[0].read_at, 99);
    }

    #[tokio::test]
    async fn purge_recomputes_last_message_cache() {
        let db = Database::new(":memory:").await.unwrap();
        let conv = db
            .conversations()
            .resolve_or_create(&UserId::from("a"), &UserId::from("b"))
            .await
            .unwrap();
        let first = msg(&conv.id, "a", "first", 1);
        let second = msg(&conv.id, "a", "second", 2);
        db.conversations().insert_message(&first).await.unwrap();
        db.conversations().insert_message(&second).await.unwrap();

        db.conversations().purge_message(&conv.id, &second.id).await.unwrap();
        let refreshed = db.conversations().find(&conv.id).await.unwrap().unwrap();
        assert_eq!(refreshed.last_message_text.as_deref(), Some("first"));

        db.conversations().purge_message(&conv.id, &first.id).await.unwrap();
        let refreshed = db.conversations().find(&conv.id).await.unwrap().unwrap();
        assert_eq!(refreshed.last_message_text.as_deref(), Some("conversation started"));
        assert!(refreshed.last_message_sender.is_none());
    }
}
