//! Group repository.
//!
//! Groups, persisted membership, bans, messages, and reactions. Standing
//! rows only ever hold `active` or `muted`; a kick deletes the member row
//! and a ban does the same plus a `group_bans` row in one transaction, so
//! the banned set stays disjoint from the member set by construction.

use super::DbError;
use salon_proto::{
    GroupId, GroupMemberRecord, GroupMessageKind, GroupMessageRecord, GroupRecord, GroupRole,
    GroupVisibility, MessageId, MessageLifecycle, Reaction, Standing, UserId,
};
use sqlx::SqlitePool;
use std::collections::HashMap;

/// Repository for group operations.
pub struct GroupRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GroupRepository<'a> {
    /// Create a new group repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new group and its owner membership row, atomically.
    pub async fn create(&self, group: &GroupRecord) -> Result<(), DbError> {
        let tags_json = serde_json::to_string(&group.tags)
            .map_err(|e| DbError::Internal(format!("tags serialization: {e}")))?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO groups (id, name, owner, visibility, description, rules, tags, image_ref, capacity, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(group.id.as_str())
        .bind(&group.name)
        .bind(group.owner.as_str())
        .bind(group.visibility.as_str())
        .bind(group.description.as_deref())
        .bind(group.rules.as_deref())
        .bind(&tags_json)
        .bind(group.image_ref.as_deref())
        .bind(i64::from(group.capacity))
        .bind(group.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id, role, standing, joined_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(group.id.as_str())
        .bind(group.owner.as_str())
        .bind(GroupRole::Owner.as_str())
        .bind(Standing::Active.as_str())
        .bind(group.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Find a group by id, with a live member count.
    pub async fn find(&self, id: &GroupId) -> Result<Option<GroupRecord>, DbError> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT g.id, g.name, g.owner, g.visibility, g.description, g.rules, g.tags,
                   g.image_ref, g.capacity, g.created_at,
                   (SELECT COUNT(*) FROM group_members m WHERE m.group_id = g.id) AS member_count
            FROM groups g
            WHERE g.id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(GroupRow::into_record))
    }

    /// Hard-delete a group. Membership, bans, messages, and reactions
    /// cascade.
    pub async fn delete(&self, id: &GroupId) -> Result<(), DbError> {
        sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(id.as_str())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Fetch a member row.
    pub async fn member(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Option<GroupMemberRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, i64)>(
            r#"
            SELECT user_id, role, standing, joined_at
            FROM group_members
            WHERE group_id = ? AND user_id = ?
            "#,
        )
        .bind(group_id.as_str())
        .bind(user_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(user, role, standing, joined_at)| GroupMemberRecord {
            user: UserId::from(user),
            role: GroupRole::parse(&role).unwrap_or(GroupRole::Member),
            standing: Standing::parse(&standing).unwrap_or(Standing::Active),
            joined_at,
        }))
    }

    /// Current member count.
    pub async fn member_count(&self, group_id: &GroupId) -> Result<u32, DbError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM group_members WHERE group_id = ?")
                .bind(group_id.as_str())
                .fetch_one(self.pool)
                .await?;
        Ok(count as u32)
    }

    /// Insert a member row if absent. Idempotent re-join.
    pub async fn add_member(&self, group_id: &GroupId, user_id: &UserId) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id, role, standing, joined_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (group_id, user_id) DO NOTHING
            "#,
        )
        .bind(group_id.as_str())
        .bind(user_id.as_str())
        .bind(GroupRole::Member.as_str())
        .bind(Standing::Active.as_str())
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Remove a member row. Returns whether a row existed.
    pub async fn remove_member(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id.as_str())
            .bind(user_id.as_str())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite a member's standing.
    pub async fn set_standing(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        standing: Standing,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE group_members SET standing = ? WHERE group_id = ? AND user_id = ?")
            .bind(standing.as_str())
            .bind(group_id.as_str())
            .bind(user_id.as_str())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Whether a user is banned from a group.
    pub async fn is_banned(&self, group_id: &GroupId, user_id: &UserId) -> Result<bool, DbError> {
        let row: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM group_bans WHERE group_id = ? AND user_id = ?")
                .bind(group_id.as_str())
                .bind(user_id.as_str())
                .fetch_optional(self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Ban a user: drop their member row and record the ban, atomically.
    pub async fn ban(
        &self,
        group_id: &GroupId,
        user_id: &UserId,
        banned_by: &UserId,
    ) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id.as_str())
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO group_bans (group_id, user_id, banned_by, banned_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (group_id, user_id) DO NOTHING
            "#,
        )
        .bind(group_id.as_str())
        .bind(user_id.as_str())
        .bind(banned_by.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Persist a group message.
    pub async fn insert_message(&self, msg: &GroupMessageRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO group_messages (id, group_id, sender, text, kind, media_ref, reply_to, lifecycle, sent_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(msg.id.as_str())
        .bind(msg.group_id.as_str())
        .bind(msg.sender.as_str())
        .bind(msg.text.as_deref())
        .bind(msg.kind.as_str())
        .bind(msg.media_ref.as_deref())
        .bind(msg.reply_to.as_ref().map(|m| m.as_str().to_string()))
        .bind(msg.lifecycle.as_str())
        .bind(msg.sent_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Find a single message within a group.
    pub async fn find_message(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
    ) -> Result<Option<GroupMessageRecord>, DbError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, group_id, sender, text, kind, media_ref, reply_to,
                   lifecycle, deleted_by, deleted_at, sent_at
            FROM group_messages
            WHERE group_id = ? AND id = ?
            "#,
        )
        .bind(group_id.as_str())
        .bind(message_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let mut reactions = self.reactions_for(std::slice::from_ref(message_id)).await?;
        Ok(Some(row.into_record(reactions.remove(message_id.as_str()).unwrap_or_default())))
    }

    /// Hide a message from ordinary readers. Idempotent: already-hidden
    /// messages keep their original deletion marker.
    pub async fn soft_delete_message(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
        deleted_by: &UserId,
    ) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            UPDATE group_messages
            SET lifecycle = ?, deleted_by = ?, deleted_at = ?
            WHERE group_id = ? AND id = ? AND lifecycle = ?
            "#,
        )
        .bind(MessageLifecycle::SoftDeleted.as_str())
        .bind(deleted_by.as_str())
        .bind(now)
        .bind(group_id.as_str())
        .bind(message_id.as_str())
        .bind(MessageLifecycle::Visible.as_str())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Irreversibly remove a message. Reactions cascade.
    pub async fn purge_message(
        &self,
        group_id: &GroupId,
        message_id: &MessageId,
    ) -> Result<(), DbError> {
        sqlx::query("DELETE FROM group_messages WHERE group_id = ? AND id = ?")
            .bind(group_id.as_str())
            .bind(message_id.as_str())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Page through a group's history.
    ///
    /// The store is queried newest-first so `skip` counts back from the
    /// most recent message; the page is re-ordered chronological before
    /// delivery. Ordinary readers see visible messages only;
    /// `include_deleted` is the operator view.
    pub async fn history(
        &self,
        group_id: &GroupId,
        limit: u32,
        skip: u32,
        include_deleted: bool,
    ) -> Result<(Vec<GroupMessageRecord>, bool), DbError> {
        let lifecycle_filter = if include_deleted { "" } else { "AND lifecycle = 'visible'" };
        let sql = format!(
            r#"
            SELECT id, group_id, sender, text, kind, media_ref, reply_to,
                   lifecycle, deleted_by, deleted_at, sent_at
            FROM group_messages
            WHERE group_id = ? {lifecycle_filter}
            ORDER BY sent_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        );

        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(group_id.as_str())
            .bind(i64::from(limit) + 1)
            .bind(i64::from(skip))
            .fetch_all(self.pool)
            .await?;

        let has_more = rows.len() > limit as usize;
        let rows = &rows[..rows.len().min(limit as usize)];

        let ids: Vec<MessageId> = rows.iter().map(|r| MessageId::from(r.0.clone())).collect();
        let mut reactions = self.reactions_for(&ids).await?;

        let mut messages: Vec<GroupMessageRecord> = rows
            .iter()
            .map(|row| {
                let rs = reactions.remove(row.0.as_str()).unwrap_or_default();
                row.clone().into_record(rs)
            })
            .collect();
        messages.reverse();
        Ok((messages, has_more))
    }

    /// Toggle a `(user, emoji)` reaction and return the updated set.
    ///
    /// Present removes, absent adds: two identical toggles restore the
    /// prior state.
    pub async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
        emoji: &str,
    ) -> Result<Vec<Reaction>, DbError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM group_reactions WHERE message_id = ? AND user_id = ? AND emoji = ?",
        )
        .bind(message_id.as_str())
        .bind(user_id.as_str())
        .bind(emoji)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO group_reactions (message_id, user_id, emoji, reacted_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(message_id.as_str())
            .bind(user_id.as_str())
            .bind(emoji)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }

        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT user_id, emoji FROM group_reactions
            WHERE message_id = ?
            ORDER BY reacted_at ASC
            "#,
        )
        .bind(message_id.as_str())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rows
            .into_iter()
            .map(|(user, emoji)| Reaction { user: UserId::from(user), emoji })
            .collect())
    }

    async fn reactions_for(
        &self,
        ids: &[MessageId],
    ) -> Result<HashMap<String, Vec<Reaction>>, DbError> {
        let mut out: HashMap<String, Vec<Reaction>> = HashMap::new();
        if ids.is_empty() {
            return Ok(out);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT message_id, user_id, emoji FROM group_reactions \
             WHERE message_id IN ({placeholders}) ORDER BY reacted_at ASC"
        );
        let mut query = sqlx::query_as::<_, (String, String, String)>(&sql);
        for id in ids {
            query = query.bind(id.as_str());
        }
        for (message_id, user, emoji) in query.fetch_all(self.pool).await? {
            out.entry(message_id).or_default().push(Reaction { user: UserId::from(user), emoji });
        }
        Ok(out)
    }
}

type GroupRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    i64,
    i64,
    i64,
);

trait IntoGroupRecord {
    fn into_record(self) -> GroupRecord;
}

impl IntoGroupRecord for GroupRow {
    fn into_record(self) -> GroupRecord {
        let (
            id,
            name,
            owner,
            visibility,
            description,
            rules,
            tags_json,
            image_ref,
            capacity,
            created_at,
            member_count,
        ) = self;
        GroupRecord {
            id: GroupId::from(id),
            name,
            owner: UserId::from(owner),
            visibility: GroupVisibility::parse(&visibility).unwrap_or(GroupVisibility::Public),
            description,
            rules,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            image_ref,
            capacity: capacity as u32,
            member_count: member_count as u32,
            created_at,
        }
    }
}

type MessageRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<i64>,
    i64,
);

trait IntoGroupMessageRecord {
    fn into_record(self, reactions: Vec<Reaction>) -> GroupMessageRecord;
}

impl IntoGroupMessageRecord for MessageRow {
    fn into_record(self, reactions: Vec<Reaction>) -> GroupMessageRecord {
        let (
            id,
            group_id,
            sender,
            text,
            kind,
            media_ref,
            reply_to,
            lifecycle,
            deleted_by,
            deleted_at,
            sent_at,
        ) = self;
        GroupMessageRecord {
            id: MessageId::from(id),
            group_id: GroupId::from(group_id),
            sender: UserId::from(sender),
            text,
            kind: GroupMessageKind::parse(&kind).unwrap_or(GroupMessageKind::Text),
            media_ref,
            reply_to: reply_to.map(MessageId::from),
            reactions,
            lifecycle: MessageLifecycle::parse(&lifecycle).unwrap_or(MessageLifecycle::Visible),
            deleted_by: deleted_by.map(UserId::from),
            deleted_at,
            sent_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;

    fn group(id: &str, owner: &str) -> GroupRecord {
        GroupRecord {
            id: GroupId::from(id),
            name: format!("group {id}"),
            owner: UserId::from(owner),
            visibility: GroupVisibility::Public,
            description: None,
            rules: None,
            tags: vec!["books".into()],
            image_ref: None,
            capacity: 64,
            member_count: 0,
            created_at: 1000,
        }
    }

    fn msg(group_id: &str, sender: &str, text: &str, sent_at: i64) -> GroupMessageRecord {
        GroupMessageRecord {
            id: MessageId::generate(),
            group_id: GroupId::from(group_id),
            sender: UserId::from(sender),
            text: Some(text.into()),
            kind: GroupMessageKind::Text,
            media_ref: None,
            reply_to: None,
            reactions: Vec::new(),
            lifecycle: MessageLifecycle::Visible,
            deleted_by: None,
            deleted_at: None,
            sent_at,
        }
    }

    #[tokio::test]
    async fn create_inserts_owner_member_row() {
        let db = Database::new(":memory:").await.unwrap();
        db.groups().create(&group("g1", "alice")).await.unwrap();

        let found = db.groups().find(&GroupId::from("g1")).await.unwrap().unwrap();
        assert_eq!(found.member_count, 1);
        assert_eq!(found.tags, vec!["books".to_string()]);

        let owner = db
            .groups()
            .member(&GroupId::from("g1"), &UserId::from("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.role, GroupRole::Owner);
        assert_eq!(owner.standing, Standing::Active);
    }

    #[tokio::test]
    async fn ban_removes_member_row_and_blocks() {
        let db = Database::new(":memory:").await.unwrap();
        let g = GroupId::from("g1");
        db.groups().create(&group("g1", "alice")).await.unwrap();
        db.groups().add_member(&g, &UserId::from("bob")).await.unwrap();

        db.groups().ban(&g, &UserId::from("bob"), &UserId::from("alice")).await.unwrap();
        assert!(db.groups().member(&g, &UserId::from("bob")).await.unwrap().is_none());
        assert!(db.groups().is_banned(&g, &UserId::from("bob")).await.unwrap());
    }

    #[tokio::test]
    async fn history_is_chronological_and_windows_from_newest() {
        let db = Database::new(":memory:").await.unwrap();
        let g = GroupId::from("g1");
        db.groups().create(&group("g1", "alice")).await.unwrap();
        for i in 0..5 {
            db.groups().insert_message(&msg("g1", "alice", &format!("m{i}"), 1000 + i)).await.unwrap();
        }

        let (page, has_more) = db.groups().history(&g, 2, 0, false).await.unwrap();
        assert!(has_more);
        assert_eq!(page.len(), 2);
        // Window holds the two newest, delivered oldest-first.
        assert_eq!(page[0].text.as_deref(), Some("m3"));
        assert_eq!(page[1].text.as_deref(), Some("m4"));

        let (page, has_more) = db.groups().history(&g, 2, 4, false).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(!has_more);
        assert_eq!(page[0].text.as_deref(), Some("m0"));
    }

    #[tokio::test]
    async fn soft_deleted_messages_hidden_unless_requested() {
        let db = Database::new(":memory:").await.unwrap();
        let g = GroupId::from("g1");
        db.groups().create(&group("g1", "alice")).await.unwrap();
        let m = msg("g1", "alice", "oops", 1000);
        db.groups().insert_message(&m).await.unwrap();
        db.groups().soft_delete_message(&g, &m.id, &UserId::from("alice")).await.unwrap();

        let (plain, _) = db.groups().history(&g, 10, 0, false).await.unwrap();
        assert!(plain.is_empty());

        let (op_view, _) = db.groups().history(&g, 10, 0, true).await.unwrap();
        assert_eq!(op_view.len(), 1);
        assert_eq!(op_view[0].lifecycle, MessageLifecycle::SoftDeleted);
        assert_eq!(op_view[0].deleted_by.as_ref().map(|u| u.as_str()), Some("alice"));
    }

    #[tokio::test]
    async fn reaction_toggle_restores_prior_state() {
        let db = Database::new(":memory:").await.unwrap();
        db.groups().create(&group("g1", "alice")).await.unwrap();
        let m = msg("g1", "alice", "hi", 1000);
        db.groups().insert_message(&m).await.unwrap();

        let bob = UserId::from("bob");
        let set = db.groups().toggle_reaction(&m.id, &bob, "🔥").await.unwrap();
        assert_eq!(set.len(), 1);
        let set = db.groups().toggle_reaction(&m.id, &bob, "🔥").await.unwrap();
        assert!(set.is_empty());
    }
}
