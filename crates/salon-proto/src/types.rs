//! Shared record types carried in requests and events.
//!
//! These are the canonical wire forms of the persisted aggregates. The
//! `as_str`/`parse` pairs exist for the storage layer, which persists the
//! same lowercase tokens serde uses on the wire.

use crate::ids::{ConversationId, GroupId, MessageId, UserId};
use serde::{Deserialize, Serialize};

/// Platform-level role attached to a verified identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordinary authenticated user.
    User,
    /// Elevated operator with cross-group visibility and override authority.
    Operator,
}

impl Role {
    /// Lowercase token, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Operator => "operator",
        }
    }

    /// Parse the lowercase token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "operator" => Some(Role::Operator),
            _ => None,
        }
    }
}

/// A member's role within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    /// Ordinary member.
    Member,
    /// Moderator: may mute/kick/ban members and soft-delete messages.
    Moderator,
    /// Owner: all moderator powers plus group deletion.
    Owner,
}

impl GroupRole {
    /// Lowercase token, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            GroupRole::Member => "member",
            GroupRole::Moderator => "moderator",
            GroupRole::Owner => "owner",
        }
    }

    /// Parse the lowercase token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(GroupRole::Member),
            "moderator" => Some(GroupRole::Moderator),
            "owner" => Some(GroupRole::Owner),
            _ => None,
        }
    }

    /// Whether this role carries moderation authority.
    pub fn can_moderate(self) -> bool {
        matches!(self, GroupRole::Moderator | GroupRole::Owner)
    }
}

/// A group member's moderation standing.
///
/// Only `Active` and `Muted` are ever stored on a member row; `Kicked` and
/// `Banned` are transition outcomes announced on the wire (the member row
/// is removed when they occur).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Standing {
    /// Full participation.
    Active,
    /// May read and remain joined, but sends are rejected.
    Muted,
    /// Removed from the group; may rejoin.
    Kicked,
    /// Removed from the group and barred from rejoining.
    Banned,
}

impl Standing {
    /// Lowercase token, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            Standing::Active => "active",
            Standing::Muted => "muted",
            Standing::Kicked => "kicked",
            Standing::Banned => "banned",
        }
    }

    /// Parse the lowercase token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Standing::Active),
            "muted" => Some(Standing::Muted),
            "kicked" => Some(Standing::Kicked),
            "banned" => Some(Standing::Banned),
            _ => None,
        }
    }
}

/// Group visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupVisibility {
    /// Anyone may join.
    Public,
    /// Only existing members may join the room.
    Private,
}

impl GroupVisibility {
    /// Lowercase token, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            GroupVisibility::Public => "public",
            GroupVisibility::Private => "private",
        }
    }

    /// Parse the lowercase token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(GroupVisibility::Public),
            "private" => Some(GroupVisibility::Private),
            _ => None,
        }
    }
}

/// Kind of a direct message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectMessageKind {
    /// Plain text.
    Text,
    /// Image attachment.
    Image,
    /// Video attachment.
    Video,
    /// Arbitrary file attachment.
    File,
}

impl DirectMessageKind {
    /// Lowercase token, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            DirectMessageKind::Text => "text",
            DirectMessageKind::Image => "image",
            DirectMessageKind::Video => "video",
            DirectMessageKind::File => "file",
        }
    }

    /// Parse the lowercase token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(DirectMessageKind::Text),
            "image" => Some(DirectMessageKind::Image),
            "video" => Some(DirectMessageKind::Video),
            "file" => Some(DirectMessageKind::File),
            _ => None,
        }
    }
}

/// Kind of a group message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMessageKind {
    /// Plain text.
    Text,
    /// Image attachment.
    Image,
    /// Video attachment.
    Video,
    /// Pinned-style announcement.
    Announcement,
    /// Server-generated notice.
    System,
}

impl GroupMessageKind {
    /// Lowercase token, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            GroupMessageKind::Text => "text",
            GroupMessageKind::Image => "image",
            GroupMessageKind::Video => "video",
            GroupMessageKind::Announcement => "announcement",
            GroupMessageKind::System => "system",
        }
    }

    /// Parse the lowercase token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(GroupMessageKind::Text),
            "image" => Some(GroupMessageKind::Image),
            "video" => Some(GroupMessageKind::Video),
            "announcement" => Some(GroupMessageKind::Announcement),
            "system" => Some(GroupMessageKind::System),
            _ => None,
        }
    }
}

/// Lifecycle state of a group message.
///
/// Purged messages are deleted from storage outright, so only the first
/// two states ever appear on the wire or in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLifecycle {
    /// Visible to everyone with history access.
    Visible,
    /// Hidden from ordinary readers, visible to operators.
    SoftDeleted,
}

impl MessageLifecycle {
    /// Snake-case token, identical to the serde form.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageLifecycle::Visible => "visible",
            MessageLifecycle::SoftDeleted => "soft_deleted",
        }
    }

    /// Parse the snake-case token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "visible" => Some(MessageLifecycle::Visible),
            "soft_deleted" => Some(MessageLifecycle::SoftDeleted),
            _ => None,
        }
    }
}

/// A read receipt on a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    /// Who read the message.
    pub reader: UserId,
    /// Unix milliseconds.
    pub read_at: i64,
}

/// A single `(user, emoji)` reaction on a group message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// Who reacted.
    pub user: UserId,
    /// The emoji, as sent by the client.
    pub emoji: String,
}

/// Canonical wire form of a stored direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageRecord {
    /// Message id.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Sender.
    pub sender: UserId,
    /// Text body, if any.
    pub text: Option<String>,
    /// Message kind.
    pub kind: DirectMessageKind,
    /// Reference into the external object store, if any.
    pub media_ref: Option<String>,
    /// Whether the peer has read this message.
    pub is_read: bool,
    /// Read receipts accumulated so far.
    pub read_receipts: Vec<ReadReceipt>,
    /// Unix milliseconds, assigned at write time.
    pub sent_at: i64,
}

/// Canonical wire form of a stored group message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageRecord {
    /// Message id.
    pub id: MessageId,
    /// Owning group.
    pub group_id: GroupId,
    /// Sender.
    pub sender: UserId,
    /// Text body, if any.
    pub text: Option<String>,
    /// Message kind.
    pub kind: GroupMessageKind,
    /// Reference into the external object store, if any.
    pub media_ref: Option<String>,
    /// Message this one replies to, if any.
    pub reply_to: Option<MessageId>,
    /// Current reaction set.
    pub reactions: Vec<Reaction>,
    /// Lifecycle state.
    pub lifecycle: MessageLifecycle,
    /// Who soft-deleted the message, if anyone.
    pub deleted_by: Option<UserId>,
    /// When it was soft-deleted (unix milliseconds), if ever.
    pub deleted_at: Option<i64>,
    /// Unix milliseconds, assigned at write time.
    pub sent_at: i64,
}

/// Canonical wire form of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    /// Group id.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Owner's user id.
    pub owner: UserId,
    /// Visibility.
    pub visibility: GroupVisibility,
    /// Free-form description.
    pub description: Option<String>,
    /// House rules text.
    pub rules: Option<String>,
    /// Up to five tags.
    pub tags: Vec<String>,
    /// Stored avatar/banner reference.
    pub image_ref: Option<String>,
    /// Maximum member count.
    pub capacity: u32,
    /// Current member count.
    pub member_count: u32,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Canonical wire form of a persisted group member row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberRecord {
    /// The member's user id.
    pub user: UserId,
    /// Role within the group.
    pub role: GroupRole,
    /// Moderation standing.
    pub standing: Standing,
    /// Unix milliseconds.
    pub joined_at: i64,
}
