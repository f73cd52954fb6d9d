//! Outbound events.
//!
//! One variant per reply/broadcast kind, serde-tagged by `event`
//! (kebab-case). Acks carry the originating request's `seq`; broadcasts
//! carry none.

use crate::ids::{ConversationId, GroupId, MessageId, UserId};
use crate::types::{
    DirectMessageRecord, GroupMessageRecord, GroupRecord, Reaction, Role, Standing,
};
use serde::{Deserialize, Serialize};

/// The generic failure envelope returned for any rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Stable machine-readable code (`forbidden`, `payment_required`, ...).
    pub code: String,
    /// Human-readable summary.
    pub message: String,
    /// Optional extra context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Correlation id of the failed request, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// Every event the server writes to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Identity bound; the connection is live.
    Welcome {
        /// The authenticated user.
        user_id: UserId,
        /// Platform role.
        role: Role,
    },
    /// Request failed; connection stays open (except at handshake).
    Error {
        /// Failure envelope.
        #[serde(flatten)]
        body: ErrorBody,
    },
    /// Ack for `join-group`.
    GroupJoined {
        /// Correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The group joined.
        group_id: GroupId,
        /// Its display name.
        group_name: String,
    },
    /// Room broadcast: someone joined the room.
    MemberJoined {
        /// The group.
        group_id: GroupId,
        /// Who joined.
        user_id: UserId,
    },
    /// Ack for `leave-group`.
    GroupLeft {
        /// Correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The group left.
        group_id: GroupId,
    },
    /// Room broadcast: someone left the group.
    MemberLeft {
        /// The group.
        group_id: GroupId,
        /// Who left.
        user_id: UserId,
    },
    /// Ack for `create-group` and the operator-channel broadcast.
    GroupCreated {
        /// Correlation id (ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The full stored record.
        group: GroupRecord,
    },
    /// Room + operator broadcast: a group was deleted.
    GroupDeleted {
        /// Correlation id (ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The deleted group.
        group_id: GroupId,
    },
    /// A direct message: sender's ack (with `seq` and balance) or the
    /// peer-channel push (without).
    DirectMessage {
        /// Correlation id (ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The stored message.
        message: DirectMessageRecord,
        /// Sender's balance after the tariff (ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remaining_coins: Option<i64>,
    },
    /// A group message: sender's ack or the room broadcast.
    GroupMessage {
        /// Correlation id (ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The stored message.
        message: GroupMessageRecord,
        /// Sender's balance after the tariff (ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remaining_coins: Option<i64>,
    },
    /// Ack for `get-direct-history`.
    DirectHistory {
        /// Correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The conversation.
        conversation_id: ConversationId,
        /// Chronologically ordered page.
        messages: Vec<DirectMessageRecord>,
        /// Whether older/further messages exist beyond this page.
        has_more: bool,
    },
    /// Ack for `get-group-history`.
    GroupHistory {
        /// Correlation id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The group.
        group_id: GroupId,
        /// Chronologically ordered page.
        messages: Vec<GroupMessageRecord>,
        /// Whether further messages exist beyond this page.
        has_more: bool,
    },
    /// Room broadcast: a message's reaction set changed.
    ReactionsUpdated {
        /// Correlation id (ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The group.
        group_id: GroupId,
        /// The message.
        message_id: MessageId,
        /// The full updated set.
        reactions: Vec<Reaction>,
    },
    /// Targeted push + room broadcast: a member's standing changed.
    StandingChanged {
        /// Correlation id (actor's ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The group.
        group_id: GroupId,
        /// The affected member.
        user_id: UserId,
        /// Their new standing.
        standing: Standing,
    },
    /// Room/peer broadcast: a message was deleted.
    MessageDeleted {
        /// Correlation id (actor's ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// Group scope, when a group message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<GroupId>,
        /// Conversation scope, when a direct message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
        /// The deleted message.
        message_id: MessageId,
        /// Whether the deletion is irreversible.
        hard: bool,
        /// Who deleted it.
        deleted_by: UserId,
    },
    /// Peer push + ack: read receipts were recorded.
    ReadReceipts {
        /// Correlation id (reader's ack only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// The conversation.
        conversation_id: ConversationId,
        /// Who read.
        reader: UserId,
        /// Unix milliseconds.
        read_at: i64,
        /// Messages newly marked read.
        message_ids: Vec<MessageId>,
    },
    /// Flood-control warning before a disconnect.
    FloodWarning {
        /// Violations so far.
        violations: u8,
        /// Disconnect threshold.
        max_violations: u8,
    },
}

impl ServerEvent {
    /// Build a failure envelope.
    pub fn error(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<String>,
        seq: Option<u64>,
    ) -> Self {
        ServerEvent::Error {
            body: ErrorBody {
                success: false,
                code: code.into(),
                message: message.into(),
                details,
                seq,
            },
        }
    }

    /// The kebab-case event name, as it appears in the `event` tag.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::Error { .. } => "error",
            ServerEvent::GroupJoined { .. } => "group-joined",
            ServerEvent::MemberJoined { .. } => "member-joined",
            ServerEvent::GroupLeft { .. } => "group-left",
            ServerEvent::MemberLeft { .. } => "member-left",
            ServerEvent::GroupCreated { .. } => "group-created",
            ServerEvent::GroupDeleted { .. } => "group-deleted",
            ServerEvent::DirectMessage { .. } => "direct-message",
            ServerEvent::GroupMessage { .. } => "group-message",
            ServerEvent::DirectHistory { .. } => "direct-history",
            ServerEvent::GroupHistory { .. } => "group-history",
            ServerEvent::ReactionsUpdated { .. } => "reactions-updated",
            ServerEvent::StandingChanged { .. } => "standing-changed",
            ServerEvent::MessageDeleted { .. } => "message-deleted",
            ServerEvent::ReadReceipts { .. } => "read-receipts",
            ServerEvent::FloodWarning { .. } => "flood-warning",
        }
    }
}
