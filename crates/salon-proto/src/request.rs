//! Inbound requests.
//!
//! One variant per operation, serde-tagged by `op` (kebab-case). Unknown
//! ops and malformed payloads fail at deserialization, before dispatch.

use crate::ids::{ConversationId, GroupId, MessageId, UserId};
use crate::types::{DirectMessageKind, GroupMessageKind, GroupVisibility};
use serde::{Deserialize, Serialize};

/// History page size when the client omits `limit`.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

/// A framed inbound request: optional client correlation id plus the
/// operation payload. `seq` is echoed verbatim on the direct reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Client-chosen correlation id, echoed on the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// The operation.
    #[serde(flatten)]
    pub request: ClientRequest,
}

/// Every operation a client may issue over an established connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientRequest {
    /// Present a bearer credential. Must be the first frame on a
    /// connection; rejected afterwards.
    Authenticate {
        /// Opaque signed token.
        token: String,
    },
    /// Join a group's live room.
    JoinGroup {
        /// Target group.
        group_id: GroupId,
    },
    /// Leave a group (room and persisted membership).
    LeaveGroup {
        /// Target group.
        group_id: GroupId,
    },
    /// Create a group with the caller as owner.
    CreateGroup {
        /// Display name.
        name: String,
        /// Visibility.
        visibility: GroupVisibility,
        /// Free-form description.
        #[serde(default)]
        description: Option<String>,
        /// House rules text.
        #[serde(default)]
        rules: Option<String>,
        /// Up to five tags.
        #[serde(default)]
        tags: Vec<String>,
        /// Avatar payload handed to the storage collaborator.
        #[serde(default)]
        image: Option<String>,
    },
    /// Delete a group (owner or operator).
    DeleteGroup {
        /// Target group.
        group_id: GroupId,
    },
    /// Send a direct message to a peer, creating the conversation lazily.
    SendDirectMessage {
        /// The other participant.
        peer_id: UserId,
        /// Text body.
        #[serde(default)]
        text: Option<String>,
        /// Media reference.
        #[serde(default)]
        media_ref: Option<String>,
        /// Message kind; defaults to text.
        #[serde(default)]
        kind: Option<DirectMessageKind>,
    },
    /// Send a message to a joined group room.
    SendGroupMessage {
        /// Target group.
        group_id: GroupId,
        /// Text body.
        #[serde(default)]
        text: Option<String>,
        /// Message kind; defaults to text.
        #[serde(default)]
        kind: Option<GroupMessageKind>,
        /// Media reference.
        #[serde(default)]
        media_ref: Option<String>,
        /// Message being replied to.
        #[serde(default)]
        reply_to: Option<MessageId>,
    },
    /// Page through a direct conversation's history.
    GetDirectHistory {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Page size.
        #[serde(default = "default_limit")]
        limit: u32,
        /// Offset from the newest end of the window.
        #[serde(default)]
        skip: u32,
    },
    /// Page through a group's history.
    GetGroupHistory {
        /// Target group.
        group_id: GroupId,
        /// Page size.
        #[serde(default = "default_limit")]
        limit: u32,
        /// Offset from the newest end of the window.
        #[serde(default)]
        skip: u32,
    },
    /// Toggle a `(user, emoji)` reaction on a group message.
    ReactToMessage {
        /// Owning group.
        group_id: GroupId,
        /// Target message.
        message_id: MessageId,
        /// The emoji.
        emoji: String,
    },
    /// Toggle a member's mute (moderator/owner only).
    MuteMember {
        /// Target group.
        group_id: GroupId,
        /// Target member.
        user_id: UserId,
    },
    /// Kick a member (moderator/owner only).
    KickMember {
        /// Target group.
        group_id: GroupId,
        /// Target member.
        user_id: UserId,
    },
    /// Ban a member (moderator/owner only).
    BanMember {
        /// Target group.
        group_id: GroupId,
        /// Target member.
        user_id: UserId,
    },
    /// Soft-delete a group message (author or moderator).
    SoftDeleteMessage {
        /// Owning group.
        group_id: GroupId,
        /// Target message.
        message_id: MessageId,
    },
    /// Irreversibly remove a message. Exactly one of `group_id`
    /// (operator only) or `conversation_id` (sender only) must be set.
    HardDeleteMessage {
        /// Group scope.
        #[serde(default)]
        group_id: Option<GroupId>,
        /// Conversation scope.
        #[serde(default)]
        conversation_id: Option<ConversationId>,
        /// Target message.
        message_id: MessageId,
    },
    /// Mark the peer's messages in a conversation as read.
    MarkDirectRead {
        /// Target conversation.
        conversation_id: ConversationId,
    },
}

impl ClientRequest {
    /// The kebab-case op name, as it appears in the `op` tag.
    ///
    /// Used as the dispatch key and the metrics label.
    pub fn op_name(&self) -> &'static str {
        match self {
            ClientRequest::Authenticate { .. } => "authenticate",
            ClientRequest::JoinGroup { .. } => "join-group",
            ClientRequest::LeaveGroup { .. } => "leave-group",
            ClientRequest::CreateGroup { .. } => "create-group",
            ClientRequest::DeleteGroup { .. } => "delete-group",
            ClientRequest::SendDirectMessage { .. } => "send-direct-message",
            ClientRequest::SendGroupMessage { .. } => "send-group-message",
            ClientRequest::GetDirectHistory { .. } => "get-direct-history",
            ClientRequest::GetGroupHistory { .. } => "get-group-history",
            ClientRequest::ReactToMessage { .. } => "react-to-message",
            ClientRequest::MuteMember { .. } => "mute-member",
            ClientRequest::KickMember { .. } => "kick-member",
            ClientRequest::BanMember { .. } => "ban-member",
            ClientRequest::SoftDeleteMessage { .. } => "soft-delete-message",
            ClientRequest::HardDeleteMessage { .. } => "hard-delete-message",
            ClientRequest::MarkDirectRead { .. } => "mark-direct-read",
        }
    }
}
