//! # salon-proto
//!
//! Wire protocol for the Salon messaging session layer.
//!
//! Every inbound request and outbound event is a variant of a tagged union
//! (`ClientRequest` / `ServerEvent`) with a statically known field set, so
//! payloads are validated at the boundary before any dispatch happens.
//!
//! ## Features
//!
//! - Typed ids for users, groups, conversations and messages
//! - One enum variant per request/response kind, serde-tagged by `op`/`event`
//! - Optional `seq` correlation echoed on replies
//! - Optional Tokio integration: newline-delimited JSON framing codec

#![deny(clippy::all)]
#![warn(missing_docs)]

mod event;
mod ids;
mod request;
mod types;

#[cfg(feature = "tokio")]
pub mod codec;

#[cfg(feature = "tokio")]
pub use codec::{ClientCodec, CodecError, Decoded, JsonLineCodec, ServerCodec, MAX_FRAME_LEN};

pub use event::{ErrorBody, ServerEvent};
pub use ids::{ConversationId, GroupId, MessageId, UserId};
pub use request::{ClientRequest, RequestFrame, DEFAULT_HISTORY_LIMIT};
pub use types::{
    DirectMessageKind, DirectMessageRecord, GroupMemberRecord, GroupMessageKind,
    GroupMessageRecord, GroupRecord, GroupRole, GroupVisibility, MessageLifecycle, Reaction,
    ReadReceipt, Role, Standing,
};
