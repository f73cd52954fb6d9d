//! Typed identifiers.
//!
//! All ids travel as plain JSON strings on the wire. User ids are opaque
//! (minted by the external account service); group, conversation and
//! message ids are UUIDv4 strings minted by this layer.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the raw string form.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

id_type! {
    /// A user id, owned by the external account service.
    UserId
}

id_type! {
    /// A group ("club") id.
    GroupId
}

id_type! {
    /// A direct conversation id.
    ConversationId
}

id_type! {
    /// A message id (direct or group).
    MessageId
}

impl GroupId {
    /// Mint a fresh group id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl ConversationId {
    /// Mint a fresh conversation id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl MessageId {
    /// Mint a fresh message id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let id = GroupId::from("g-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"g-1\"");
        let back: GroupId = serde_json::from_str("\"g-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(MessageId::generate(), MessageId::generate());
    }
}
