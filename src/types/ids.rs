//! Identifier types for the topic graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Mint a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an identifier from its UUID string form.
            pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of a topic.
    TopicId
);

uuid_id!(
    /// Unique identifier of a link.
    LinkId
);

uuid_id!(
    /// Unique identifier of a repository (the owner of a topic hierarchy).
    RepositoryId
);

impl TopicId {
    /// Sentinel returned for degenerate topic references.
    ///
    /// Identifiers are only ever minted with `Uuid::new_v4`, so the nil UUID
    /// never names a stored topic and filters built from it match nothing.
    pub const NONE: TopicId = TopicId(Uuid::nil());

    /// Whether this is the [`TopicId::NONE`] sentinel.
    pub fn is_none(&self) -> bool {
        self.0.is_nil()
    }
}

/// Identity of the user performing a mutation.
///
/// Authentication happens outside the kernel; the actor is carried through
/// for logging only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Actor used when the caller supplies none.
    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_never_the_sentinel() {
        for _ in 0..100 {
            assert!(!TopicId::generate().is_none());
        }
        assert!(TopicId::NONE.is_none());
    }

    #[test]
    fn test_id_round_trips_through_string() {
        let id = LinkId::new(Uuid::from_u128(42));
        let parsed = LinkId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_serialize_as_plain_uuid() {
        let id = TopicId::new(Uuid::from_u128(7));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", Uuid::from_u128(7)));
    }
}
