//! Branded ID newtypes for type safety.
//!
//! The relay routes by two distinct identities: the conversational session
//! and the transport connection. Each is a newtype wrapper around `String`
//! so one can never be passed where the other is expected.
//!
//! Freshly generated IDs are UUID v7 (time-ordered) via
//! [`uuid::Uuid::now_v7`]; IDs assigned by a transport or client are adopted
//! verbatim through the `From` impls.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier for a conversational session.
    ///
    /// Stable for the lifetime of one logical client connection; sessions
    /// and connections share the same id value in the 1:1 deployment.
    SessionId
}

branded_id! {
    /// Identifier for a transport connection, assigned on connect.
    ConnectionId
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn new_ids_are_unique() {
        let ids: HashSet<String> = (0..100).map(|_| SessionId::new().into_inner()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn new_ids_are_valid_uuids() {
        let id = ConnectionId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn from_str_adopts_value() {
        let id = SessionId::from("s1");
        assert_eq!(id.as_str(), "s1");
        assert_eq!(id.to_string(), "s1");
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::from("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn session_and_connection_ids_are_distinct_types() {
        // Same string value, distinct identities for the type system.
        let s = SessionId::from("x");
        let c = ConnectionId::from("x");
        assert_eq!(s.as_str(), c.as_str());
    }

    #[test]
    fn deref_to_str() {
        let id = SessionId::from("deref-me");
        assert!(id.starts_with("deref"));
    }
}
