//! Identifier types for Arcadia components.
//!
//! All three identifiers travel on the wire as plain JSON strings, where the
//! empty string means "not set" (a browser that has not joined a room yet, a
//! packet with no bridging target). The wrappers keep the three id spaces
//! from being mixed up in routing maps.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// True when the identifier is unset (the wire's empty string).
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// The identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id! {
    /// Unique identifier for a worker registered with the Coordinator.
    WorkerId
}

string_id! {
    /// Unique identifier for a running game room. Global across workers; the
    /// Coordinator maps every room id to the worker that owns it.
    RoomId
}

string_id! {
    /// Unique identifier for one browser connection, generated at first
    /// contact and stable for the lifetime of the session.
    SessionId
}
