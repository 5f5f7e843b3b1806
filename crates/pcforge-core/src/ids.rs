//! Identifier newtypes.
//!
//! Session and query IDs are UUID v7 strings so they sort by creation time
//! in log output.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new time-ordered ID.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// Identifies one session runtime in log output.
    SessionId
}

branded_id! {
    /// Identifies one submitted query.
    QueryId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(QueryId::new(), QueryId::new());
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn ids_are_uuid_v7() {
        let id = QueryId::new();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn serde_is_transparent() {
        let id = QueryId::from("q-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"q-1\"");
        let back: QueryId = serde_json::from_str("\"q-1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_is_inner_string() {
        assert_eq!(SessionId::from("abc").to_string(), "abc");
    }
}
