/// Typed entity identifiers
///
/// Every entity gets its own newtype over [`Uuid`] so a `BookId` can never be
/// passed where a `ChapterId` is expected. The wrappers are transparent for
/// serde and sqlx, so they serialize as plain UUID strings and bind as plain
/// `UUID` columns.
///
/// # Example
///
/// ```
/// use readhub_shared::domain::ids::{GenreId, IdError};
///
/// let id = GenreId::new();
/// let parsed = GenreId::parse(&id.to_string()).unwrap();
/// assert_eq!(id, parsed);
///
/// assert_eq!(GenreId::parse("not-an-id"), Err(IdError::Malformed("not-an-id".to_string())));
/// ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when an identifier string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is empty
    #[error("Identifier must not be empty")]
    Empty,

    /// The input is not a valid UUID
    #[error("Malformed identifier: {0}")]
    Malformed(String),
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parses an identifier, rejecting empty or malformed input
            pub fn parse(raw: &str) -> Result<Self, IdError> {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty);
                }
                Uuid::parse_str(trimmed)
                    .map(Self)
                    .map_err(|_| IdError::Malformed(raw.to_string()))
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// User account identifier
    UserId
);
entity_id!(
    /// Genre identifier
    GenreId
);
entity_id!(
    /// Book identifier
    BookId
);
entity_id!(
    /// Chapter identifier
    ChapterId
);
entity_id!(
    /// Comment identifier
    CommentId
);
entity_id!(
    /// Post identifier
    PostId
);
entity_id!(
    /// Text-to-speech record identifier
    TtsId
);
entity_id!(
    /// Background job identifier
    JobId
);
