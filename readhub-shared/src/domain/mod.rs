/// Domain primitives
///
/// - [`ids`]: typed entity identifiers with parse validation
/// - [`values`]: validated value objects (genre slug, username) and target kinds

pub mod ids;
pub mod values;

pub use ids::{BookId, ChapterId, CommentId, GenreId, IdError, JobId, PostId, TtsId, UserId};
pub use values::{slugify, GenreSlug, TargetKind, Username, ValueError};
