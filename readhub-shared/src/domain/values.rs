/// Validated value objects
///
/// Small wrappers that can only be constructed through a checking `parse`
/// function, plus the target enumeration shared by likes and comments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned by value object parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// Genre slug is invalid
    #[error("Invalid genre slug '{0}': use 1-50 lowercase letters, digits or dashes")]
    InvalidSlug(String),

    /// Username is invalid
    #[error("Invalid username '{0}': use 3-30 letters, digits or underscores")]
    InvalidUsername(String),

    /// Target kind is unknown
    #[error("Unknown target kind: {0}")]
    UnknownTarget(String),

    /// Target kind is known but not allowed here
    #[error("Target kind '{0}' is not supported for this operation")]
    UnsupportedTarget(TargetKind),
}

/// URL-safe genre identifier, e.g. `science-fiction`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenreSlug(String);

impl GenreSlug {
    /// Parses a slug: 1-50 chars of `[a-z0-9-]`, no leading/trailing dash
    pub fn parse(raw: &str) -> Result<Self, ValueError> {
        let valid = !raw.is_empty()
            && raw.len() <= 50
            && !raw.starts_with('-')
            && !raw.ends_with('-')
            && raw
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValueError::InvalidSlug(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GenreSlug {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GenreSlug> for String {
    fn from(slug: GenreSlug) -> Self {
        slug.0
    }
}

impl fmt::Display for GenreSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public handle of a user, e.g. `jane_reads`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Parses a username: 3-30 chars of `[A-Za-z0-9_]`
    pub fn parse(raw: &str) -> Result<Self, ValueError> {
        let len = raw.chars().count();
        let valid = (3..=30).contains(&len)
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValueError::InvalidUsername(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(name: Username) -> Self {
        name.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a title into a URL slug
///
/// Lowercases ASCII letters, keeps digits, collapses every other run of
/// characters into a single dash and trims dashes at both ends. Returns
/// `"untitled"` when nothing survives.
///
/// ```
/// use readhub_shared::domain::values::slugify;
///
/// assert_eq!(slugify("The Name of the Wind!"), "the-name-of-the-wind");
/// assert_eq!(slugify("  ***  "), "untitled");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.truncate(80);
        slug.trim_end_matches('-').to_string()
    }
}

/// Kind of entity a like or comment points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "target_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Book,
    Chapter,
    Comment,
    Post,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Book => "book",
            TargetKind::Chapter => "chapter",
            TargetKind::Comment => "comment",
            TargetKind::Post => "post",
        }
    }

    /// Comments attach to books, chapters and posts; replies use `parent_id`
    pub fn is_commentable(&self) -> bool {
        !matches!(self, TargetKind::Comment)
    }

    /// Checks that comments may be attached to this kind
    pub fn require_commentable(self) -> Result<Self, ValueError> {
        if self.is_commentable() {
            Ok(self)
        } else {
            Err(ValueError::UnsupportedTarget(self))
        }
    }
}

impl FromStr for TargetKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "book" | "books" => Ok(TargetKind::Book),
            "chapter" | "chapters" => Ok(TargetKind::Chapter),
            "comment" | "comments" => Ok(TargetKind::Comment),
            "post" | "posts" => Ok(TargetKind::Post),
            _ => Err(ValueError::UnknownTarget(s.to_string())),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_slug_valid() {
        for raw in ["fantasy", "science-fiction", "19th-century", "a"] {
            assert!(GenreSlug::parse(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn test_genre_slug_invalid() {
        let too_long = "a".repeat(51);
        for raw in ["", "Fantasy", "sci fi", "-horror", "horror-", "café", too_long.as_str()] {
            assert!(GenreSlug::parse(raw).is_err(), "{raw} should be invalid");
        }
    }

    #[test]
    fn test_genre_slug_serde_validates() {
        let ok: Result<GenreSlug, _> = serde_json::from_str("\"mystery\"");
        assert!(ok.is_ok());

        let bad: Result<GenreSlug, _> = serde_json::from_str("\"Mystery Novels\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_username_rules() {
        assert!(Username::parse("jane_reads").is_ok());
        assert!(Username::parse("abc").is_ok());
        assert!(Username::parse("ab").is_err());
        assert!(Username::parse("has space").is_err());
        assert!(Username::parse(&"x".repeat(31)).is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Dune"), "dune");
        assert_eq!(slugify("The Name of the Wind!"), "the-name-of-the-wind");
        assert_eq!(slugify("  Leading -- and trailing  "), "leading-and-trailing");
        assert_eq!(slugify("Book #2: Return"), "book-2-return");
        assert_eq!(slugify("日本語"), "untitled");
    }

    #[test]
    fn test_slugify_truncates() {
        let slug = slugify(&"word ".repeat(40));
        assert!(slug.len() <= 80);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_target_kind_parse() {
        assert_eq!("book".parse::<TargetKind>().unwrap(), TargetKind::Book);
        assert_eq!("Chapters".parse::<TargetKind>().unwrap(), TargetKind::Chapter);
        assert_eq!("posts".parse::<TargetKind>().unwrap(), TargetKind::Post);
        assert!("shelf".parse::<TargetKind>().is_err());
    }

    #[test]
    fn test_target_kind_commentable() {
        assert!(TargetKind::Book.require_commentable().is_ok());
        assert!(TargetKind::Post.require_commentable().is_ok());
        assert_eq!(
            TargetKind::Comment.require_commentable(),
            Err(ValueError::UnsupportedTarget(TargetKind::Comment))
        );
    }
}
