/// Cursor and offset pagination
///
/// Public listings (books, comments, posts, feeds, follower lists) use keyset
/// pagination over `(created_at, id)`. The cursor is the position of the last
/// item on the previous page, serialized as JSON and encoded with URL-safe
/// base64 so it can travel in a query string untouched.
///
/// Repositories fetch [`PageRequest::fetch_limit`] rows (one more than asked
/// for) and hand them to [`Page::from_rows`], which trims the sentinel row and
/// only emits a `next_cursor` when more rows exist.
///
/// Admin tables use plain offset paging via [`OffsetParams`].
///
/// # Example
///
/// ```
/// use readhub_shared::pagination::{Cursor, PageRequest};
///
/// let cursor = Cursor::new(chrono::Utc::now(), uuid::Uuid::new_v4());
/// let encoded = cursor.encode();
/// assert_eq!(Cursor::decode(&encoded).unwrap(), cursor);
///
/// let request = PageRequest::new(Some(500), Some(cursor));
/// assert_eq!(request.limit, 100);
/// assert_eq!(request.fetch_limit(), 101);
/// ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Page size used when the client does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Cursor decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("Cursor is not valid base64")]
    Encoding,

    #[error("Cursor payload is malformed")]
    Malformed,
}

/// Position of the last item of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    /// Encodes the cursor for use in a query string
    pub fn encode(&self) -> String {
        // Serializing a struct of a timestamp and a uuid cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes a cursor produced by [`Cursor::encode`]
    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|_| CursorError::Encoding)?;
        serde_json::from_slice(&bytes).map_err(|_| CursorError::Malformed)
    }
}

/// Items that can be positioned by a [`Cursor`]
pub trait Keyed {
    fn cursor(&self) -> Cursor;
}

/// Query-string parameters accepted by paginated endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

impl PageQuery {
    /// Validates the cursor and clamps the limit
    pub fn into_request(self) -> Result<PageRequest, CursorError> {
        let cursor = match self.cursor.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(Cursor::decode(raw)?),
            _ => None,
        };
        Ok(PageRequest::new(self.limit, cursor))
    }
}

/// A validated page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Number of items to return, within `1..=MAX_PAGE_SIZE`
    pub limit: i64,

    /// Resume after this position, `None` for the first page
    pub cursor: Option<Cursor>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

impl PageRequest {
    pub fn new(limit: Option<i64>, cursor: Option<Cursor>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            cursor,
        }
    }

    /// First page of the given size
    pub fn first(limit: i64) -> Self {
        Self::new(Some(limit), None)
    }

    /// Rows to fetch: one extra to detect whether another page exists
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }

    /// Cursor timestamp for SQL binding (`NULL` on the first page)
    pub fn after_time(&self) -> Option<DateTime<Utc>> {
        self.cursor.map(|c| c.created_at)
    }

    /// Cursor id for SQL binding (`NULL` on the first page)
    pub fn after_id(&self) -> Option<Uuid> {
        self.cursor.map(|c| c.id)
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T: Keyed> Page<T> {
    /// Builds a page from `limit + 1` fetched rows
    pub fn from_rows(mut rows: Vec<T>, request: &PageRequest) -> Self {
        let limit = usize::try_from(request.limit).unwrap_or(usize::MAX);
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = if has_more {
            rows.last().map(|item| item.cursor().encode())
        } else {
            None
        };

        Self {
            items: rows,
            next_cursor,
        }
    }
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Maps items while keeping the cursor
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Offset paging parameters for admin tables
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OffsetParams {
    /// 1-based page number
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl OffsetParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

/// One page of an offset listing
#[derive(Debug, Clone, Serialize)]
pub struct OffsetPage<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> OffsetPage<T> {
    pub fn new(items: Vec<T>, total: i64, params: &OffsetParams) -> Self {
        Self {
            items,
            total,
            page: params.page(),
            per_page: params.per_page(),
        }
    }

    pub fn total_pages(&self) -> i64 {
        if self.total == 0 {
            0
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Uuid,
        created_at: DateTime<Utc>,
    }

    impl Keyed for Item {
        fn cursor(&self) -> Cursor {
            Cursor::new(self.created_at, self.id)
        }
    }

    fn items(n: usize) -> Vec<Item> {
        let now = Utc::now();
        (0..n)
            .map(|i| Item {
                id: Uuid::new_v4(),
                created_at: now - Duration::seconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn test_cursor_roundtrip() {
        let cursor = Cursor::new(Utc::now(), Uuid::new_v4());
        let encoded = cursor.encode();
        assert!(!encoded.contains('='));
        assert_eq!(Cursor::decode(&encoded), Ok(cursor));
    }

    #[test]
    fn test_garbage_cursor_rejected() {
        assert_eq!(Cursor::decode("!!!not-base64!!!"), Err(CursorError::Encoding));

        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert_eq!(Cursor::decode(&not_json), Err(CursorError::Malformed));
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(PageRequest::new(None, None).limit, DEFAULT_PAGE_SIZE);
        assert_eq!(PageRequest::new(Some(0), None).limit, 1);
        assert_eq!(PageRequest::new(Some(-5), None).limit, 1);
        assert_eq!(PageRequest::new(Some(1000), None).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_page_query_blank_cursor_is_first_page() {
        let query = PageQuery {
            limit: Some(5),
            cursor: Some("  ".into()),
        };
        let request = query.into_request().unwrap();
        assert!(request.cursor.is_none());
        assert_eq!(request.after_time(), None);
    }

    #[test]
    fn test_from_rows_with_more() {
        let request = PageRequest::first(3);
        let rows = items(4);
        let third = rows[2].clone();

        let page = Page::from_rows(rows, &request);
        assert_eq!(page.items.len(), 3);

        let next = Cursor::decode(page.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(next.id, third.id);
    }

    #[test]
    fn test_from_rows_last_page() {
        let request = PageRequest::first(3);
        let page = Page::from_rows(items(3), &request);
        assert_eq!(page.items.len(), 3);
        assert!(page.next_cursor.is_none());

        let page = Page::from_rows(Vec::<Item>::new(), &request);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_offset_params() {
        let params = OffsetParams {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(params.offset(), 20);

        let defaults = OffsetParams::default();
        assert_eq!(defaults.page(), 1);
        assert_eq!(defaults.offset(), 0);

        let page = OffsetPage::new(vec![1, 2, 3], 21, &params);
        assert_eq!(page.total_pages(), 3);
    }
}
