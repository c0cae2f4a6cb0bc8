/// Book embeddings for semantic search
///
/// Re-indexes one book per `embed` job. The API enqueues these when a book
/// is created or edited, the scraper after each imported chapter. The
/// embedder must be the one the API queries with, or vectors will not be
/// comparable (each row records its model to catch mismatches).

use crate::handlers::{HandlerError, JobHandler};
use async_trait::async_trait;
use readhub_shared::models::book::Book;
use readhub_shared::models::embedding::BookEmbedding;
use readhub_shared::models::job::{EmbedPayload, Job, JobKind};
use readhub_shared::search::Embedder;
use sqlx::PgPool;
use std::sync::Arc;

/// Text a book is indexed by
pub fn embedding_text(title: &str, author: &str, description: &str, genres: &[String]) -> String {
    let genres = genres.join(" ");
    [title, author, description, genres.as_str()]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct EmbedHandler {
    db: PgPool,
    embedder: Arc<dyn Embedder>,
}

impl EmbedHandler {
    pub fn new(db: PgPool, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }
}

#[async_trait]
impl JobHandler for EmbedHandler {
    fn kind(&self) -> JobKind {
        JobKind::Embed
    }

    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        let payload: EmbedPayload = job.payload_as()?;

        // Deleted books take their embedding with them.
        let Some(book) = Book::find_by_id(&self.db, payload.book_id).await? else {
            tracing::debug!(book_id = %payload.book_id, "Book gone, skipping embedding");
            return Ok(());
        };

        let text = embedding_text(&book.title, &book.author, &book.description, &book.genres);
        let vector = self.embedder.embed(&text);
        BookEmbedding::upsert(&self.db, book.id, &vector, self.embedder.model()).await?;

        tracing::info!(
            book_id = %book.id,
            model = self.embedder.model(),
            dimension = vector.len(),
            "Updated book embedding"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readhub_shared::search::{cosine_similarity, HashingEmbedder};

    #[test]
    fn test_embedding_text() {
        let text = embedding_text(
            "The Long Night",
            " A. Writer ",
            "",
            &["fantasy".to_string(), "horror".to_string()],
        );
        assert_eq!(text, "The Long Night\nA. Writer\nfantasy horror");
        assert_eq!(embedding_text("Solo", "", "", &[]), "Solo");
    }

    #[test]
    fn test_related_books_score_higher() {
        let embedder = HashingEmbedder::default();
        let dragons = embedder.embed(&embedding_text(
            "Dragon Rider",
            "Ann",
            "A young rider bonds with a dragon and fights for the kingdom",
            &["fantasy".into()],
        ));
        let query = embedder.embed("dragon rider fantasy kingdom");
        let unrelated = embedder.embed(&embedding_text(
            "Quarterly Ledger",
            "Bob",
            "Accounting practices for small firms",
            &["business".into()],
        ));

        let close = cosine_similarity(&query, &dragons).unwrap();
        let far = cosine_similarity(&query, &unrelated).unwrap();
        assert!(close > far);
    }
}
