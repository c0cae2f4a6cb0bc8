/// Vector search over book embeddings
///
/// Books are embedded by the worker (`embed` jobs) and stored in
/// `book_embeddings`. A semantic query embeds the query text with the same
/// [`Embedder`] and ranks every stored vector by cosine similarity.
///
/// The default [`HashingEmbedder`] needs no model files or external service:
/// lowercase word unigrams and bigrams are hashed into a fixed number of
/// buckets and the result is L2-normalized.
///
/// ```
/// use readhub_shared::search::{cosine_similarity, Embedder, HashingEmbedder};
///
/// let embedder = HashingEmbedder::default();
/// let a = embedder.embed("dragons and wizards");
/// let b = embedder.embed("Wizards and dragons!");
/// assert!(cosine_similarity(&a, &b).unwrap() > 0.5);
/// ```

use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use uuid::Uuid;

/// Default vector dimension
pub const DEFAULT_DIMENSION: usize = 256;

/// Turns text into a fixed-size vector
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Identifier stored next to each vector so stale models can be detected
    fn model(&self) -> &str;

    fn dimension(&self) -> usize;
}

/// Feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model: String,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model: format!("hashing-{}", dimension),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(head);

        let index = (hash % self.dimension as u64) as usize;
        // One hash bit picks the sign so colliding features tend to cancel.
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);

        for token in &tokens {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }
        for pair in tokens.windows(2) {
            let (index, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[index] += sign * 0.5;
        }

        normalize(&mut vector);
        vector
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Lowercase alphanumeric words
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
        .collect()
}

/// Scales the vector to unit length; zero vectors are left alone
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity, `None` when dimensions differ or a vector is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

/// A ranked search hit
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ScoredId {
    pub id: Uuid,
    pub score: f32,
}

/// Top `limit` candidates by descending similarity
///
/// Candidates scoring below `min_score`, or whose dimension does not match
/// the query, are skipped. Equal scores are ordered by id so results are
/// stable between calls.
pub fn rank<'a, I>(query: &[f32], candidates: I, limit: usize, min_score: f32) -> Vec<ScoredId>
where
    I: IntoIterator<Item = (Uuid, &'a [f32])>,
{
    let mut scored: Vec<ScoredId> = candidates
        .into_iter()
        .filter_map(|(id, vector)| {
            cosine_similarity(query, vector)
                .filter(|score| *score >= min_score)
                .map(|score| ScoredId { id, score })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("The Name of the Wind");
        let b = embedder.embed("the name of the wind");

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(embedder.model(), "hashing-64");
    }

    #[test]
    fn test_empty_text_embeds_to_zero() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed("  ... ");
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine_similarity(&v, &v), None);
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), Some(-1.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_rank_orders_and_filters() {
        let query = [1.0f32, 0.0];
        let near = (Uuid::from_u128(3), vec![0.9f32, 0.1]);
        let exact = (Uuid::from_u128(2), vec![1.0f32, 0.0]);
        let twin = (Uuid::from_u128(1), vec![2.0f32, 0.0]);
        let far = (Uuid::from_u128(4), vec![0.0f32, 1.0]);
        let wrong_dim = (Uuid::from_u128(5), vec![1.0f32, 0.0, 0.0]);

        let candidates = [&near, &exact, &twin, &far, &wrong_dim];
        let ranked = rank(
            &query,
            candidates.iter().map(|(id, v)| (*id, v.as_slice())),
            10,
            0.1,
        );

        let ids: Vec<u128> = ranked.iter().map(|s| s.id.as_u128()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_rank_limit() {
        let query = [1.0f32, 1.0];
        let vectors: Vec<(Uuid, Vec<f32>)> = (0..10)
            .map(|i| (Uuid::from_u128(i), vec![1.0, i as f32 / 10.0]))
            .collect();

        let ranked = rank(
            &query,
            vectors.iter().map(|(id, v)| (*id, v.as_slice())),
            3,
            -1.0,
        );
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].id, Uuid::from_u128(9));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Hello, World! 42"), vec!["hello", "world", "42"]);
    }
}
