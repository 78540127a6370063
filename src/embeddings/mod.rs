// Miller's Embeddings Module
//
// The engine consumes embeddings through the `Embedder` trait: text in, one
// unit-normalized fixed-dimension vector out. Model runtimes (ONNX, remote
// APIs) are collaborators that implement the trait; the built-in
// `HashingEmbedder` keeps the server functional without a model download by
// projecting token features onto the unit sphere.

pub mod vector_store;

use anyhow::Result;

pub use vector_store::{EmbeddingRow, VectorStore};

/// Maps text to fixed-dimension unit vectors.
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts. Each returned vector is unit-normalized.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Cosine similarity between two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Normalize a vector in place to unit length. Zero vectors are left as-is.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Convert an L2 distance between unit vectors to a similarity score.
/// For unit vectors, `d^2 = 2 * (1 - cos)`, so `1 - d^2/2` recovers cosine.
pub fn distance_to_score(squared_distance: f32) -> f32 {
    (1.0 - squared_distance / 2.0).clamp(0.0, 1.0)
}

/// Text fed to the embedder for a symbol during tracing and similarity
/// lookups: name, signature, and doc comment joined with newlines.
pub fn symbol_embedding_text(
    name: &str,
    signature: Option<&str>,
    doc_comment: Option<&str>,
) -> String {
    let mut parts = vec![name.to_string()];
    if let Some(sig) = signature {
        if !sig.is_empty() {
            parts.push(sig.to_string());
        }
    }
    if let Some(doc) = doc_comment {
        if !doc.is_empty() {
            parts.push(doc.to_string());
        }
    }
    parts.join("\n")
}

/// Deterministic token-feature embedder.
///
/// Splits text into lowercase word tokens, hashes each into a bucket, and
/// normalizes the resulting frequency vector. Texts that share vocabulary get
/// similar vectors; disjoint texts are near-orthogonal. Not a substitute for
/// a learned model, but enough for the server to run standalone.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSIONS: usize = 384;

    pub fn new() -> Self {
        Self {
            dimensions: Self::DEFAULT_DIMENSIONS,
        }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = blake3::hash(token.as_bytes());
        let bytes = digest.as_bytes();
        let value = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        (value % self.dimensions as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let mut vector = vec![0.0f32; self.dimensions];
            for token in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| t.len() >= 2)
            {
                let token = token.to_lowercase();
                vector[self.bucket(&token)] += 1.0;
                // Sub-word features smooth over naming-convention splits.
                for part in crate::utils::naming_variants::parse_symbol_words(&token) {
                    let part = part.to_lowercase();
                    if part.len() >= 2 && part != token {
                        vector[self.bucket(&part)] += 0.5;
                    }
                }
            }
            normalize(&mut vector);
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new();
        let a = embedder.embed_query("fetch user data").unwrap();
        let b = embedder.embed_query("fetch user data").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new();
        let a = embedder.embed_query("get user by id").unwrap();
        let b = embedder.embed_query("fetch user by id").unwrap();
        let c = embedder.embed_query("render html template").unwrap();

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn distance_score_conversion() {
        // Identical unit vectors: d^2 = 0 -> score 1.
        assert_eq!(distance_to_score(0.0), 1.0);
        // Orthogonal unit vectors: d^2 = 2 -> score 0.
        assert_eq!(distance_to_score(2.0), 0.0);
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let embedder = HashingEmbedder::new();
        let v = embedder.embed_query("").unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
