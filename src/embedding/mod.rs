use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
///
/// The pipeline treats embedding as a pluggable black box: raw text in, a
/// fixed-length cosine-comparable vector out. Both the ingestion worker and
/// the query service receive an implementation at construction.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic embedding client folding content bytes into a normalized vector.
///
/// Produces the same vector for the same input on every call, which makes it
/// usable both as the shipped encoder and as the stub tests rely on for
/// stable ranking assertions.
pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    /// Construct an embedder producing vectors of the given dimension.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            // Basic hashing of content into the vector slot
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let embeddings = texts
            .into_iter()
            .map(|text| Self::encode(&text, self.dimension))
            .collect();

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let embedder = HashedEmbedder::new(16);
        let first = embedder
            .generate_embeddings(vec!["climate report".into()])
            .await
            .unwrap();
        let second = embedder
            .generate_embeddings(vec!["climate report".into()])
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embeddings_are_unit_length() {
        let embedder = HashedEmbedder::new(8);
        let vectors = embedder
            .generate_embeddings(vec!["some document body".into()])
            .await
            .unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn zero_dimension_is_rejected() {
        let embedder = HashedEmbedder::new(0);
        assert!(
            embedder
                .generate_embeddings(vec!["text".into()])
                .await
                .is_err()
        );
    }
}
