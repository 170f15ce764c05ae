use async_trait::async_trait;

use super::{EmbeddingClient, EmbeddingClientError};

/// Deterministic offline encoder: bytes are folded into slots and L2-normalized.
///
/// Useful for tests and air-gapped runs; vectors carry no semantics beyond byte overlap.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Create an encoder producing vectors of `dimension` floats.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            embedding[idx % self.dimension] += f32::from(byte) / 255.0;
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
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::Misconfigured(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vectors_are_deterministic_and_normalized() {
        let client = HashingEmbeddingClient::new(8);
        let first = client
            .generate_embeddings(vec!["hello".into(), String::new()])
            .await
            .expect("embeddings");
        let second = client
            .generate_embeddings(vec!["hello".into()])
            .await
            .expect("embeddings");

        assert_eq!(first[0], second[0]);
        let norm: f32 = first[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(first[1].iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn zero_dimension_is_rejected() {
        let error = HashingEmbeddingClient::new(0)
            .generate_embeddings(vec!["x".into()])
            .await
            .expect_err("misconfigured");
        assert!(matches!(error, EmbeddingClientError::Misconfigured(_)));
    }
}
