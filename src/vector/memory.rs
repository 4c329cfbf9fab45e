//! In-memory [`VectorIndex`] with brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::{VectorHit, VectorIndex, VectorIndexError, VectorRecord};

struct StoredEntry {
    vector: Vec<f32>,
    filename: String,
    preview: String,
}

/// Vector index backed by a process-local map, used by tests and local
/// development. Queries scan all entries.
#[derive(Default)]
pub struct MemoryVectorIndex {
    entries: RwLock<HashMap<Uuid, StoredEntry>>,
}

impl MemoryVectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("index map poisoned").len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, record: VectorRecord) -> Result<(), VectorIndexError> {
        self.entries.write().expect("index map poisoned").insert(
            record.document_id,
            StoredEntry {
                vector: record.vector,
                filename: record.filename,
                preview: record.preview,
            },
        );
        Ok(())
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<VectorHit>, VectorIndexError> {
        let entries = self.entries.read().expect("index map poisoned");
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .map(|(id, entry)| VectorHit {
                document_id: *id,
                score: cosine_sim(&vector, &entry.vector),
                filename: entry.filename.clone(),
                preview: entry.preview.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: Uuid, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            document_id: id,
            vector,
            filename: "doc.txt".into(),
            preview: "preview".into(),
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_document_id() {
        let index = MemoryVectorIndex::new();
        let id = Uuid::new_v4();
        index.upsert(record(id, vec![1.0, 0.0])).await.unwrap();
        index.upsert(record(id, vec![0.0, 1.0])).await.unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.query(vec![0.0, 1.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let index = MemoryVectorIndex::new();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        index.upsert(record(near, vec![1.0, 0.0])).await.unwrap();
        index.upsert(record(far, vec![0.0, 1.0])).await.unwrap();

        let hits = index.query(vec![1.0, 0.1], 5).await.unwrap();
        assert_eq!(hits[0].document_id, near);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn query_truncates_to_limit() {
        let index = MemoryVectorIndex::new();
        for _ in 0..5 {
            index
                .upsert(record(Uuid::new_v4(), vec![1.0, 0.0]))
                .await
                .unwrap();
        }
        let hits = index.query(vec![1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }
}
