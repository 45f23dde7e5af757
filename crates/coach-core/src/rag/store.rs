//! ============================================================================
//! Vector Store - Qdrant operations for knowledge-base chunks
//! ============================================================================
//! Stores document chunks with their source metadata and retrieves them by
//! vector similarity. Reloading the knowledge base recreates the collection
//! from scratch.
//! ============================================================================

use anyhow::{anyhow, Result};
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::embeddings::EMBEDDING_DIM;

/// Collection name for knowledge-base chunks
pub const COLLECTION_NAME: &str = "coach_kb";

/// A chunk ready to be stored, with its embedding
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: Uuid,
    pub text: String,
    pub filename: String,
    pub path: String,
    pub file_type: String,
    pub directory: String,
    pub chunk_index: usize,
    pub embedding: Vec<f32>,
}

/// A chunk returned by similarity search
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub filename: String,
    pub score: f32,
}

/// Vector store backed by Qdrant
pub struct VectorStore {
    client: Qdrant,
    collection: String,
}

impl VectorStore {
    /// Connect to Qdrant and make sure the collection exists
    pub async fn new(url: &str) -> Result<Self> {
        Self::with_collection(url, COLLECTION_NAME).await
    }

    /// Connect with a custom collection name (used by tests)
    pub async fn with_collection(url: &str, collection: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        let store = Self {
            client,
            collection: collection.to_string(),
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))?;

        if !exists {
            info!("Creating collection: {}", self.collection);
            self.create_collection().await?;
        } else {
            debug!("Collection {} already exists", self.collection);
        }
        Ok(())
    }

    async fn create_collection(&self) -> Result<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| anyhow!("Failed to create collection: {}", e))?;
        Ok(())
    }

    /// Drop and recreate the collection. Used on reload so stale chunks from
    /// deleted documents do not survive.
    pub async fn recreate(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))?;

        if exists {
            info!("Dropping collection {} for rebuild", self.collection);
            self.client
                .delete_collection(&self.collection)
                .await
                .map_err(|e| anyhow!("Failed to delete collection: {}", e))?;
        }
        self.create_collection().await
    }

    /// Upsert a batch of chunks
    pub async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = chunks
            .iter()
            .map(|chunk| {
                let payload: HashMap<String, Value> = [
                    ("text".to_string(), Value::from(chunk.text.clone())),
                    ("filename".to_string(), Value::from(chunk.filename.clone())),
                    ("path".to_string(), Value::from(chunk.path.clone())),
                    ("file_type".to_string(), Value::from(chunk.file_type.clone())),
                    ("directory".to_string(), Value::from(chunk.directory.clone())),
                    ("chunk_index".to_string(), Value::from(chunk.chunk_index as i64)),
                ]
                .into_iter()
                .collect();

                PointStruct::new(chunk.id.to_string(), chunk.embedding.clone(), payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
            .await
            .map_err(|e| anyhow!("Failed to upsert chunks: {}", e))?;

        debug!("Upserted {} chunks", chunks.len());
        Ok(())
    }

    /// Similarity search over the collection
    pub async fn search(&self, query_embedding: Vec<f32>, limit: u64) -> Result<Vec<RetrievedChunk>> {
        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_embedding, limit)
                    .with_payload(true),
            )
            .await
            .map_err(|e| anyhow!("Failed to search chunks: {}", e))?;

        let chunks: Vec<RetrievedChunk> = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload;
                Some(RetrievedChunk {
                    text: get_string(&payload, "text")?,
                    filename: get_string(&payload, "filename")?,
                    score: point.score,
                })
            })
            .collect();

        debug!("Retrieved {} chunks", chunks.len());
        Ok(chunks)
    }

    /// Number of stored chunks
    pub async fn count(&self) -> Result<u64> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| anyhow!("Failed to get collection info: {}", e))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }

    /// Check whether Qdrant is reachable
    pub async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str().map(|s| s.to_string()))
}
