//! ============================================================================
//! RAG Service - Ingest, retrieval and context assembly
//! ============================================================================
//! High-level API combining the knowledge base, the embedding client and the
//! vector store: rebuild the collection from disk, retrieve the top-k chunks
//! for a question and render them into a citable context block.
//! ============================================================================

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

use super::embeddings::EmbeddingClient;
use super::store::{ChunkRecord, RetrievedChunk, VectorStore};
use crate::kb::chunker::TextChunker;
use crate::kb::KnowledgeBase;

/// How many texts go into a single embedding request
const EMBED_BATCH_SIZE: usize = 64;

/// Answer given when retrieval finds nothing
pub const NO_CONTEXT_MESSAGE: &str =
    "No se encontró información relevante en la base de conocimiento.";

/// Ingest summary returned by [`RagService::reload`]
#[derive(Debug, Clone, Copy)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

/// RAG pipeline over the local knowledge base
pub struct RagService {
    store: VectorStore,
    embeddings: EmbeddingClient,
    kb: KnowledgeBase,
    chunker: TextChunker,
    ready: AtomicBool,
}

impl RagService {
    pub fn new(
        store: VectorStore,
        embeddings: EmbeddingClient,
        kb: KnowledgeBase,
        chunker: TextChunker,
    ) -> Self {
        Self {
            store,
            embeddings,
            kb,
            chunker,
            ready: AtomicBool::new(false),
        }
    }

    /// Whether the vector store has been built at least once
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Rebuild the vector store from the documents on disk
    pub async fn reload(&self) -> Result<IngestReport> {
        let documents = self.kb.load_documents();
        info!("Ingesting {} documents into the vector store", documents.len());

        let mut records: Vec<ChunkRecord> = Vec::new();
        for doc in &documents {
            for (chunk_index, text) in self.chunker.chunk(&doc.content).into_iter().enumerate() {
                records.push(ChunkRecord {
                    id: Uuid::new_v4(),
                    text,
                    filename: doc.filename.clone(),
                    path: doc.path.clone(),
                    file_type: doc.file_type.clone(),
                    directory: doc.directory.clone(),
                    chunk_index,
                    embedding: Vec::new(),
                });
            }
        }

        // Embed in batches, then attach vectors back to their records.
        for batch in records.chunks_mut(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
            let embeddings = self.embeddings.embed(texts).await?;
            for (record, embedding) in batch.iter_mut().zip(embeddings) {
                record.embedding = embedding;
            }
        }

        self.store.recreate().await?;
        self.store.upsert_chunks(&records).await?;
        self.ready.store(true, Ordering::Relaxed);

        info!(
            "Vector store rebuilt: {} documents, {} chunks",
            documents.len(),
            records.len()
        );
        Ok(IngestReport {
            documents: documents.len(),
            chunks: records.len(),
        })
    }

    /// Retrieve the `limit` chunks most similar to `query`
    pub async fn retrieve(&self, query: &str, limit: u64) -> Result<Vec<RetrievedChunk>> {
        debug!("Retrieving context for: {}", query);
        let query_embedding = self.embeddings.embed_single(query).await?;
        self.store.search(query_embedding, limit).await
    }

    /// Number of chunks currently stored
    pub async fn chunk_count(&self) -> Result<u64> {
        self.store.count().await
    }

    /// Check that the vector store is reachable
    pub async fn health_check(&self) -> Result<bool> {
        self.store.health_check().await
    }
}

/// Render retrieved chunks into the context block the prompts expect:
/// `=== <filename> ===` headers so the model can cite sources by name.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_MESSAGE.to_string();
    }

    chunks
        .iter()
        .map(|chunk| format!("=== {} ===\n{}", chunk.filename, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Unique file names across the retrieved chunks, in retrieval order
pub fn source_names(chunks: &[RetrievedChunk]) -> Vec<String> {
    let mut sources = Vec::new();
    for chunk in chunks {
        if !sources.contains(&chunk.filename) {
            sources.push(chunk.filename.clone());
        }
    }
    sources
}
