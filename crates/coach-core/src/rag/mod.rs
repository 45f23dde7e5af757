//! ============================================================================
//! RAG - Retrieval-augmented generation over the knowledge base
//! ============================================================================

pub mod embeddings;
pub mod service;
pub mod store;

pub use embeddings::{EmbeddingClient, EMBEDDING_DIM};
pub use service::{format_context, source_names, IngestReport, RagService, NO_CONTEXT_MESSAGE};
pub use store::{ChunkRecord, RetrievedChunk, VectorStore, COLLECTION_NAME};
