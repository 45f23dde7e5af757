//! ============================================================================
//! COACH-CORE: RAG wellness coach engine
//! ============================================================================
//! This crate holds the backend logic for the preventive-health coach:
//! - Knowledge-base loading and chunking (.txt / .svg)
//! - Embeddings + qdrant vector store for retrieval
//! - Chat / coach services over an OpenAI-compatible API, with streaming
//! - Medical guardrails and conversation history (redb)
//! ============================================================================

pub mod chat;
pub mod config;
pub mod guardrails;
pub mod history;
pub mod kb;
pub mod llm;
pub mod rag;
pub mod types;

// Re-export main types for convenience
pub use chat::ChatService;
pub use config::Settings;
pub use guardrails::{GuardrailConfig, MedicalGuardrails};
pub use history::ConversationStore;
pub use kb::{chunker::TextChunker, KnowledgeBase};
pub use llm::{ChatClient, ChatMessage};
pub use rag::{EmbeddingClient, RagService, VectorStore};
pub use types::*;
