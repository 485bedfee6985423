//! Semantic memory: text → chunked → embedded → stored per tenant/namespace →
//! nearest-neighbor retrieval reranked by a retrieval profile.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod embeddings_hash;
pub mod embeddings_openai;
pub mod error;
pub mod filter;
pub mod profiles;
pub mod rerank;
pub mod schema;
pub mod service;
pub mod store;
pub mod store_sqlite;
pub mod types;

pub use {
    error::MemoryError,
    filter::{Metadata, MetadataFilter, MetadataValue},
    profiles::{ProfileRegistry, RetrievalProfile, get_profile},
    service::{MAX_K, MemoryService, SaveReceipt},
    store::MemoryStore,
    types::{MemoryFragment, QueryLogEntry, QueryLogFilter, RankedHit, RawHit},
};
