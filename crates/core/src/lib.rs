//! Core types and shared functionality for replica.
//!
//! This crate provides:
//! - The resource cache contract with in-memory and SQLite backends
//! - Unified error types
//! - Configuration structures
//! - The hand-off contract for publishing finished documents

pub mod cache;
pub mod config;
pub mod error;
pub mod publish;

pub use cache::{CacheDb, CacheEntry, MemoryStore, ResourceStore, open_store};
pub use config::{AppConfig, CacheBackend, ConfigError};
pub use error::Error;
pub use publish::{PageStore, PublishRequest};
