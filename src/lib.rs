#![deny(missing_docs)]

//! Core library for the docpipe ingestion and retrieval service.

/// HTTP routing and REST handlers.
pub mod api;
/// Blob storage abstraction and adapters.
pub mod blob;
/// Result cache with TTL expiry.
pub mod cache;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Document metadata store and processing states.
pub mod metadata;
/// Pipeline counters.
pub mod metrics;
/// Intake, ingestion worker, and query service.
pub mod pipeline;
/// Durable work queue with at-least-once delivery.
pub mod queue;
/// Vector index abstraction and adapters.
pub mod vector;
