//! # Docpilot
//!
//! A retrieval-augmented chat backend over a local document directory.
//!
//! Docpilot watches a directory of plain-text documents, keeps an in-memory
//! vector index consistent with it, and answers user questions by feeding
//! the most similar chunks, together with the user's prior conversation
//! turns, to a language model served by Ollama.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ docs dir │──▶│ Fingerprint  │──▶│ VectorIndex  │
//! │ (watched)│   │ + Chunking   │   │ (atomic swap)│
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │ top-k
//!                ┌──────────┐   ┌──────────▼───────┐
//!                │  SQLite  │──▶│  ChatPipeline    │──▶ Ollama
//!                │ history  │   │ context+history  │
//!                └──────────┘   └──────────────────┘
//! ```
//!
//! The index is rebuilt wholesale whenever the directory's content
//! fingerprints change, and the rebuild runs as a fire-and-forget background
//! task attached to chat requests. It is not persisted: it is always
//! rebuildable from the source files and does not survive restarts.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Content change detection for the watched directory |
//! | [`loader`] | Document loading and overlapping-window chunking |
//! | [`embedding`] | Embedding provider abstraction (Ollama) |
//! | [`error`] | Failure taxonomy for the index and generation pipelines |
//! | [`index`] | Vector index ownership, rebuild, and retrieval |
//! | [`history`] | Conversation persistence and rendering |
//! | [`generation`] | Prompt assembly and model invocation |
//! | [`auth`] | Accounts and bearer tokens |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod generation;
pub mod history;
pub mod index;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod server;
