//! # ReadHub Worker Library
//!
//! Background job processing for ReadHub: the API enqueues rows in the
//! `jobs` table and this crate claims and runs them.
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `queue`: claiming and completing jobs
//! - `handlers`: the `JobHandler` trait and registry
//! - `tts`: speech providers, text chunking, chapter audio
//! - `scraper`: chapter import strategies
//! - `embed`: book embeddings for semantic search
//! - `orchestrator`: the poll loop with bounded concurrency
//!
//! ## Example
//!
//! ```no_run
//! use readhub_worker::tts::chunk_text;
//!
//! let chunks = chunk_text("One. Two. Three.", 8);
//! assert_eq!(chunks, vec!["One.", "Two.", "Three."]);
//! ```

pub mod config;
pub mod embed;
pub mod handlers;
pub mod orchestrator;
pub mod queue;
pub mod scraper;
pub mod tts;
