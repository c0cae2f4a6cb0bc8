//! # ReadHub Shared Library
//!
//! Types, persistence and business rules shared by the ReadHub API server
//! and the background worker.
//!
//! ## Module Organization
//!
//! - `domain`: typed ids and validated value objects
//! - `auth`: password hashing, JWT, request authentication, authorization
//! - `db`: connection pool and embedded migrations
//! - `models`: database models and their queries
//! - `pagination`: cursor and offset paging
//! - `cache`: Redis client, JSON cache, rate-limit counters
//! - `storage`: local file storage for uploads and audio
//! - `gamification`: XP, levels, streaks and achievements
//! - `onboarding`: the onboarding step machine
//! - `search`: embeddings and similarity ranking

pub mod auth;
pub mod cache;
pub mod db;
pub mod domain;
pub mod gamification;
pub mod models;
pub mod onboarding;
pub mod pagination;
pub mod search;
pub mod storage;

/// Current version of the ReadHub shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
