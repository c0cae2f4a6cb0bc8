//! # ReadHub API Server Library
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: configuration loading
//! - `error`: error type and HTTP response mapping
//! - `hooks`: side effects after writes (XP, achievements, cache, jobs)
//! - `middleware`: security headers and rate limiting
//! - `routes`: route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod hooks;
pub mod middleware;
pub mod routes;
