//! crawl-scheduler - Multi-user crawl scheduler for remote knowledge-base indexing
//!
//! A long-running service that periodically triggers content indexing on a
//! remote knowledge-base API. Each configured user brings their own
//! credential and a set of spaces; every website in a scheduled space gets
//! its own fixed-rate timer, and a discovery loop picks up websites added
//! to a space after start.
//!
//! # Architecture
//!
//! The library is organized into four modules:
//!
//! - [`config`] - Users file, per-space scheduling options, environment tunables
//! - [`client`] - Remote crawl API client with retry and backoff
//! - [`scheduler`] - Target registry, per-target timers, status tracking
//! - [`server`] - HTTP control surface (axum)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use crawl_scheduler::config::EngineSettings;
//! use crawl_scheduler::scheduler::Engine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Arc::new(Engine::new(EngineSettings::from_env()));
//!     // engine.set_config("alice", config).await?;
//!     // engine.start("alice").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod scheduler;
pub mod server;
