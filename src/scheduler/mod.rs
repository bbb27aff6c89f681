//! Multi-target crawl scheduling engine
//!
//! This module is the core of the service: it keeps a catalog of crawl
//! targets, runs one fixed-rate timer per target, and tracks the outcome
//! of every trigger attempt.
//!
//! # Overview
//!
//! A target is one (user, space, website-selector) triple. Targets are
//! created when a user is started (from their configured spaces) or by
//! the discovery loop when a tracked space grows a new website. Each
//! target owns exactly one recurring timer; the first fire happens a
//! full interval after registration so a start with many targets does
//! not stampede the remote API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Engine                            │
//! │  set_config / start / stop / run_once   (per-user lock)  │
//! │                                                          │
//! │  ┌──────────────┐        ┌──────────────┐                │
//! │  │   Target     │        │   Status     │                │
//! │  │   Registry   │        │   Registry   │                │
//! │  └──────┬───────┘        └──────▲───────┘                │
//! │         │ one timer task        │ begin / complete       │
//! │         │ per target            │ attempt                │
//! │         ▼                       │                        │
//! │   tick ──► skip-if-running ──► trigger (detached task)   │
//! └──────────────────────────────────────────────────────────┘
//!            ▲                            │
//!    discovery loop                 remote crawl API
//!    (adds new targets)             (with retry + backoff)
//! ```
//!
//! # Modules
//!
//! - [`target`] - Target identity and definitions
//! - [`registry`] - Catalog of registered targets and their timers
//! - [`status`] - Per-target phase tracking and aggregates
//! - [`engine`] - Control surface, timers, and trigger dispatch
//! - [`discovery`] - Periodic re-listing of tracked spaces
//! - [`summary`] - Periodic aggregated status logging
//! - [`error`] - Scheduler error types

pub mod discovery;
pub mod engine;
pub mod error;
pub mod registry;
pub mod status;
pub mod summary;
pub mod target;

pub use discovery::spawn_discovery;
pub use engine::{Engine, RunOnceReport, StartReport, StopReport, UserView};
pub use error::{SchedulerError, SchedulerResult};
pub use registry::TargetRegistry;
pub use status::{AggregateStatus, Phase, PhaseCounts, StatusRecord, StatusRegistry, TargetStatus};
pub use summary::{spawn_summary, StatusSummary};
pub use target::{Target, TargetId, WebsiteSelector};
