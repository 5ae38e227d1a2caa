//! Release index layer: querying which releases provide which modules
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Resolver    │────▶│ CachedIndex  │────▶│ MetaCpanIndex│
//! │ (survey)     │     │  (memoize)   │     │   (HTTP)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │  MemoCache   │
//!                      │  (SQLite)    │
//!                      └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: `ReleaseIndex` trait, the query contract the survey depends on
//! - [`metacpan`]: MetaCPAN implementation of the trait
//! - [`cache`]: SQLite memo store keyed by function, generation and arguments
//! - [`cached`]: `ReleaseIndex` wrapper that memoizes through a `MemoStore`
//! - [`error`]: Error types for index and cache operations
//! - [`types`]: Records returned by index queries

pub mod cache;
pub mod cached;
pub mod error;
pub mod metacpan;
pub mod registry;
pub mod types;
