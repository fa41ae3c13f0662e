//! Annotation Harvester - Harvest and reconcile crowdsourced transcriptions.
//!
//! This crate harvests Web Annotations produced by crowdsourcing projects on
//! playbills and catalogue cards, together with the task and project
//! metadata of the task server, and reconciles them into domain records.
//!
//! # Example
//!
//! ```
//! use annotation_harvester::config;
//! use annotation_harvester::shelfmark;
//!
//! assert!(config::validate_collection_id("playbills-results").is_ok());
//! assert_eq!(shelfmark::normalize("Add. 1"), "ADD      1");
//! ```
//!
//! # Architecture
//!
//! The harvester is organized into several modules:
//!
//! - [`config`]: Configuration constants, validation and URL builders
//! - [`error`]: Error types and Result alias
//! - [`http`]: HTTP capability and client
//! - [`fetch`]: Paginated, rate-limited collection retrieval
//! - [`cache`]: Injected harvest caches
//! - [`annotation`]: Raw and canonical annotation types
//! - [`lookup`]: Task, project and volume reference metadata
//! - [`reconcile`]: Grouping, joining and record reconciliation
//! - [`shelfmark`]: Shelfmark normalization
//! - [`output`]: JSON and YAML output
//! - [`cli`]: Command-line interface
//! - [`harvester`]: Main harvester service

pub mod annotation;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod harvester;
pub mod http;
pub mod lookup;
pub mod output;
pub mod reconcile;
pub mod shelfmark;

// Re-export the main service
pub use harvester::Harvester;

// Re-export commonly used items
pub use annotation::{CanonicalAnnotation, Fragment, RawAnnotation};
pub use cache::{CacheStore, FileCache, MemoryCache, NoCache};
pub use config::HarvestConfig;
pub use error::{HarvesterError, Result};
pub use fetch::{Fetcher, Pagination};
pub use http::{HttpGet, HttpResponse};
