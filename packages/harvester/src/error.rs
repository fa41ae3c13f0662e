//! Error types for the harvester.
//!
//! Harvest-level failures (transport errors, unexpected HTTP statuses,
//! malformed container identifiers, duplicate reference keys) surface as
//! `HarvesterError`. Record-level problems such as ambiguous dates are not
//! errors; they are reported through `reconcile::DateResolution` and logged.

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Invalid annotation collection identifier.
    #[error("Invalid collection ID: '{0}'. Expected lowercase letters, digits and hyphens (e.g., playbills-results)")]
    InvalidCollectionId(String),

    /// Invalid task server domain object name.
    #[error("Invalid domain object: '{0}'. Expected one of: {choices}", choices = crate::config::DOMAIN_OBJECTS.join(", "))]
    InvalidObjectName(String),

    /// URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-404 HTTP status while paging through a collection.
    #[error("HTTP {status} while fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// A page body did not have the expected shape.
    #[error("Unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// `partOf` did not contain the expected manifest path.
    #[error("Malformed container identifier: '{0}'. Expected a manifest URI containing '/iiif/'")]
    MalformedContainer(String),

    /// A reference key that must be unique occurred more than once.
    #[error("Duplicate {kind} key: {key}")]
    DuplicateReferenceKey { kind: &'static str, key: String },

    /// JSON (de)serialization failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failed.
    #[error("YAML serialization failed: {0}")]
    YamlSerialization(#[from] serde_yaml::Error),

    /// Cache backend failure that cannot be treated as a miss.
    #[error("Cache error: {0}")]
    Cache(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
