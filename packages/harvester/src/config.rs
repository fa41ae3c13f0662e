//! Configuration constants and validation functions for the harvester.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use url::Url;

use crate::error::{HarvesterError, Result};

/// Base URL of the annotation server.
pub const ANNOTATION_SERVER_URL: &str = "https://annotations.libcrowds.com";

/// Base URL of the task server (PYBOSSA domain object API).
pub const TASK_SERVER_URL: &str = "https://backend.libcrowds.com";

/// Annotation collection holding playbill transcriptions.
pub const PLAYBILLS_COLLECTION: &str = "playbills-results";

/// Annotation collection holding catalogue card transcriptions.
pub const CATALOGUE_COLLECTION: &str = "convert-a-card-results";

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Page size requested from offset-paged endpoints.
pub const PAGE_SIZE: usize = 100;

/// Time-to-live for cached harvests, in seconds.
pub const CACHE_TTL_SECS: u64 = 3600;

/// Poll interval while waiting for a rate limit window to reset.
pub const RATE_LIMIT_POLL: Duration = Duration::from_secs(1);

/// Domain objects exposed by the task server.
pub const DOMAIN_OBJECTS: &[&str] = &[
    "project",
    "category",
    "task",
    "taskrun",
    "result",
    "user",
    "announcement",
    "helpingmaterial",
];

/// Collection ID pattern: lowercase slug.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static COLLECTION_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid regex"));

/// Validate an annotation collection identifier.
///
/// # Examples
/// ```
/// use annotation_harvester::config::validate_collection_id;
///
/// assert!(validate_collection_id("playbills-results").is_ok());
/// assert!(validate_collection_id("Playbills Results").is_err());
/// ```
pub fn validate_collection_id(collection: &str) -> Result<()> {
    if COLLECTION_ID_PATTERN.is_match(collection) {
        Ok(())
    } else {
        Err(HarvesterError::InvalidCollectionId(collection.to_string()))
    }
}

/// Validate a task server domain object name.
///
/// # Examples
/// ```
/// use annotation_harvester::config::validate_object_name;
///
/// assert!(validate_object_name("task").is_ok());
/// assert!(validate_object_name("tasks").is_err());
/// ```
pub fn validate_object_name(object: &str) -> Result<()> {
    if DOMAIN_OBJECTS.contains(&object) {
        Ok(())
    } else {
        Err(HarvesterError::InvalidObjectName(object.to_string()))
    }
}

/// Build the endpoint URL of an annotation collection.
///
/// The trailing slash is significant: the annotation server redirects
/// without it.
pub fn annotations_url(base: &str, collection: &str) -> Result<Url> {
    let base = base.trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/annotations/{collection}/"))?)
}

/// Build the endpoint URL of a task server domain object listing.
pub fn objects_url(base: &str, object: &str) -> Result<Url> {
    let base = base.trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/api/{object}"))?)
}

/// Runtime settings for a harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestConfig {
    /// Base URL of the annotation server.
    pub annotation_server: String,

    /// Base URL of the task server.
    pub task_server: String,

    /// Page size for offset-paged endpoints.
    pub page_size: usize,

    /// How long a cached harvest stays valid.
    pub cache_ttl: Duration,

    /// Poll interval of the rate limit wait loop.
    pub rate_limit_poll: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            annotation_server: ANNOTATION_SERVER_URL.to_string(),
            task_server: TASK_SERVER_URL.to_string(),
            page_size: PAGE_SIZE,
            cache_ttl: Duration::from_secs(CACHE_TTL_SECS),
            rate_limit_poll: RATE_LIMIT_POLL,
        }
    }
}
