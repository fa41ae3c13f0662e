//! Main harvester service that ties fetching, caching and decoding together.

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::info;

use crate::annotation::{normalize_items, CanonicalAnnotation};
use crate::cache::{get_or_compute, CacheKey, CacheStore, TAG_ANNOTATIONS, TAG_PYBOSSA};
use crate::config::{
    annotations_url, objects_url, validate_collection_id, validate_object_name, HarvestConfig,
};
use crate::error::Result;
use crate::fetch::{Fetcher, Pagination};
use crate::http::{create_client, HttpGet};
use crate::lookup::{ProjectIndex, TaskIndex};

/// Cache namespace of harvested endpoints.
const CACHE_NAMESPACE: &str = "harvest";

/// Harvests collections from the annotation and task servers.
///
/// Every harvest is memoized in the injected cache under the endpoint URL
/// and paging style, tagged by server so either side can be evicted alone.
pub struct Harvester<H, C> {
    fetcher: Fetcher<H>,
    cache: C,
    config: HarvestConfig,
}

impl<C: CacheStore> Harvester<Client, C> {
    /// Harvester over a real HTTP client.
    pub fn connect(cache: C, config: HarvestConfig) -> Result<Self> {
        Ok(Self::new(create_client()?, cache, config))
    }
}

impl<H: HttpGet, C: CacheStore> Harvester<H, C> {
    /// Create a harvester from its capabilities.
    pub fn new(http: H, cache: C, config: HarvestConfig) -> Self {
        let fetcher = Fetcher::new(http).with_poll_interval(config.rate_limit_poll);
        Self {
            fetcher,
            cache,
            config,
        }
    }

    /// Draw progress bars while fetching.
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.fetcher = self.fetcher.with_progress(show_progress);
        self
    }

    /// Runtime settings.
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// The cache harvests are memoized in.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Every raw annotation of a collection, as served.
    ///
    /// # Arguments
    /// * `collection` - Annotation collection id (e.g., "playbills-results")
    pub fn raw_annotations(&self, collection: &str) -> Result<Vec<Value>> {
        validate_collection_id(collection)?;
        let url = annotations_url(&self.config.annotation_server, collection)?;
        self.harvest(&url, Pagination::PageNumber, TAG_ANNOTATIONS)
    }

    /// Every describing annotation of a collection, normalized.
    ///
    /// # Arguments
    /// * `collection` - Annotation collection id (e.g., "playbills-results")
    ///
    /// # Returns
    /// Canonical annotations in collection order. Fails on a malformed
    /// describing annotation rather than dropping it.
    pub fn annotations(&self, collection: &str) -> Result<Vec<CanonicalAnnotation>> {
        let raw = self.raw_annotations(collection)?;
        let annotations = normalize_items(&raw)?;
        info!(
            collection,
            raw = raw.len(),
            describing = annotations.len(),
            "Normalized annotations"
        );
        Ok(annotations)
    }

    /// Every object of a task server domain type.
    ///
    /// # Arguments
    /// * `object` - Domain object name (e.g., "task", "project")
    pub fn objects(&self, object: &str) -> Result<Vec<Value>> {
        validate_object_name(object)?;
        let url = objects_url(&self.config.task_server, object)?;
        let pagination = Pagination::Offset {
            limit: self.config.page_size,
        };
        self.harvest(&url, pagination, TAG_PYBOSSA)
    }

    /// All tasks, indexed by id.
    pub fn tasks(&self) -> Result<TaskIndex> {
        TaskIndex::from_items(&self.objects("task")?)
    }

    /// All projects, indexed by id.
    pub fn projects(&self) -> Result<ProjectIndex> {
        ProjectIndex::from_items(&self.objects("project")?)
    }

    fn harvest(&self, url: &url::Url, pagination: Pagination, tag: &str) -> Result<Vec<Value>> {
        let paging = pagination.to_string();
        let key = CacheKey::new(CACHE_NAMESPACE, [url.as_str(), paging.as_str()]);
        get_or_compute(&self.cache, &key, tag, self.config.cache_ttl, || {
            self.fetcher.fetch_all(url, pagination)
        })
    }
}
