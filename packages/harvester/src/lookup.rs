//! Reference metadata consulted during reconciliation.
//!
//! Tasks and projects come from the task server; volume metadata comes from a
//! local file. All lookups are key to row. A miss is `None`, never an error;
//! only building an index with a duplicated key fails.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::annotation::{container_id, Fragment};
use crate::error::{HarvesterError, Result};

/// Task metadata needed to reconnect annotations with their task.
pub trait TaskLookup {
    /// Fragment selector of the region the task asked about.
    fn fragment(&self, task_id: &str) -> Option<Fragment>;

    /// Link to the image the task showed.
    fn link(&self, task_id: &str) -> Option<String>;

    /// Project the task belongs to.
    fn project_id(&self, task_id: &str) -> Option<u64>;
}

/// A task server task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,

    #[serde(default)]
    pub project_id: Option<u64>,

    /// Free-form task payload; shape depends on the project.
    #[serde(default)]
    pub info: Value,
}

impl Task {
    /// Fragment of `info.target.selector.value`.
    #[must_use]
    pub fn fragment(&self) -> Option<Fragment> {
        self.info
            .pointer("/target/selector/value")
            .and_then(Value::as_str)
            .and_then(Fragment::parse)
    }

    /// Value of `info.link`.
    #[must_use]
    pub fn link(&self) -> Option<String> {
        self.info
            .get("link")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Tasks indexed by id.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    tasks: HashMap<u64, Task>,
}

impl TaskIndex {
    /// Index tasks; a repeated id is an integrity error.
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Result<Self> {
        let mut index = HashMap::new();
        for task in tasks {
            let id = task.id;
            if index.insert(id, task).is_some() {
                return Err(HarvesterError::DuplicateReferenceKey {
                    kind: "task",
                    key: id.to_string(),
                });
            }
        }
        debug!(tasks = index.len(), "Indexed tasks");
        Ok(Self { tasks: index })
    }

    /// Decode and index harvested task objects.
    pub fn from_items(items: &[Value]) -> Result<Self> {
        let tasks = items
            .iter()
            .map(|item| serde_json::from_value::<Task>(item.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(tasks)
    }

    /// Look up a task by its string id as found in annotation generators.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<&Task> {
        let id = task_id.trim().parse::<u64>().ok()?;
        self.tasks.get(&id)
    }

    /// Number of indexed tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskLookup for TaskIndex {
    fn fragment(&self, task_id: &str) -> Option<Fragment> {
        self.get(task_id)?.fragment()
    }

    fn link(&self, task_id: &str) -> Option<String> {
        self.get(task_id)?.link()
    }

    fn project_id(&self, task_id: &str) -> Option<u64> {
        self.get(task_id)?.project_id
    }
}

/// A task server project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
}

/// Project names indexed by id.
#[derive(Debug, Clone, Default)]
pub struct ProjectIndex {
    names: HashMap<u64, String>,
}

impl ProjectIndex {
    /// Index projects; a repeated id is an integrity error.
    pub fn new(projects: impl IntoIterator<Item = Project>) -> Result<Self> {
        let mut names = HashMap::new();
        for project in projects {
            if names.insert(project.id, project.name).is_some() {
                return Err(HarvesterError::DuplicateReferenceKey {
                    kind: "project",
                    key: project.id.to_string(),
                });
            }
        }
        Ok(Self { names })
    }

    /// Decode and index harvested project objects.
    pub fn from_items(items: &[Value]) -> Result<Self> {
        let projects = items
            .iter()
            .map(|item| serde_json::from_value::<Project>(item.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(projects)
    }

    /// Name of a project.
    #[must_use]
    pub fn name(&self, project_id: u64) -> Option<&str> {
        self.names.get(&project_id).map(String::as_str)
    }
}

/// Descriptive metadata for one digitised volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    /// IIIF manifest URI of the volume.
    pub manifest_uri: String,

    #[serde(default)]
    pub theatre: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    /// Catalogue system number of the volume record.
    #[serde(default, deserialize_with = "string_or_number")]
    pub system_number: Option<String>,
}

/// Accept `"014"` as well as `14` for identifiers typed into YAML by hand.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    }))
}

/// Volume metadata indexed by container id.
#[derive(Debug, Clone, Default)]
pub struct VolumeIndex {
    volumes: HashMap<String, VolumeMetadata>,
}

impl VolumeIndex {
    /// Index volumes by the container id of their manifest URI.
    ///
    /// Fails on a malformed manifest URI or a repeated container.
    pub fn new(volumes: impl IntoIterator<Item = VolumeMetadata>) -> Result<Self> {
        let mut index = HashMap::new();
        for volume in volumes {
            let container = container_id(&volume.manifest_uri)?;
            if index.contains_key(&container) {
                return Err(HarvesterError::DuplicateReferenceKey {
                    kind: "volume",
                    key: container,
                });
            }
            index.insert(container, volume);
        }
        Ok(Self { volumes: index })
    }

    /// Load a YAML (or JSON) list of volumes.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let volumes: Vec<VolumeMetadata> = serde_yaml::from_str(&text)?;
        debug!(path = %path.display(), volumes = volumes.len(), "Loaded volume metadata");
        Self::new(volumes)
    }

    /// Metadata of a container, if known.
    #[must_use]
    pub fn get(&self, container: &str) -> Option<&VolumeMetadata> {
        self.volumes.get(container)
    }

    /// Distinct containers without metadata, each logged once.
    ///
    /// Nothing is reported when no volumes were loaded at all.
    pub fn report_missing<'c, I>(&self, containers: I) -> BTreeSet<&'c str>
    where
        I: IntoIterator<Item = &'c str>,
    {
        if self.volumes.is_empty() {
            return BTreeSet::new();
        }
        let missing: BTreeSet<&str> = containers
            .into_iter()
            .filter(|container| !self.volumes.contains_key(*container))
            .collect();
        for container in &missing {
            warn!(container, "No volume metadata for container");
        }
        missing
    }

    /// Number of indexed volumes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// Whether no volumes are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tasks() -> TaskIndex {
        TaskIndex::from_items(&[
            json!({
                "id": 1,
                "project_id": 10,
                "info": {
                    "link": "https://example.org/image/1",
                    "target": {"source": "canvas/1", "selector": {"value": "?xywh=0,0,100,50"}}
                }
            }),
            json!({"id": 2, "project_id": 11, "info": "free text"}),
        ])
        .unwrap()
    }

    #[test]
    fn test_task_lookup() {
        let index = tasks();
        assert_eq!(index.len(), 2);
        assert_eq!(index.fragment("1"), Fragment::parse("0,0,100,50"));
        assert_eq!(index.link("1").as_deref(), Some("https://example.org/image/1"));
        assert_eq!(index.project_id("2"), Some(11));
    }

    #[test]
    fn test_task_lookup_misses() {
        let index = tasks();
        assert_eq!(index.fragment("2"), None);
        assert_eq!(index.link("2"), None);
        assert_eq!(index.fragment("3"), None);
        assert_eq!(index.fragment("not-a-number"), None);
    }

    #[test]
    fn test_duplicate_task_id() {
        let result = TaskIndex::from_items(&[json!({"id": 1}), json!({"id": 1})]);
        assert!(matches!(
            result,
            Err(HarvesterError::DuplicateReferenceKey { kind: "task", .. })
        ));
    }

    #[test]
    fn test_project_index() {
        let index = ProjectIndex::from_items(&[
            json!({"id": 10, "name": "Convert-a-Card: Chinese", "short_name": "cac-chi"}),
        ])
        .unwrap();
        assert_eq!(index.name(10), Some("Convert-a-Card: Chinese"));
        assert_eq!(index.name(11), None);
    }

    #[test]
    fn test_volume_index_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.yaml");
        fs::write(
            &path,
            r#"
- manifest_uri: https://api.bl.uk/metadata/iiif/ark:/81055/vdc_1/manifest.json
  theatre: Theatre Royal
  city: Margate
  country: England
  system_number: 014769123
- manifest_uri: https://api.bl.uk/metadata/iiif/ark:/81055/vdc_2/manifest.json
  theatre: Drury Lane
"#,
        )
        .unwrap();

        let index = VolumeIndex::from_file(&path).unwrap();
        assert_eq!(index.len(), 2);
        let margate = index.get("ark:/81055/vdc_1").unwrap();
        assert_eq!(margate.city.as_deref(), Some("Margate"));
        assert_eq!(margate.system_number.as_deref(), Some("014769123"));
        assert_eq!(index.get("ark:/81055/vdc_2").unwrap().city, None);
        assert!(index.get("ark:/81055/vdc_3").is_none());
    }

    #[test]
    fn test_report_missing_lists_each_container_once() {
        let index = VolumeIndex::new([VolumeMetadata {
            manifest_uri: "https://api.bl.uk/metadata/iiif/ark:/81055/vdc_1/manifest.json".to_string(),
            ..VolumeMetadata::default()
        }])
        .unwrap();

        let missing = index.report_missing([
            "ark:/81055/vdc_2",
            "ark:/81055/vdc_1",
            "ark:/81055/vdc_2",
            "ark:/81055/vdc_2",
        ]);
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["ark:/81055/vdc_2"]);

        assert!(VolumeIndex::default().report_missing(["ark:/81055/vdc_2"]).is_empty());
    }

    #[test]
    fn test_volume_index_rejects_duplicates_and_bad_manifests() {
        let volume = VolumeMetadata {
            manifest_uri: "https://api.bl.uk/metadata/iiif/ark:/81055/vdc_1/manifest.json".to_string(),
            theatre: None,
            city: None,
            country: None,
            system_number: None,
        };
        assert!(matches!(
            VolumeIndex::new([volume.clone(), volume.clone()]),
            Err(HarvesterError::DuplicateReferenceKey { kind: "volume", .. })
        ));

        let bad = VolumeMetadata {
            manifest_uri: "https://example.org/manifest.json".to_string(),
            ..volume
        };
        assert!(matches!(
            VolumeIndex::new([bad]),
            Err(HarvesterError::MalformedContainer(_))
        ));
    }
}
