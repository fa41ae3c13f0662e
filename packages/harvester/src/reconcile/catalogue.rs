//! Catalogue card reconciliation.
//!
//! Each card task produces a `reference` annotation (the shelfmark written on
//! the card) and a `control_number` annotation (the matching record found by
//! the volunteer). Joined on task id they tell which records can be created.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{TAG_CONTROL_NUMBER, TAG_REFERENCE};
use crate::annotation::CanonicalAnnotation;
use crate::error::{HarvesterError, Result};
use crate::lookup::{ProjectIndex, TaskLookup};
use crate::shelfmark::{clean_transcribed_shelfmark, ShelfmarkIndex};

/// Shelfmark transcriptions keyed by task id.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    references: HashMap<String, String>,
}

impl ReferenceIndex {
    /// Index `reference` annotations by task.
    ///
    /// A task with two references means the collection is corrupt.
    pub fn build(annotations: &[CanonicalAnnotation]) -> Result<Self> {
        let mut references = HashMap::new();
        for annotation in annotations.iter().filter(|a| a.has_tag(TAG_REFERENCE)) {
            let (Some(task_id), Some(value)) = (&annotation.task_id, &annotation.transcription)
            else {
                debug!(id = ?annotation.id, "Reference without task or value, skipping");
                continue;
            };
            if references.contains_key(task_id) {
                return Err(HarvesterError::DuplicateReferenceKey {
                    kind: "reference",
                    key: task_id.clone(),
                });
            }
            references.insert(task_id.clone(), value.clone());
        }
        Ok(Self { references })
    }

    /// Reference transcribed for a task.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<&str> {
        self.references.get(task_id).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// A control number next to the shelfmark of its card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlNumberEntry {
    pub task_id: Option<String>,
    pub control_number: String,
    pub reference: Option<String>,
}

/// Control numbers with their card's reference, in annotation order.
pub fn control_number_index(annotations: &[CanonicalAnnotation]) -> Result<Vec<ControlNumberEntry>> {
    let references = ReferenceIndex::build(annotations)?;
    Ok(control_numbers(annotations)
        .map(|(task_id, control_number)| ControlNumberEntry {
            task_id: task_id.map(str::to_string),
            control_number: control_number.to_string(),
            reference: task_id
                .and_then(|id| references.get(id))
                .map(str::to_string),
        })
        .collect())
}

fn control_numbers<'a>(
    annotations: &'a [CanonicalAnnotation],
) -> impl Iterator<Item = (Option<&'a str>, &'a str)> + 'a {
    annotations
        .iter()
        .filter(|a| a.has_tag(TAG_CONTROL_NUMBER))
        .filter_map(|a| Some((a.task_id.as_deref(), a.transcription.as_deref()?)))
}

/// A card whose record has not been created yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogueRecord {
    pub task_id: String,
    pub control_number: String,
    pub shelfmark: String,
    pub project: Option<String>,
    pub link: Option<String>,
}

/// Cards ready for record creation.
///
/// Shelfmarks already in `ingested` are dropped, later cards repeating a
/// shelfmark are dropped, and the rest are ordered by project name.
pub fn catalogue_candidates(
    annotations: &[CanonicalAnnotation],
    ingested: &ShelfmarkIndex,
    tasks: &dyn TaskLookup,
    projects: &ProjectIndex,
) -> Result<Vec<CatalogueRecord>> {
    let references = ReferenceIndex::build(annotations)?;
    let mut seen_shelfmarks = HashSet::new();
    let mut records = Vec::new();
    let mut already_ingested = 0usize;

    for (task_id, control_number) in control_numbers(annotations) {
        let Some(task_id) = task_id else {
            debug!(control_number, "Control number without task, skipping");
            continue;
        };
        let Some(reference) = references.get(task_id) else {
            warn!(task_id, "No reference for task, skipping");
            continue;
        };

        let shelfmark = clean_transcribed_shelfmark(reference);
        if ingested.contains(&shelfmark) {
            already_ingested += 1;
            continue;
        }
        if !seen_shelfmarks.insert(shelfmark.clone()) {
            debug!(task_id, shelfmark = %shelfmark, "Duplicate shelfmark, skipping");
            continue;
        }

        let project = tasks
            .project_id(task_id)
            .and_then(|id| projects.name(id))
            .map(str::to_string);
        records.push(CatalogueRecord {
            task_id: task_id.to_string(),
            control_number: control_number.to_string(),
            shelfmark,
            project,
            link: tasks.link(task_id),
        });
    }

    // Stable, so cards of a project stay in annotation order.
    records.sort_by(|a, b| a.project.cmp(&b.project));

    info!(
        candidates = records.len(),
        already_ingested, "Reconciled catalogue cards"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::lookup::TaskIndex;
    use crate::reconcile::join::test_support::{annotation, from_task};

    fn card(task_id: &str, reference: &str, control_number: &str) -> Vec<CanonicalAnnotation> {
        vec![
            from_task(annotation("c", "reference", reference), task_id),
            from_task(annotation("c", "control_number", control_number), task_id),
        ]
    }

    fn tasks() -> TaskIndex {
        TaskIndex::from_items(&[
            json!({"id": 1, "project_id": 20, "info": {"link": "https://example.org/1"}}),
            json!({"id": 2, "project_id": 10, "info": {"link": "https://example.org/2"}}),
            json!({"id": 3, "project_id": 10, "info": {}}),
            json!({"id": 4, "project_id": 20, "info": {}}),
        ])
        .unwrap()
    }

    fn projects() -> ProjectIndex {
        ProjectIndex::from_items(&[
            json!({"id": 10, "name": "Chinese"}),
            json!({"id": 20, "name": "Japanese"}),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_reference_is_error() {
        let mut annotations = card("1", "Add. 1", "123");
        annotations.extend(card("1", "Add. 2", "456"));
        assert!(matches!(
            ReferenceIndex::build(&annotations),
            Err(HarvesterError::DuplicateReferenceKey { kind: "reference", .. })
        ));
        assert!(control_number_index(&annotations).is_err());
    }

    #[test]
    fn test_control_number_index() {
        let mut annotations = card("1", "Add. 1", "123");
        annotations.push(from_task(annotation("c", "control_number", "999"), "9"));
        let index = control_number_index(&annotations).unwrap();
        assert_eq!(
            index,
            vec![
                ControlNumberEntry {
                    task_id: Some("1".to_string()),
                    control_number: "123".to_string(),
                    reference: Some("Add. 1".to_string()),
                },
                ControlNumberEntry {
                    task_id: Some("9".to_string()),
                    control_number: "999".to_string(),
                    reference: None,
                },
            ]
        );
    }

    #[test]
    fn test_candidates() {
        let annotations: Vec<CanonicalAnnotation> = [
            card("1", "chi. 5 (a", "111"),
            card("2", "Add. 1", "222"),
            card("3", "C.49.b.12", "333"),
            card("4", "Chi. 5 (a)", "444"),
        ]
        .concat();
        let ingested = ShelfmarkIndex::new(["ADD 1"]);

        let records = catalogue_candidates(&annotations, &ingested, &tasks(), &projects()).unwrap();

        assert_eq!(
            records,
            vec![
                CatalogueRecord {
                    task_id: "3".to_string(),
                    control_number: "333".to_string(),
                    shelfmark: "C.49.b.12".to_string(),
                    project: Some("Chinese".to_string()),
                    link: None,
                },
                CatalogueRecord {
                    task_id: "1".to_string(),
                    control_number: "111".to_string(),
                    shelfmark: "CHI. 5 (a)".to_string(),
                    project: Some("Japanese".to_string()),
                    link: Some("https://example.org/1".to_string()),
                },
            ]
        );
    }
}
