//! Grouping, pivoting and joining primitives shared by every reconciliation.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::annotation::{CanonicalAnnotation, Fragment};
use crate::lookup::TaskLookup;

/// Attribute annotations are grouped or joined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKey {
    /// Canvas identity.
    Source,
    /// Originating task.
    TaskId,
    /// Manifest / volume.
    Container,
    /// Annotation tag.
    Tag,
}

impl JoinKey {
    /// Value of this key on an annotation, if it has one.
    pub fn of<'a>(&self, annotation: &'a CanonicalAnnotation) -> Option<&'a str> {
        match self {
            Self::Source => Some(annotation.source.as_str()),
            Self::TaskId => annotation.task_id.as_deref(),
            Self::Container => Some(annotation.container.as_str()),
            Self::Tag => annotation.tag.as_deref(),
        }
    }
}

/// Partition annotations by `key`.
///
/// Groups are ordered by key and keep members in input order, so identical
/// input always yields identical output. Annotations lacking the key are
/// left out.
pub fn group_by<'a, I>(annotations: I, key: JoinKey) -> BTreeMap<&'a str, Vec<&'a CanonicalAnnotation>>
where
    I: IntoIterator<Item = &'a CanonicalAnnotation>,
{
    let mut groups: BTreeMap<&'a str, Vec<&'a CanonicalAnnotation>> = BTreeMap::new();
    for annotation in annotations {
        if let Some(value) = key.of(annotation) {
            groups.entry(value).or_default().push(annotation);
        }
    }
    groups
}

/// Annotations carrying `tag`.
pub fn with_tag<'a, I>(annotations: I, tag: &str) -> Vec<&'a CanonicalAnnotation>
where
    I: IntoIterator<Item = &'a CanonicalAnnotation>,
{
    annotations
        .into_iter()
        .filter(|annotation| annotation.has_tag(tag))
        .collect()
}

/// Sort into reading order: by fragment top, then left.
///
/// The sort is stable; annotations without a fragment keep their relative
/// order after all positioned ones.
pub fn sort_reading_order(members: &mut [&CanonicalAnnotation]) {
    members.sort_by(|a, b| match (&a.fragment, &b.fragment) {
        (Some(fa), Some(fb)) => fa.reading_order(fb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Transcriptions of `members` carrying `tag`, in member order.
pub fn values<'a>(members: &[&'a CanonicalAnnotation], tag: &str) -> Vec<&'a str> {
    members
        .iter()
        .filter(|annotation| annotation.has_tag(tag))
        .filter_map(|annotation| annotation.transcription.as_deref())
        .collect()
}

/// Pivot members into tag columns.
///
/// Every transcription is kept, in member order; untagged or empty
/// annotations contribute nothing.
pub fn pivot(members: &[&CanonicalAnnotation]) -> BTreeMap<String, Vec<String>> {
    let mut columns: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for annotation in members {
        if let (Some(tag), Some(value)) = (&annotation.tag, &annotation.transcription) {
            columns.entry(tag.clone()).or_default().push(value.clone());
        }
    }
    columns
}

/// How a left annotation is matched against candidates on the same source.
#[derive(Clone, Copy)]
pub enum JoinMode<'t> {
    /// Every candidate on the same source matches.
    Identity,
    /// Only candidates covering the same region match.
    ///
    /// The left region is the one its task asked about; a candidate's region
    /// is its own selector, or its task's when it has none.
    Spatial(&'t dyn TaskLookup),
}

/// Region of the task that produced `annotation`, else its own selector.
pub fn task_fragment(annotation: &CanonicalAnnotation, tasks: &dyn TaskLookup) -> Option<Fragment> {
    annotation
        .task_id
        .as_deref()
        .and_then(|task_id| tasks.fragment(task_id))
        .or(annotation.fragment)
}

/// Own selector of `annotation`, else the region of its task.
pub fn own_fragment(annotation: &CanonicalAnnotation, tasks: &dyn TaskLookup) -> Option<Fragment> {
    annotation.fragment.or_else(|| {
        annotation
            .task_id
            .as_deref()
            .and_then(|task_id| tasks.fragment(task_id))
    })
}

/// Right-hand side of a join, indexed by source.
pub struct JoinIndex<'a> {
    by_source: BTreeMap<&'a str, Vec<&'a CanonicalAnnotation>>,
}

impl<'a> JoinIndex<'a> {
    /// Index candidates by source.
    pub fn new<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = &'a CanonicalAnnotation>,
    {
        Self {
            by_source: group_by(candidates, JoinKey::Source),
        }
    }

    /// Candidates joined to `left` under `mode`, in input order.
    ///
    /// A left annotation whose region cannot be resolved matches nothing in
    /// spatial mode.
    pub fn matches(&self, left: &CanonicalAnnotation, mode: JoinMode<'_>) -> Vec<&'a CanonicalAnnotation> {
        let Some(candidates) = self.by_source.get(left.source.as_str()) else {
            return Vec::new();
        };
        match mode {
            JoinMode::Identity => candidates.clone(),
            JoinMode::Spatial(tasks) => {
                let Some(anchor) = task_fragment(left, tasks) else {
                    return Vec::new();
                };
                candidates
                    .iter()
                    .copied()
                    .filter(|candidate| own_fragment(candidate, tasks) == Some(anchor))
                    .collect()
            }
        }
    }
}
