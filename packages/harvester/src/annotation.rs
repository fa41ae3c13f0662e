//! Web Annotation records and their canonical, typed form.
//!
//! Upstream annotations are loosely shaped: `body` may be one object or a
//! list, `target` may be a bare canvas URI or an object with a fragment
//! selector, and the originating task only appears inside a generator URI.
//! [`normalize`] flattens all of that into a [`CanonicalAnnotation`].

use std::cmp::Ordering;
use std::slice;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{HarvesterError, Result};

/// Motivation of annotations carrying transcriptions.
pub const MOTIVATION_DESCRIBING: &str = "describing";

/// Body purpose of a tag value.
pub const PURPOSE_TAGGING: &str = "tagging";

/// Body purpose of a transcription value.
pub const PURPOSE_DESCRIBING: &str = "describing";

/// Prefix of a media fragment selector value.
pub const XYWH_PREFIX: &str = "?xywh=";

/// Suffix stripped from `partOf` manifest URIs.
pub const MANIFEST_SUFFIX: &str = "/manifest.json";

/// Path delimiter preceding the container identifier.
pub const IIIF_DELIMITER: &str = "/iiif/";

/// Marker identifying a task API URI in a generator.
pub const TASK_API_MARKER: &str = "api/task";

/// A single value or a list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Iterate over the contained values.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        match self {
            Self::One(value) => slice::from_ref(value).iter(),
            Self::Many(values) => values.iter(),
        }
    }
}

/// One typed value of an annotation body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyItem {
    #[serde(default)]
    pub purpose: Option<String>,

    #[serde(default)]
    pub value: Option<Value>,
}

/// Selector of a specific resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub value: String,
}

/// Annotation target: a bare source URI or a source with a selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Source(String),
    Specific {
        source: String,
        #[serde(default)]
        selector: Option<Selector>,
    },
}

/// Software or person that generated an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(default)]
    pub id: Option<String>,
}

/// Annotation as served by the annotation server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnnotation {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub body: Option<OneOrMany<BodyItem>>,

    pub target: Target,

    #[serde(default)]
    pub motivation: Option<String>,

    #[serde(rename = "partOf", default)]
    pub part_of: Option<String>,

    #[serde(default)]
    pub generator: Option<OneOrMany<Agent>>,
}

impl RawAnnotation {
    /// Whether this annotation carries a transcription.
    #[must_use]
    pub fn is_describing(&self) -> bool {
        self.motivation.as_deref() == Some(MOTIVATION_DESCRIBING)
    }
}

/// Rectangular region `(x, y, w, h)` on a source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Fragment {
    /// Parse a selector value such as `?xywh=10,20,300,40`.
    ///
    /// Returns `None` unless there are exactly four numeric components.
    ///
    /// # Examples
    /// ```
    /// use annotation_harvester::annotation::Fragment;
    ///
    /// let fragment = Fragment::parse("?xywh=10,20,300,40").unwrap();
    /// assert_eq!((fragment.x, fragment.y), (10.0, 20.0));
    /// assert!(Fragment::parse("?xywh=10,20").is_none());
    /// ```
    pub fn parse(selector: &str) -> Option<Self> {
        let coords = selector.strip_prefix(XYWH_PREFIX).unwrap_or(selector);
        let parts = coords
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok().filter(|n| n.is_finite()))
            .collect::<Option<Vec<f64>>>()?;
        match parts.as_slice() {
            [x, y, w, h] => Some(Self {
                x: *x,
                y: *y,
                w: *w,
                h: *h,
            }),
            _ => None,
        }
    }

    /// Reading order: top to bottom, then left to right.
    #[must_use]
    pub fn reading_order(&self, other: &Self) -> Ordering {
        self.y
            .total_cmp(&other.y)
            .then_with(|| self.x.total_cmp(&other.x))
    }
}

/// Typed view of a describing annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAnnotation {
    /// Annotation URI.
    pub id: Option<String>,

    /// First body value tagged with purpose `tagging`.
    pub tag: Option<String>,

    /// First body value tagged with purpose `describing`.
    pub transcription: Option<String>,

    /// Canvas the annotation targets.
    pub source: String,

    /// Region of the canvas, when the target carries a selector.
    pub fragment: Option<Fragment>,

    /// Manifest-level grouping key derived from `partOf`.
    pub container: String,

    /// Task that produced the annotation.
    pub task_id: Option<String>,
}

impl CanonicalAnnotation {
    /// Whether the annotation carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag.as_deref() == Some(tag)
    }
}

/// First body value with the given purpose.
pub fn body_value(body: Option<&OneOrMany<BodyItem>>, purpose: &str) -> Option<String> {
    body?
        .iter()
        .find(|item| item.purpose.as_deref() == Some(purpose))
        .and_then(|item| match item.value.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
}

/// Canvas identifier of a target.
pub fn source_of(target: &Target) -> &str {
    match target {
        Target::Source(source) => source,
        Target::Specific { source, .. } => source,
    }
}

/// Fragment of a target; bare targets have none.
pub fn fragment_of(target: &Target) -> Option<Fragment> {
    let Target::Specific {
        selector: Some(selector),
        ..
    } = target
    else {
        return None;
    };
    let fragment = Fragment::parse(&selector.value);
    if fragment.is_none() {
        debug!(selector = %selector.value, "Unparseable fragment selector");
    }
    fragment
}

/// Container identifier of a manifest URI.
///
/// # Examples
/// ```
/// use annotation_harvester::annotation::container_id;
///
/// let manifest = "https://api.bl.uk/metadata/iiif/ark:/81055/vdc_1.0x000001/manifest.json";
/// assert_eq!(container_id(manifest).unwrap(), "ark:/81055/vdc_1.0x000001");
/// assert!(container_id("https://example.org/manifest.json").is_err());
/// ```
pub fn container_id(part_of: &str) -> Result<String> {
    let trimmed = part_of.strip_suffix(MANIFEST_SUFFIX).unwrap_or(part_of);
    trimmed
        .split(IIIF_DELIMITER)
        .nth(1)
        .filter(|container| !container.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HarvesterError::MalformedContainer(part_of.to_string()))
}

/// Task identifier encoded in the first task API generator.
pub fn task_id_of(generator: Option<&OneOrMany<Agent>>) -> Option<String> {
    generator?
        .iter()
        .filter_map(|agent| agent.id.as_deref())
        .find(|id| id.contains(TASK_API_MARKER))
        .and_then(|id| id.trim_end_matches('/').rsplit('/').next())
        .filter(|task_id| !task_id.is_empty())
        .map(str::to_string)
}

/// Normalize one raw annotation.
///
/// Missing optional fields become `None`. A missing or malformed `partOf`
/// is a data integrity error and is returned as
/// [`HarvesterError::MalformedContainer`].
pub fn normalize(raw: &RawAnnotation) -> Result<CanonicalAnnotation> {
    let part_of = raw.part_of.as_deref().unwrap_or_default();
    Ok(CanonicalAnnotation {
        id: raw.id.clone(),
        tag: body_value(raw.body.as_ref(), PURPOSE_TAGGING),
        transcription: body_value(raw.body.as_ref(), PURPOSE_DESCRIBING),
        source: source_of(&raw.target).to_string(),
        fragment: fragment_of(&raw.target),
        container: container_id(part_of)?,
        task_id: task_id_of(raw.generator.as_ref()),
    })
}

/// Normalize the describing annotations of a collection, dropping the rest.
pub fn normalize_all(raws: &[RawAnnotation]) -> Result<Vec<CanonicalAnnotation>> {
    raws.iter()
        .filter(|raw| raw.is_describing())
        .map(normalize)
        .collect()
}

/// Decode and normalize harvested JSON items.
///
/// The motivation is checked before decoding, so annotations that are out
/// of scope never need to match the describing shape.
pub fn normalize_items(items: &[Value]) -> Result<Vec<CanonicalAnnotation>> {
    let mut annotations = Vec::new();
    for item in items {
        if item.get("motivation").and_then(Value::as_str) != Some(MOTIVATION_DESCRIBING) {
            continue;
        }
        let raw: RawAnnotation = serde_json::from_value(item.clone())?;
        annotations.push(normalize(&raw)?);
    }
    debug!(
        items = items.len(),
        describing = annotations.len(),
        "Normalized annotations"
    );
    Ok(annotations)
}
