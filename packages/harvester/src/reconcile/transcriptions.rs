//! Plain transcription listings grouped by tag.

use std::collections::BTreeMap;

use serde::Serialize;

use super::join::{group_by, JoinKey};
use crate::annotation::CanonicalAnnotation;

/// One transcription as listed in a per-tag export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagTranscription {
    pub id: Option<String>,
    pub tag: String,
    pub value: Option<String>,
}

/// Transcriptions grouped by tag, in annotation order within each tag.
pub fn transcriptions_by_tag(annotations: &[CanonicalAnnotation]) -> BTreeMap<String, Vec<TagTranscription>> {
    group_by(annotations, JoinKey::Tag)
        .into_iter()
        .map(|(tag, members)| {
            let rows = members
                .into_iter()
                .map(|annotation| TagTranscription {
                    id: annotation.id.clone(),
                    tag: tag.to_string(),
                    value: annotation.transcription.clone(),
                })
                .collect();
            (tag.to_string(), rows)
        })
        .collect()
}
