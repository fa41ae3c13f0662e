//! One record per annotated sheet.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use super::date::resolve_date;
use super::join::{group_by, pivot, sort_reading_order, JoinKey};
use super::{TAG_DATE, TAG_TITLE};
use crate::annotation::CanonicalAnnotation;
use crate::lookup::{VolumeIndex, VolumeMetadata};

/// Which sheets are worth a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetPolicy {
    /// Tags every kept sheet must carry.
    pub required_tags: Vec<String>,

    /// Drop sheets without a resolved date.
    pub require_date: bool,
}

impl SheetPolicy {
    /// Sheets usable as catalogue records: a title and one full date.
    #[must_use]
    pub fn catalogue() -> Self {
        Self {
            required_tags: vec![TAG_TITLE.to_string()],
            require_date: true,
        }
    }
}

/// Reconciled sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRecord {
    pub source: String,

    pub container: String,

    /// Transcriptions by tag, in reading order. Dates are in `date`.
    pub values: BTreeMap<String, Vec<String>>,

    pub date: Option<NaiveDate>,

    pub volume: Option<VolumeMetadata>,
}

/// Build one record per source.
///
/// Members are read top to bottom, left to right, so multi-valued tags keep
/// their order on the page. Sheets failing `policy` are skipped.
pub fn reconcile_sheets(
    annotations: &[CanonicalAnnotation],
    volumes: &VolumeIndex,
    policy: &SheetPolicy,
) -> Vec<SheetRecord> {
    let mut records = Vec::new();
    volumes.report_missing(annotations.iter().map(|annotation| annotation.container.as_str()));

    for (source, mut members) in group_by(annotations, JoinKey::Source) {
        sort_reading_order(&mut members);
        let mut values = pivot(&members);

        let dates = values.remove(TAG_DATE).unwrap_or_default();
        let resolution = resolve_date(&dates);
        resolution.log_rejection(source);
        let date = resolution.date();

        if let Some(missing) = policy
            .required_tags
            .iter()
            .find(|tag| !values.contains_key(tag.as_str()))
        {
            debug!(source, tag = %missing, "Sheet lacks required tag, skipping");
            continue;
        }
        if policy.require_date && date.is_none() {
            debug!(source, "Sheet has no usable date, skipping");
            continue;
        }

        // Groups are never empty.
        let container = members
            .first()
            .map(|member| member.container.clone())
            .unwrap_or_default();
        let volume = volumes.get(&container).cloned();

        records.push(SheetRecord {
            source: source.to_string(),
            container,
            values,
            date,
            volume,
        });
    }

    info!(sheets = records.len(), "Reconciled sheets");
    records
}
