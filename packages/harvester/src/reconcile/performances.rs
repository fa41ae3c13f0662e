//! Performance records joining titles with dates and genres.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::info;

use super::date::resolve_date;
use super::join::{with_tag, JoinIndex, JoinMode};
use super::{TAG_DATE, TAG_GENRE, TAG_TITLE};
use crate::annotation::CanonicalAnnotation;
use crate::lookup::{TaskLookup, VolumeIndex};

/// One performance of a title on a playbill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformanceRecord {
    pub source: String,
    pub title: Option<String>,
    pub title_task_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub genres: Vec<String>,
    pub link: Option<String>,
    pub theatre: Option<String>,
    pub city: Option<String>,
}

/// Reconcile performances from a playbill collection.
///
/// Every title annotation yields exactly one record. The date comes from the
/// date annotations on the same source; genres are those marked on the
/// region the title's task asked about.
pub fn reconcile_performances(
    annotations: &[CanonicalAnnotation],
    tasks: &dyn TaskLookup,
    volumes: &VolumeIndex,
) -> Vec<PerformanceRecord> {
    let dates = JoinIndex::new(with_tag(annotations, TAG_DATE));
    let genres = JoinIndex::new(with_tag(annotations, TAG_GENRE));

    let titles = with_tag(annotations, TAG_TITLE);
    volumes.report_missing(titles.iter().map(|title| title.container.as_str()));

    let records: Vec<PerformanceRecord> = titles
        .into_iter()
        .map(|title| {
            let date_values: Vec<&str> = dates
                .matches(title, JoinMode::Identity)
                .into_iter()
                .filter_map(|date| date.transcription.as_deref())
                .collect();
            let resolution = resolve_date(&date_values);
            resolution.log_rejection(&title.source);

            let title_genres = genres
                .matches(title, JoinMode::Spatial(tasks))
                .into_iter()
                .filter_map(|genre| genre.transcription.clone())
                .collect();

            let volume = volumes.get(&title.container);
            PerformanceRecord {
                source: title.source.clone(),
                title: title.transcription.clone(),
                title_task_id: title.task_id.clone(),
                date: resolution.date(),
                genres: title_genres,
                link: title.task_id.as_deref().and_then(|id| tasks.link(id)),
                theatre: volume.and_then(|v| v.theatre.clone()),
                city: volume.and_then(|v| v.city.clone()),
            }
        })
        .collect();

    info!(performances = records.len(), "Reconciled performances");
    records
}

/// Performances dated on `month`/`day` of any year.
pub fn performances_on(records: &[PerformanceRecord], month: u32, day: u32) -> Vec<&PerformanceRecord> {
    records
        .iter()
        .filter(|record| {
            record
                .date
                .is_some_and(|date| date.month() == month && date.day() == day)
        })
        .collect()
}
