//! Title index: the titles found on each canvas.

use serde::Serialize;

use super::join::{group_by, sort_reading_order, values, with_tag, JoinKey};
use super::TAG_TITLE;
use crate::annotation::{CanonicalAnnotation, IIIF_DELIMITER};

/// Suffix marking a summary that omits further titles.
pub const MORE_TITLES_SUFFIX: &str = ", etc.";

/// Titles of one canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleIndexEntry {
    pub container: String,

    /// Canvas part of the source URI.
    pub canvas: String,

    /// Every transcribed title, in reading order.
    pub titles: Vec<String>,
}

/// Flattened entry for tabular output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleIndexRow {
    pub container: String,
    pub canvas: String,
    pub title: String,
}

impl TitleIndexEntry {
    /// First title, with `", etc."` when the canvas holds more.
    ///
    /// # Examples
    /// ```
    /// use annotation_harvester::reconcile::TitleIndexEntry;
    ///
    /// let mut entry = TitleIndexEntry {
    ///     container: "ark:/81055/vdc_1".into(),
    ///     canvas: "ark:/81055/vdc_1.0x000001".into(),
    ///     titles: vec!["Hamlet".into()],
    /// };
    /// assert_eq!(entry.summary(), "Hamlet");
    /// entry.titles.push("The Padlock".into());
    /// assert_eq!(entry.summary(), "Hamlet, etc.");
    /// ```
    #[must_use]
    pub fn summary(&self) -> String {
        match self.titles.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            [first, ..] => format!("{first}{MORE_TITLES_SUFFIX}"),
        }
    }

    /// Row with the summary as its title.
    #[must_use]
    pub fn to_row(&self) -> TitleIndexRow {
        TitleIndexRow {
            container: self.container.clone(),
            canvas: self.canvas.clone(),
            title: self.summary(),
        }
    }
}

/// Canvas identifier: whatever follows the last `/iiif/` in the source.
fn canvas_of(source: &str) -> &str {
    source.rsplit(IIIF_DELIMITER).next().unwrap_or(source)
}

/// Index title annotations by canvas.
///
/// Canvases without any title transcription are left out.
pub fn title_index(annotations: &[CanonicalAnnotation]) -> Vec<TitleIndexEntry> {
    group_by(with_tag(annotations, TAG_TITLE), JoinKey::Source)
        .into_iter()
        .filter_map(|(source, mut members)| {
            sort_reading_order(&mut members);
            let titles: Vec<String> = values(&members, TAG_TITLE)
                .into_iter()
                .map(str::to_string)
                .collect();
            let first = members.first()?;
            (!titles.is_empty()).then(|| TitleIndexEntry {
                container: first.container.clone(),
                canvas: canvas_of(source).to_string(),
                titles,
            })
        })
        .collect()
}
