//! Reconciliation of normalized annotations into domain records.
//!
//! Annotations of one collection are grouped, ordered and joined with each
//! other and with reference metadata. The building blocks live in [`join`]
//! and [`date`]; the remaining modules each produce one kind of record.
//!
//! Every reconciliation is a pure function of its inputs. Annotations that
//! cannot contribute are skipped and logged, never raised.

pub mod catalogue;
pub mod date;
pub mod join;
pub mod performances;
pub mod sheets;
pub mod titles;
pub mod transcriptions;

pub use catalogue::{
    catalogue_candidates, control_number_index, CatalogueRecord, ControlNumberEntry,
    ReferenceIndex,
};
pub use date::{resolve_date, DateResolution};
pub use join::{group_by, pivot, sort_reading_order, with_tag, JoinIndex, JoinKey, JoinMode};
pub use performances::{performances_on, reconcile_performances, PerformanceRecord};
pub use sheets::{reconcile_sheets, SheetPolicy, SheetRecord};
pub use titles::{title_index, TitleIndexEntry, TitleIndexRow};
pub use transcriptions::{transcriptions_by_tag, TagTranscription};

/// Tag of playbill titles.
pub const TAG_TITLE: &str = "title";

/// Tag of performance dates.
pub const TAG_DATE: &str = "date";

/// Tag of performance genres.
pub const TAG_GENRE: &str = "genre";

/// Tag of catalogue card shelfmarks.
pub const TAG_REFERENCE: &str = "reference";

/// Tag of catalogue control numbers.
pub const TAG_CONTROL_NUMBER: &str = "control_number";
