//! Date policy for reconciled records.
//!
//! A record gets a date only when exactly one complete `YYYY-MM-DD` value was
//! transcribed for it. Everything else is rejected and logged, never raised.

use chrono::NaiveDate;
use tracing::warn;

/// Format transcribed dates are expected in.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Length of a complete date.
pub const FULL_DATE_LEN: usize = 10;

/// Outcome of resolving the dates transcribed for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateResolution {
    /// No date was transcribed.
    Missing,
    /// Exactly one complete date.
    Resolved(NaiveDate),
    /// More than one date; the count is kept for logging.
    Ambiguous(usize),
    /// A single date with missing parts, such as `1890-05`.
    Partial(String),
    /// A single complete-length value that is not a date.
    Unparseable(String),
}

impl DateResolution {
    /// The resolved date, if any.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Resolved(date) => Some(*date),
            _ => None,
        }
    }

    /// Log why no date was resolved. `Missing` is not worth a warning.
    pub fn log_rejection(&self, source: &str) {
        match self {
            Self::Ambiguous(count) => warn!(source, count, "Multiple dates, skipping"),
            Self::Partial(value) => warn!(source, value = %value, "Partial date, skipping"),
            Self::Unparseable(value) => warn!(source, value = %value, "Unparseable date, skipping"),
            Self::Missing | Self::Resolved(_) => {}
        }
    }
}

/// Resolve the date values transcribed for one record.
///
/// # Examples
/// ```
/// use annotation_harvester::reconcile::date::{resolve_date, DateResolution};
///
/// assert!(resolve_date(&["1890-05-03"]).date().is_some());
/// assert_eq!(resolve_date(&["1890-05-03", "1890-05-04"]), DateResolution::Ambiguous(2));
/// assert_eq!(resolve_date(&["1890-05"]), DateResolution::Partial("1890-05".to_string()));
/// ```
pub fn resolve_date<S: AsRef<str>>(values: &[S]) -> DateResolution {
    match values {
        [] => DateResolution::Missing,
        [value] => {
            let value = value.as_ref().trim();
            if value.chars().count() < FULL_DATE_LEN {
                return DateResolution::Partial(value.to_string());
            }
            match NaiveDate::parse_from_str(value, DATE_FORMAT) {
                Ok(date) => DateResolution::Resolved(date),
                Err(_) => DateResolution::Unparseable(value.to_string()),
            }
        }
        many => DateResolution::Ambiguous(many.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_single_full_date() {
        let resolution = resolve_date(&["1890-05-03"]);
        assert_eq!(resolution.date(), NaiveDate::from_ymd_opt(1890, 5, 3));
    }

    #[test]
    fn test_trims_whitespace() {
        assert!(resolve_date(&[" 1890-05-03\n"]).date().is_some());
    }

    #[test]
    fn test_rejections() {
        let empty: [&str; 0] = [];
        assert_eq!(resolve_date(&empty), DateResolution::Missing);
        assert_eq!(
            resolve_date(&["1890-05-03", "1890-05-03"]),
            DateResolution::Ambiguous(2)
        );
        assert_eq!(resolve_date(&["1890"]), DateResolution::Partial("1890".into()));
        assert_eq!(
            resolve_date(&["1890-13-45"]),
            DateResolution::Unparseable("1890-13-45".into())
        );
        assert_eq!(
            resolve_date(&["third of May"]),
            DateResolution::Unparseable("third of May".into())
        );
    }

    #[test]
    fn test_only_resolved_yields_date() {
        assert_eq!(DateResolution::Missing.date(), None);
        assert_eq!(DateResolution::Ambiguous(3).date(), None);
        assert_eq!(DateResolution::Partial("1890".into()).date(), None);
    }
}
