//! Shelfmark normalization for catalogue matching.
//!
//! Transcribed shelfmarks are compared against shelfmarks of records that
//! already exist. Both sides go through [`normalize`], so the function must be
//! idempotent: the normalized form of a normalized shelfmark is itself.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Width every run of digits is padded to.
pub const DIGIT_PAD_WIDTH: usize = 7;

/// A run of ASCII digits.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

/// An opening parenthesis not followed by a closing one.
#[allow(clippy::expect_used)]
static UNCLOSED_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*$").expect("valid regex"));

/// An opening square bracket not followed by a closing one.
#[allow(clippy::expect_used)]
static UNCLOSED_SQUARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*$").expect("valid regex"));

/// Leading `chi.` in any case.
#[allow(clippy::expect_used)]
static CHI_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^chi\.").expect("valid regex"));

/// Normalize a shelfmark for comparison.
///
/// The steps run in a fixed order. Ampersand padding has to follow
/// whitespace removal, otherwise the padding would be stripped again.
///
/// # Examples
/// ```
/// use annotation_harvester::shelfmark::normalize;
///
/// assert_eq!(normalize("Add. 1"), "ADD      1");
/// assert_eq!(normalize("Add MS [123"), "ADDMS(    123)");
/// assert_eq!(normalize(&normalize("C.49.b.12")), normalize("C.49.b.12"));
/// ```
#[must_use]
pub fn normalize(shelfmark: &str) -> String {
    let compact: String = shelfmark
        .chars()
        .filter(|c| !c.is_whitespace())
        .filter(|c| !matches!(c, ',' | '.' | ';' | ':'))
        .map(|c| match c {
            '[' | '{' => '(',
            ']' | '}' => ')',
            '_' => '-',
            other => other,
        })
        .collect();

    let closed = close_unclosed(&compact, &UNCLOSED_PAREN, ')');
    let spaced = closed.replace('&', " & ");
    let padded = DIGIT_RUN.replace_all(&spaced, |caps: &Captures<'_>| {
        format!("{:>width$}", &caps[0], width = DIGIT_PAD_WIDTH)
    });

    padded.to_uppercase()
}

/// Tidy a transcribed shelfmark before it is displayed or matched.
///
/// Closes an unclosed trailing parenthesis or square bracket and
/// capitalizes a leading `chi.`.
///
/// # Examples
/// ```
/// use annotation_harvester::shelfmark::clean_transcribed_shelfmark;
///
/// assert_eq!(clean_transcribed_shelfmark("chi. 123 [a"), "CHI. 123 [a]");
/// ```
#[must_use]
pub fn clean_transcribed_shelfmark(value: &str) -> String {
    let value = close_unclosed(value, &UNCLOSED_PAREN, ')');
    let value = close_unclosed(&value, &UNCLOSED_SQUARE, ']');
    CHI_PREFIX.replace(&value, "CHI.").into_owned()
}

fn close_unclosed(value: &str, pattern: &Regex, closer: char) -> String {
    let mut out = value.to_string();
    if pattern.is_match(value) {
        out.push(closer);
    }
    out
}

/// Set of normalized shelfmarks of existing catalogue records.
#[derive(Debug, Clone, Default)]
pub struct ShelfmarkIndex {
    normalized: HashSet<String>,
}

impl ShelfmarkIndex {
    /// Build an index from reference shelfmarks.
    pub fn new<I, S>(shelfmarks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            normalized: shelfmarks
                .into_iter()
                .map(|s| normalize(s.as_ref()))
                .collect(),
        }
    }

    /// Whether a shelfmark, normalized, is in the index.
    #[must_use]
    pub fn contains(&self, shelfmark: &str) -> bool {
        self.normalized.contains(&normalize(shelfmark))
    }

    /// Number of distinct normalized shelfmarks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}
