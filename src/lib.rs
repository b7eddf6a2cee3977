pub mod cli;
pub mod config;
pub mod extractor;
pub mod git;
pub mod matcher;
pub mod processor;
pub mod state;
pub mod status;

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Translation pipeline state of a commit (or of a whole branch).
///
/// The first five variants are ordered; `Missing` and `NotFound` carry no
/// ordinal and never compare against the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhraseStatus {
    /// Imported but not yet submitted for translation.
    Untranslated,
    /// Submitted for translation.
    Pending,
    /// Pulled at least once, but some translations are still outstanding.
    Pulling,
    /// Every translation has been downloaded and catalogued.
    Pulled,
    /// Translated into every supported locale.
    Translated,
    /// The commit no longer exists (force-push or deleted branch).
    Missing,
    /// The ref never entered the pipeline.
    NotFound,
}

impl PhraseStatus {
    pub const INCOMPLETE: &'static [PhraseStatus] = &[
        PhraseStatus::Untranslated,
        PhraseStatus::Pending,
        PhraseStatus::Pulling,
        PhraseStatus::Pulled,
    ];

    pub const STATUSES: &'static [PhraseStatus] = &[
        PhraseStatus::Untranslated,
        PhraseStatus::Pending,
        PhraseStatus::Pulling,
        PhraseStatus::Pulled,
        PhraseStatus::Translated,
    ];

    pub const ALL: &'static [PhraseStatus] = &[
        PhraseStatus::Untranslated,
        PhraseStatus::Pending,
        PhraseStatus::Pulling,
        PhraseStatus::Pulled,
        PhraseStatus::Translated,
        PhraseStatus::Missing,
    ];

    /// Position within `STATUSES`, or `None` for the sentinel states.
    pub fn ordinal(self) -> Option<usize> {
        Self::STATUSES.iter().position(|s| *s == self)
    }

    pub fn is_incomplete(self) -> bool {
        Self::INCOMPLETE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhraseStatus::Untranslated => "UNTRANSLATED",
            PhraseStatus::Pending => "PENDING",
            PhraseStatus::Pulling => "PULLING",
            PhraseStatus::Pulled => "PULLED",
            PhraseStatus::Translated => "TRANSLATED",
            PhraseStatus::Missing => "MISSING",
            PhraseStatus::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for PhraseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown phrase status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PhraseStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhraseStatus::ALL
            .iter()
            .chain(std::iter::once(&PhraseStatus::NotFound))
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A unit of translatable text discovered in a commit diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Phrase {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_key: Option<String>,
    pub file: String,
    pub commit_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
}

impl Phrase {
    pub fn new(
        key: impl Into<String>,
        meta_key: Option<String>,
        file: impl Into<String>,
        commit_id: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            meta_key,
            file: file.into(),
            commit_id: commit_id.into(),
            author_name: None,
            author_email: None,
            line_number: None,
        }
    }

    /// SHA-256 of the key and meta key; identifies the phrase within a file.
    pub fn index_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update([0u8]);
        if let Some(meta_key) = &self.meta_key {
            hasher.update(meta_key.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Persisted per-commit record of translation progress.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitLog {
    pub repo_name: String,
    pub commit_id: String,
    pub branch_name: Option<String>,
    pub status: PhraseStatus,
    pub phrase_count: usize,
    /// Set once the commit has completed a full extraction/ingestion pass.
    pub finalized: bool,
    /// Translated phrase count per locale.
    pub locales: BTreeMap<String, usize>,
}

/// Translation progress of a single locale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocaleStatus {
    pub locale: String,
    pub translated_count: usize,
    pub percent_translated: f64,
}

impl LocaleStatus {
    pub fn new(locale: impl Into<String>, translated_count: usize, phrase_count: usize) -> Self {
        let percent_translated = if phrase_count == 0 {
            0.0
        } else {
            (translated_count as f64 / phrase_count as f64).min(1.0)
        };
        Self {
            locale: locale.into(),
            translated_count,
            percent_translated,
        }
    }
}

/// Result of a status query for a ref.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefStatus {
    pub commit_id: String,
    pub status: PhraseStatus,
    pub phrase_count: usize,
    pub locales: Vec<LocaleStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_follow_pipeline_order() {
        assert_eq!(PhraseStatus::Untranslated.ordinal(), Some(0));
        assert_eq!(PhraseStatus::Translated.ordinal(), Some(4));
        assert_eq!(PhraseStatus::Missing.ordinal(), None);
        assert_eq!(PhraseStatus::NotFound.ordinal(), None);
    }

    #[test]
    fn incomplete_excludes_translated_and_sentinels() {
        assert!(PhraseStatus::Pulled.is_incomplete());
        assert!(!PhraseStatus::Translated.is_incomplete());
        assert!(!PhraseStatus::Missing.is_incomplete());
        assert!(!PhraseStatus::NotFound.is_incomplete());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in PhraseStatus::ALL {
            assert_eq!(status.as_str().parse::<PhraseStatus>().unwrap(), *status);
        }
        assert_eq!(
            "not_found".parse::<PhraseStatus>().unwrap(),
            PhraseStatus::NotFound
        );
        assert!("FINISHED".parse::<PhraseStatus>().is_err());
    }

    #[test]
    fn unknown_status_names_the_input() {
        let err = "FINISHED".parse::<PhraseStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("FINISHED".to_string()));
        assert_eq!(err.to_string(), "unknown phrase status: FINISHED");
    }

    #[test]
    fn locale_percent_is_zero_without_phrases() {
        let status = LocaleStatus::new("fr-FR", 3, 0);
        assert_eq!(status.percent_translated, 0.0);
    }

    #[test]
    fn locale_percent_never_exceeds_one() {
        let status = LocaleStatus::new("fr-FR", 12, 10);
        assert_eq!(status.translated_count, 12);
        assert_eq!(status.percent_translated, 1.0);
    }

    #[test]
    fn index_hash_distinguishes_meta_key() {
        let plain = Phrase::new("Hello", None, "a.json", "abc");
        let with_meta = Phrase::new("Hello", Some("greeting".into()), "a.json", "abc");
        assert_ne!(plain.index_hash(), with_meta.index_hash());
        assert_eq!(plain.index_hash(), plain.clone().index_hash());
    }
}
