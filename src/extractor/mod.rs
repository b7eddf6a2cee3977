pub mod json;
pub mod pattern;

use crate::matcher::Node;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use json::JsonExtractor;
pub use pattern::PatternExtractor;

/// Raised by an extractor when its input is malformed for its language.
#[derive(Debug, Clone, Error)]
#[error("{language} syntax error: {message}")]
pub struct SyntaxError {
    pub message: String,
    /// Description of the underlying parser failure.
    pub cause: Option<String>,
    pub language: String,
}

impl SyntaxError {
    pub fn new(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            language: language.into(),
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

/// A syntax error pinned to the file and commit it came from.
#[derive(Debug, Clone, Error)]
#[error("{language} syntax error in {file} at {commit_id}: {message}")]
pub struct ExtractionSyntaxError {
    pub message: String,
    pub cause: Option<String>,
    pub language: String,
    pub file: String,
    pub commit_id: String,
}

impl ExtractionSyntaxError {
    pub fn new(error: SyntaxError, file: &str, commit_id: &str) -> Self {
        Self {
            message: error.message,
            cause: error.cause,
            language: error.language,
            file: file.to_string(),
            commit_id: commit_id.to_string(),
        }
    }
}

/// One result of an extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPhrase {
    pub key: String,
    pub meta_key: Option<String>,
    /// 1-based source line, when the extractor tracks positions.
    pub line_number: Option<usize>,
}

impl ExtractedPhrase {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            meta_key: None,
            line_number: None,
        }
    }

    pub fn with_meta_key(mut self, meta_key: impl Into<String>) -> Self {
        self.meta_key = Some(meta_key.into());
        self
    }

    pub fn at_line(mut self, line_number: usize) -> Self {
        self.line_number = Some(line_number);
        self
    }
}

/// Parses the source text of one language into phrases.
pub trait Extractor: Send + Sync + fmt::Debug {
    fn language(&self) -> &str;

    fn extract_each_from(&self, text: &str) -> Result<Vec<ExtractedPhrase>, SyntaxError>;

    /// Whether results carry line numbers worth attributing through blame.
    fn supports_line_numbers(&self) -> bool {
        false
    }
}

/// Receives extraction errors that were isolated instead of propagated.
pub trait ErrorReporter: Send + Sync {
    fn report_error(&self, error: ExtractionSyntaxError);
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NilErrorReporter;

impl ErrorReporter for NilErrorReporter {
    fn report_error(&self, _error: ExtractionSyntaxError) {}
}

/// Buffers reports so callers can inspect them afterwards.
#[derive(Debug, Default, Clone)]
pub struct CollectingErrorReporter {
    errors: Arc<Mutex<Vec<ExtractionSyntaxError>>>,
}

impl CollectingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<ExtractionSyntaxError> {
        match self.errors.lock() {
            Ok(errors) => errors.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ErrorReporter for CollectingErrorReporter {
    fn report_error(&self, error: ExtractionSyntaxError) {
        match self.errors.lock() {
            Ok(mut errors) => errors.push(error),
            Err(poisoned) => poisoned.into_inner().push(error),
        }
    }
}

/// Text encodings a config can decode file contents with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl Encoding {
    /// Decode raw bytes, replacing invalid sequences with U+FFFD.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                String::from_utf8_lossy(bytes).into_owned()
            }
            Encoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes, b"\xFF\xFE"),
            Encoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes, b"\xFE\xFF"),
        }
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16, bom: &[u8]) -> String {
    let bytes = bytes.strip_prefix(bom).unwrap_or(bytes);
    let units = bytes.chunks(2).map(|pair| match pair {
        [a, b] => to_unit([*a, *b]),
        _ => 0xFFFD,
    });
    char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown encoding: {0}")]
pub struct UnknownEncoding(pub String);

impl FromStr for Encoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "UTF-8" | "UTF8" => Ok(Encoding::Utf8),
            "UTF-16LE" | "UTF16LE" => Ok(Encoding::Utf16Le),
            "UTF-16BE" | "UTF16BE" => Ok(Encoding::Utf16Be),
            _ => Err(UnknownEncoding(s.to_string())),
        }
    }
}

/// Binds an extractor to an encoding and the paths it applies to.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub extractor: Arc<dyn Extractor>,
    pub encoding: Encoding,
    /// `None` applies the extractor to no path at all.
    pub matcher: Option<Node>,
}

impl ExtractorConfig {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            encoding: Encoding::default(),
            matcher: None,
        }
    }

    pub fn set_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn set_matcher(mut self, matcher: Node) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.as_ref().is_some_and(|node| node.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Root;

    #[test]
    fn config_defaults_to_utf8_and_matches_nothing() {
        let config = ExtractorConfig::new(Arc::new(JsonExtractor));
        assert_eq!(config.encoding, Encoding::Utf8);
        assert!(!config.matches("config/en.json"));
    }

    #[test]
    fn set_encoding_and_matcher() {
        let config = ExtractorConfig::new(Arc::new(JsonExtractor))
            .set_encoding(Encoding::Utf16Be)
            .set_matcher(Root::new().match_file_extension("json"));
        assert_eq!(config.encoding, Encoding::Utf16Be);
        assert!(config.matches("config/en.json"));
        assert!(!config.matches("config/en.yml"));
    }

    #[test]
    fn decodes_utf16_with_bom() {
        let le: Vec<u8> = [0xFF, 0xFE, b'h', 0, b'i', 0].to_vec();
        let be: Vec<u8> = [0xFE, 0xFF, 0, b'h', 0, b'i'].to_vec();
        assert_eq!(Encoding::Utf16Le.decode(&le), "hi");
        assert_eq!(Encoding::Utf16Be.decode(&be), "hi");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(Encoding::Utf8.decode(b"ok\xFF"), "ok\u{FFFD}");
    }

    #[test]
    fn encoding_names_parse() {
        assert_eq!("utf-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("UTF_16LE".parse::<Encoding>().unwrap(), Encoding::Utf16Le);
        assert!("latin-1".parse::<Encoding>().is_err());
    }

    #[test]
    fn collecting_reporter_keeps_errors() {
        let reporter = CollectingErrorReporter::new();
        let error = SyntaxError::new("json", "unexpected end").with_cause("EOF at 1:3");
        reporter.report_error(ExtractionSyntaxError::new(error, "a.json", "abc123"));
        let errors = reporter.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file, "a.json");
        assert_eq!(errors[0].cause.as_deref(), Some("EOF at 1:3"));
    }
}
