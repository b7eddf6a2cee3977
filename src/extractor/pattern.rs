use super::{ExtractedPhrase, Extractor, SyntaxError};
use regex::Regex;

/// Line-oriented, regex-driven extractor for translation call sites.
///
/// Every match contributes one phrase taken from the `key` capture group (or
/// the first group that participated), tagged with its 1-based line number.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    language: String,
    pattern: Regex,
    /// Matches the opening of a call; more openings than complete calls on a
    /// line means a string literal was left unterminated.
    opener: Option<Regex>,
}

impl PatternExtractor {
    pub fn new(language: impl Into<String>, pattern: Regex) -> Self {
        Self {
            language: language.into(),
            pattern,
            opener: None,
        }
    }

    /// Calls like `t("Hello")` or `t('Hello')` for the given function name.
    pub fn call_site(language: impl Into<String>, function: &str) -> Result<Self, regex::Error> {
        let name = regex::escape(function);
        let pattern = Regex::new(&format!(
            r#"\b{name}\(\s*(?:"(?P<key>(?:[^"\\]|\\.)*)"|'(?P<single>(?:[^'\\]|\\.)*)')"#
        ))?;
        let opener = Regex::new(&format!(r#"\b{name}\(\s*["']"#))?;
        Ok(Self {
            language: language.into(),
            pattern,
            opener: Some(opener),
        })
    }
}

impl Extractor for PatternExtractor {
    fn language(&self) -> &str {
        &self.language
    }

    fn extract_each_from(&self, text: &str) -> Result<Vec<ExtractedPhrase>, SyntaxError> {
        let mut phrases = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            let mut found = 0;

            for caps in self.pattern.captures_iter(line) {
                found += 1;
                let key = caps
                    .name("key")
                    .or_else(|| caps.name("single"))
                    .or_else(|| caps.iter().skip(1).flatten().next());
                if let Some(key) = key {
                    phrases.push(ExtractedPhrase::new(unescape(key.as_str())).at_line(line_number));
                }
            }

            if let Some(opener) = &self.opener
                && opener.find_iter(line).count() > found
            {
                return Err(SyntaxError::new(
                    self.language.clone(),
                    format!("unterminated string literal on line {}", line_number),
                ));
            }
        }

        Ok(phrases)
    }

    fn supports_line_numbers(&self) -> bool {
        true
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
