use super::{ExtractedPhrase, Extractor, SyntaxError};
use serde_json::Value;

/// Extracts every string leaf of a JSON document.
///
/// The string itself is the phrase key; its dotted location in the document
/// (`greetings.hello`, `items.0`) becomes the meta key.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn language(&self) -> &str {
        "json"
    }

    fn extract_each_from(&self, text: &str) -> Result<Vec<ExtractedPhrase>, SyntaxError> {
        let document: Value = serde_json::from_str(text)
            .map_err(|err| SyntaxError::new("json", "invalid JSON document").with_cause(err))?;

        let mut phrases = Vec::new();
        collect_strings(&document, &mut Vec::new(), &mut phrases);
        Ok(phrases)
    }
}

fn collect_strings(value: &Value, path: &mut Vec<String>, out: &mut Vec<ExtractedPhrase>) {
    match value {
        Value::String(text) => {
            let phrase = ExtractedPhrase::new(text.as_str());
            if path.is_empty() {
                out.push(phrase);
            } else {
                out.push(phrase.with_meta_key(path.join(".")));
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                collect_strings(child, path, out);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(index.to_string());
                collect_strings(child, path, out);
                path.pop();
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
