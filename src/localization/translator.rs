//! Plugin description translations.
//!
//! Translations are keyed by a plugin's `InternalName`:
//!
//! ```json
//! { "SamplePlugin": {
//!     "Punchline":   { "Original": "...", "Translated": "..." },
//!     "Description": { "Original": "...", "Translated": "..." } } }
//! ```
//!
//! A plugin listing is a JSON array of objects; matching entries get their
//! `Punchline` replaced and their `Description` expanded to show the
//! translation next to the original text.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::localization::ResponseRewriter;

const MACHINE_TRANSLATION_NOTE: &str = "Note: machine translation provided by relay-accel";

#[derive(Debug, Error)]
pub enum LocalizationError {
    #[error("failed to read translations: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse translations: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranslationPair {
    pub original: Option<String>,
    pub translated: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranslationEntry {
    #[serde(default)]
    pub punchline: TranslationPair,
    #[serde(default)]
    pub description: TranslationPair,
}

#[derive(Debug, Default)]
pub struct DescriptionTranslator {
    entries: HashMap<String, TranslationEntry>,
}

impl DescriptionTranslator {
    pub fn new(entries: HashMap<String, TranslationEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, LocalizationError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, LocalizationError> {
        let entries: HashMap<String, TranslationEntry> = serde_json::from_str(raw)?;
        tracing::info!(entries = entries.len(), "Plugin translations loaded");
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply translations to one plugin object. Returns false when the
    /// plugin has no translation.
    fn translate(&self, plugin: &mut Map<String, Value>) -> bool {
        let Some(entry) = plugin
            .get("InternalName")
            .and_then(Value::as_str)
            .and_then(|name| self.entries.get(name))
        else {
            return false;
        };

        let punchline_original = entry
            .punchline
            .original
            .as_deref()
            .unwrap_or_default()
            .replace(['\n', '\r'], " ");
        let description = format!(
            "{} \n\n{}\n\n{}\n\n{}",
            punchline_original,
            entry.description.translated.as_deref().unwrap_or_default(),
            entry.description.original.as_deref().unwrap_or_default(),
            MACHINE_TRANSLATION_NOTE,
        );

        plugin.insert(
            "Punchline".into(),
            Value::String(entry.punchline.translated.clone().unwrap_or_default()),
        );
        plugin.insert("Description".into(), Value::String(description));
        true
    }
}

impl ResponseRewriter for DescriptionTranslator {
    fn rewrite(&self, url: &str, body: &Bytes) -> Option<Bytes> {
        if self.entries.is_empty() {
            return None;
        }
        let mut plugins: Vec<Map<String, Value>> = match serde_json::from_slice(body) {
            Ok(plugins) => plugins,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Body is not a plugin listing, left untouched");
                return None;
            }
        };

        let translated = plugins
            .iter_mut()
            .fold(0usize, |n, plugin| n + usize::from(self.translate(plugin)));
        if translated == 0 {
            return None;
        }

        tracing::debug!(url = %url, translated, "Plugin descriptions localized");
        serde_json::to_vec(&plugins).ok().map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSLATIONS: &str = r#"{
        "Sample": {
            "Punchline":   { "Original": "Does\nthings", "Translated": "Macht Dinge" },
            "Description": { "Original": "Long text", "Translated": "Langer Text" }
        }
    }"#;

    fn translator() -> DescriptionTranslator {
        DescriptionTranslator::from_json(TRANSLATIONS).unwrap()
    }

    #[test]
    fn known_plugins_are_rewritten() {
        let body = Bytes::from_static(
            br#"[{"InternalName":"Sample","Punchline":"Does things","Description":"Long text","Author":"a"},
                 {"InternalName":"Other","Punchline":"p","Description":"d"}]"#,
        );
        let out = translator().rewrite("https://repo.test/pluginmaster.json", &body).unwrap();
        let plugins: Vec<Value> = serde_json::from_slice(&out).unwrap();

        assert_eq!(plugins[0]["Punchline"], "Macht Dinge");
        let description = plugins[0]["Description"].as_str().unwrap();
        assert!(description.starts_with("Does things \n\nLanger Text\n\nLong text"));
        assert!(description.ends_with(MACHINE_TRANSLATION_NOTE));
        assert_eq!(plugins[0]["Author"], "a");
        assert_eq!(plugins[1]["Punchline"], "p");
    }

    #[test]
    fn untranslated_or_invalid_bodies_are_kept() {
        let t = translator();
        let other = Bytes::from_static(br#"[{"InternalName":"Other"}]"#);
        assert!(t.rewrite("u", &other).is_none());
        assert!(t.rewrite("u", &Bytes::from_static(b"<html>")).is_none());
        assert!(t.rewrite("u", &Bytes::from_static(br#"{"not":"a list"}"#)).is_none());
    }

    #[test]
    fn load_reads_file_and_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("translations.json");
        std::fs::write(&good, TRANSLATIONS).unwrap();
        assert_eq!(DescriptionTranslator::load(&good).unwrap().len(), 1);

        let bad = dir.path().join("broken.json");
        std::fs::write(&bad, "{").unwrap();
        assert!(matches!(
            DescriptionTranslator::load(&bad),
            Err(LocalizationError::Parse(_))
        ));
        assert!(matches!(
            DescriptionTranslator::load(&dir.path().join("missing.json")),
            Err(LocalizationError::Io(_))
        ));
    }
}
