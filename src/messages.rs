//! Localization catalog.
//!
//! A catalog is a directory of languages, each a directory of JSON files:
//!
//! ```text
//! locales/
//!   en-US/
//!     locale.json     {"invalid_body": "Invalid JSON body", …}
//!     fields.json     {"name": "Name", "price": {"range": "{field} must be at least {param}"}}
//!   es-AR/
//!     locale.json     …
//! ```
//!
//! Each file flattens into dot-separated keys prefixed with the file stem:
//! `locale.json` yields `locale.invalid_body`, `fields.json` yields
//! `fields.price.range`. The server injects one language's flat map into
//! every request; handlers and the validation pipeline read it through
//! [`Request::message`](crate::Request::message).

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Error;

/// The flattened message map for one language. Cheap to clone, shared across
/// every in-flight request.
#[derive(Clone)]
pub struct Messages {
    map: Arc<HashMap<String, String>>,
}

impl Messages {
    /// Wraps an already-flat map. Useful when messages come from somewhere
    /// other than a directory of JSON files.
    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self { map: Arc::new(map) }
    }

    /// Looks up a message by dotted key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// All loaded languages, keyed by directory name (`en-US`, `es-AR`, …).
pub struct Catalog {
    languages: HashMap<String, Messages>,
}

impl Catalog {
    /// Loads every language under `dir`.
    ///
    /// Files that cannot be read or parsed are skipped with a warning; a
    /// missing or unreadable root directory is an error. Non-string leaves
    /// are stored JSON-encoded.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let mut languages = HashMap::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let lang = entry.file_name().to_string_lossy().into_owned();
            let map = load_language(&entry.path());
            languages.insert(lang, Messages::from_map(map));
        }
        Ok(Self { languages })
    }

    /// The flat message map for `lang`, if that language was loaded.
    pub fn language(&self, lang: &str) -> Option<Messages> {
        self.languages.get(lang).cloned()
    }

    /// Names of the loaded languages.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }
}

fn load_language(dir: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "skipping unreadable language directory");
            return map;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable locale file");
                continue;
            }
        };
        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(obj)) => flatten(stem, &obj, &mut map),
            Ok(_) => warn!(file = %path.display(), "skipping locale file without a top-level object"),
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unparseable locale file"),
        }
    }
    map
}

/// Converts nested objects into dot-separated keys.
fn flatten(prefix: &str, obj: &Map<String, Value>, out: &mut HashMap<String, String>) {
    for (k, v) in obj {
        let key = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
        match v {
            Value::String(s) => {
                out.insert(key, s.clone());
            }
            Value::Object(nested) => flatten(&key, nested, out),
            other => {
                out.insert(key, other.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_nests_with_dots() {
        let obj = serde_json::json!({
            "invalid_body": "Invalid JSON body",
            "fields": {"price": {"range": "too small"}},
        });
        let Value::Object(obj) = obj else { unreachable!() };
        let mut out = HashMap::new();
        flatten("locale", &obj, &mut out);
        assert_eq!(out.get("locale.invalid_body").map(String::as_str), Some("Invalid JSON body"));
        assert_eq!(out.get("locale.fields.price.range").map(String::as_str), Some("too small"));
    }

    #[test]
    fn flatten_encodes_non_string_leaves_as_json() {
        let obj = serde_json::json!({"max_items": 25, "enabled": true});
        let Value::Object(obj) = obj else { unreachable!() };
        let mut out = HashMap::new();
        flatten("cfg", &obj, &mut out);
        assert_eq!(out.get("cfg.max_items").map(String::as_str), Some("25"));
        assert_eq!(out.get("cfg.enabled").map(String::as_str), Some("true"));
    }

    #[test]
    fn load_reads_languages_and_skips_malformed_files() {
        let root = tempfile::tempdir().expect("tempdir");
        let en = root.path().join("en-US");
        fs::create_dir(&en).expect("mkdir");
        fs::write(en.join("locale.json"), br#"{"validation_failed": "Validation failed"}"#)
            .expect("write");
        fs::write(en.join("broken.json"), b"{not json").expect("write");
        fs::write(en.join("notes.txt"), b"ignored").expect("write");

        let catalog = Catalog::load(root.path()).expect("load");
        let messages = catalog.language("en-US").expect("language");
        assert_eq!(messages.get("locale.validation_failed"), Some("Validation failed"));
        assert_eq!(messages.len(), 1);
        assert!(catalog.language("es-AR").is_none());
    }

    #[test]
    fn load_fails_on_missing_root() {
        assert!(Catalog::load("/nonexistent/locales-dir").is_err());
    }
}
