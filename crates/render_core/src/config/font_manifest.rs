//! Font manifest
//!
//! Maps font names used by the game (`"normal"`, `"bold"`, ...) to a font
//! file and a pixel size:
//!
//! ```toml
//! [fonts.normal]
//! file = "fonts/DejaVuSans.ttf"
//! size = 16.0
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Config;

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontEntry {
    /// Font file, relative to the manifest's directory
    pub file: String,
    /// Rasterization size in pixels
    #[serde(default = "default_font_size")]
    pub size: f32,
}

fn default_font_size() -> f32 {
    16.0
}

/// Name to font file mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontManifest {
    /// Entries by font name
    pub fonts: BTreeMap<String, FontEntry>,
}

impl FontManifest {
    /// Add or replace an entry
    pub fn with_font(
        mut self,
        name: impl Into<String>,
        file: impl Into<String>,
        size: f32,
    ) -> Self {
        self.fonts.insert(
            name.into(),
            FontEntry {
                file: file.into(),
                size,
            },
        );
        self
    }

    /// Entry for a name, ignoring ASCII case
    pub fn entry(&self, name: &str) -> Option<&FontEntry> {
        self.fonts
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, entry)| entry)
    }
}

impl Config for FontManifest {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_manifest() {
        let manifest: FontManifest = toml::from_str(
            r#"
            [fonts.normal]
            file = "fonts/sans.ttf"
            size = 14.0

            [fonts.Title]
            file = "fonts/serif.ttf"
            "#,
        )
        .expect("Should parse manifest");

        assert_eq!(manifest.fonts.len(), 2);
        assert_eq!(manifest.entry("NORMAL").map(|e| e.size), Some(14.0));
        assert_eq!(manifest.entry("title").map(|e| e.file.as_str()), Some("fonts/serif.ttf"));
        assert_eq!(manifest.entry("title").map(|e| e.size), Some(16.0));
        assert!(manifest.entry("missing").is_none());
    }

    #[test]
    fn test_builder() {
        let manifest = FontManifest::default().with_font("normal", "a.ttf", 12.0);
        assert_eq!(manifest.entry("normal").map(|e| e.file.as_str()), Some("a.ttf"));
    }
}
