//! Named multi-pass techniques
//!
//! A technique is a list of passes, each a set of pipeline-state overrides
//! applied on top of the common baseline. A draw with a technique name is
//! issued once per pass.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::state::{BlendState, PassOverrides};

/// A named list of passes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Technique {
    /// Name draws refer to, matched case-insensitively
    pub name: String,
    /// Passes in execution order
    pub passes: Vec<PassOverrides>,
}

impl Technique {
    /// Technique with the given passes
    pub fn new(name: impl Into<String>, passes: Vec<PassOverrides>) -> Self {
        Self {
            name: name.into(),
            passes,
        }
    }
}

/// Technique file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechniqueFile {
    /// Techniques to add or replace
    pub techniques: Vec<Technique>,
}

impl Config for TechniqueFile {}

/// Registered techniques and the pass cursor of the one executing
#[derive(Debug, Default)]
pub struct TechniqueLibrary {
    techniques: HashMap<String, Technique>,
    cursor: Option<(String, usize)>,
}

impl TechniqueLibrary {
    /// Empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with the techniques the renderer itself uses
    pub fn with_builtins() -> Self {
        let mut library = Self::new();
        for (name, blend) in [
            ("PostProcess", BlendState::OPAQUE),
            ("PostProcessBlur", BlendState::OPAQUE),
            ("PostProcessGlow", BlendState::ADDITIVE),
            ("Font", BlendState::ALPHA),
        ] {
            library.register(Technique::new(name, vec![PassOverrides::screen_space(blend)]));
        }
        library
    }

    /// Add a technique, replacing one with the same name
    pub fn register(&mut self, technique: Technique) {
        if technique.passes.is_empty() {
            log::warn!("Technique '{}' has no passes and will draw nothing", technique.name);
        }
        self.techniques.insert(technique.name.to_ascii_lowercase(), technique);
    }

    /// Register every technique of a TOML or RON file
    ///
    /// Returns how many were registered.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let path = path.as_ref();
        let file = TechniqueFile::load_from_file(path)?;
        let count = file.techniques.len();
        for technique in file.techniques {
            self.register(technique);
        }
        log::info!("Loaded {} techniques from {}", count, path.display());
        Ok(count)
    }

    /// Look up a technique
    pub fn get(&self, name: &str) -> Option<&Technique> {
        self.techniques.get(&name.to_ascii_lowercase())
    }

    /// Whether a technique exists
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of techniques
    pub fn len(&self) -> usize {
        self.techniques.len()
    }

    /// Whether the library is empty
    pub fn is_empty(&self) -> bool {
        self.techniques.is_empty()
    }

    /// Begin executing a technique, returning its first pass
    ///
    /// `None` for an unknown technique or one without passes.
    pub fn start(&mut self, name: &str) -> Option<PassOverrides> {
        let key = name.to_ascii_lowercase();
        let Some(first) = self.techniques.get(&key).and_then(|t| t.passes.first().copied()) else {
            self.cursor = None;
            return None;
        };
        self.cursor = Some((key, 0));
        Some(first)
    }

    /// Advance to the next pass of the executing technique
    pub fn next_pass(&mut self) -> Option<PassOverrides> {
        let (key, index) = self.cursor.as_mut()?;
        *index += 1;
        let pass = self.techniques.get(key.as_str()).and_then(|t| t.passes.get(*index).copied());
        if pass.is_none() {
            self.cursor = None;
        }
        pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CullMode;

    #[test]
    fn test_builtins() {
        let library = TechniqueLibrary::with_builtins();
        assert_eq!(library.len(), 4);
        let glow = library.get("postprocessglow").expect("Glow should be built in");
        assert_eq!(glow.passes[0].blend, Some(BlendState::ADDITIVE));
        assert_eq!(library.get("Font").map(|t| t.passes[0].blend), Some(Some(BlendState::ALPHA)));
    }

    #[test]
    fn test_pass_cursor() {
        let mut library = TechniqueLibrary::new();
        let two_sided = PassOverrides {
            cull: Some(CullMode::None),
            ..PassOverrides::default()
        };
        library.register(Technique::new("Outline", vec![PassOverrides::default(), two_sided]));

        assert_eq!(library.start("OUTLINE"), Some(PassOverrides::default()));
        assert_eq!(library.next_pass(), Some(two_sided));
        assert_eq!(library.next_pass(), None);
        assert_eq!(library.next_pass(), None);

        assert_eq!(library.start("missing"), None);
        assert_eq!(library.next_pass(), None);
    }

    #[test]
    fn test_empty_technique_has_no_first_pass() {
        let mut library = TechniqueLibrary::new();
        library.register(Technique::new("Nothing", Vec::new()));
        assert!(library.contains("nothing"));
        assert_eq!(library.start("Nothing"), None);
    }

    #[test]
    fn test_load_ron_file() {
        let dir = std::env::temp_dir().join(format!("render_core_tech_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        let path = dir.join("techniques.ron");
        std::fs::write(
            &path,
            r#"(
                techniques: [
                    (
                        name: "Sky",
                        passes: [(depth: Some((test: false, write: false, func: Always)))],
                    ),
                    (name: "Font", passes: [(), (cull: Some(Clockwise))]),
                ],
            )"#,
        )
        .expect("Should write technique file");

        let mut library = TechniqueLibrary::with_builtins();
        assert_eq!(library.load_file(&path).expect("Should load techniques"), 2);
        assert_eq!(library.len(), 5);
        assert_eq!(library.get("font").map(|t| t.passes.len()), Some(2));
        assert!(library.get("sky").and_then(|t| t.passes[0].depth).is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
