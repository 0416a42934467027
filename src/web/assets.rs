//! Static HTML pages served by the front-end.
//!
//! Every `*.html` file in the assets directory is read once at startup and
//! served under its stem (`viewer.html` → `/viewer`).

use crate::error::Result;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct HtmlAssets {
    pages: HashMap<String, Vec<u8>>,
}

impl HtmlAssets {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every `*.html` file in `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut pages = HashMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("html") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let contents = fs::read(&path)?;
            debug!(page = stem, bytes = contents.len(), "loaded html asset");
            pages.insert(stem.to_string(), contents);
        }
        Ok(Self { pages })
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.pages.get(name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
