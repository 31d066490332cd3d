//! Static filename→URL mapping used to turn retrieved passages into source links.

use crate::error::Result;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Maps corpus filenames to the public URLs they were captured from.
#[derive(Debug, Clone, Default)]
pub struct UrlMapping {
    urls: HashMap<String, String>,
}

impl UrlMapping {
    /// Build a mapping from `(filename, url)` pairs.
    pub fn new(urls: HashMap<String, String>) -> Self {
        Self { urls }
    }

    /// Load a JSON object of `filename: url` pairs.
    ///
    /// A missing file yields an empty mapping and a warning, so answers carry no
    /// sources. A file that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "URL mapping file not found at {:?}. Sources won't be displayed.",
                path
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let urls: HashMap<String, String> = serde_json::from_str(&content)?;
        info!("Loaded {} source URL mappings from {:?}", urls.len(), path);

        Ok(Self { urls })
    }

    /// Look up the URL for a filename.
    pub fn url_for(&self, filename: &str) -> Option<&str> {
        self.urls.get(filename).map(String::as_str)
    }

    /// Number of mapped filenames.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Resolve source filenames to their deduplicated URLs.
    ///
    /// Unmapped filenames are dropped. The result is ordered by URL; callers
    /// should not rely on any particular order.
    pub fn resolve<'a, I>(&self, filenames: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        filenames
            .into_iter()
            .filter_map(|name| self.url_for(name))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mapping() -> UrlMapping {
        UrlMapping::new(HashMap::from([
            ("a.pdf".to_string(), "https://i2e.com/services".to_string()),
            ("b.pdf".to_string(), "https://i2e.com/services".to_string()),
            ("c.pdf".to_string(), "https://i2e.com/about".to_string()),
        ]))
    }

    #[test]
    fn test_resolve_dedups_by_url() {
        let names = ["a.pdf", "b.pdf", "a.pdf"];
        assert_eq!(mapping().resolve(names), vec!["https://i2e.com/services"]);
    }

    #[test]
    fn test_resolve_drops_unmapped() {
        let names = ["unknown.pdf", "c.pdf", ""];
        let sources: BTreeSet<String> = mapping().resolve(names).into_iter().collect();
        assert_eq!(sources, BTreeSet::from(["https://i2e.com/about".to_string()]));
    }

    #[test]
    fn test_resolve_empty() {
        assert!(mapping().resolve(Vec::<&str>::new()).is_empty());
        assert!(UrlMapping::default().resolve(["a.pdf"]).is_empty());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = UrlMapping::load(&dir.path().join("url_mapping.json")).unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"about.txt": "https://example.com/about"}}"#).unwrap();

        let mapping = UrlMapping::load(file.path()).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.url_for("about.txt"), Some("https://example.com/about"));
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(UrlMapping::load(file.path()).is_err());
    }
}
