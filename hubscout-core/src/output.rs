use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResultRecord {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<ExtraInfo>,
}

impl SearchResultRecord {
    pub fn stub(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraInfo {
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_stats: Option<LanguageStats>,
}

/// Language label to percentage (without the `%`), kept in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageStats(Vec<(String, String)>);

impl LanguageStats {
    /// Inserts or replaces `label`, keeping the position of the first occurrence.
    pub fn insert(&mut self, label: String, percent: String) {
        match self.0.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = percent,
            None => self.0.push((label, percent)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, percent)| percent.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(label, percent)| (label.as_str(), percent.as_str()))
    }
}

impl FromIterator<(String, String)> for LanguageStats {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut stats = LanguageStats::default();
        for (label, percent) in iter {
            stats.insert(label, percent);
        }
        stats
    }
}

impl Serialize for LanguageStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, percent) in self.iter() {
            map.serialize_entry(label, percent)?;
        }
        map.end()
    }
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
}

/// Renders records as a JSON array indented with four spaces.
pub fn render_records(records: &[SearchResultRecord]) -> Result<String, OutputError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    records.serialize(&mut serializer)?;
    // serde_json only ever emits UTF-8.
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Writes the rendered records to `path` and returns the rendered text.
pub fn write_records<P: AsRef<Path>>(
    path: P,
    records: &[SearchResultRecord],
) -> Result<String, OutputError> {
    let path = path.as_ref();
    let rendered = render_records(records)?;
    fs::write(path, format!("{rendered}\n")).map_err(|source| OutputError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    Ok(rendered)
}
