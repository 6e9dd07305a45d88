use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("file {0} does not exist")]
    NotFound(PathBuf),
    #[error("file {0} has wrong extension, expected .json")]
    WrongExtension(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("{path} is not valid JSON: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("{path} does not match the input schema: {reason}")]
    Schema { reason: String, path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchType {
    Repositories,
    Wikis,
    Issues,
}

impl SearchType {
    /// Repository results are the only ones whose pages carry owner and
    /// language details.
    pub fn wants_extras(&self) -> bool {
        matches!(self, SearchType::Repositories)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Repositories => "Repositories",
            SearchType::Wikis => "Wikis",
            SearchType::Issues => "Issues",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeInput {
    pub keywords: Vec<String>,
    pub proxies: Vec<String>,
    #[serde(rename = "type")]
    pub search_type: SearchType,
}

impl ScrapeInput {
    /// Keywords joined the way the search box expects them.
    pub fn query(&self) -> String {
        self.keywords.join(" ")
    }

    fn check_non_empty(&self) -> Result<(), String> {
        if self.keywords.is_empty() {
            return Err("keywords must contain at least one entry".to_string());
        }
        if self.proxies.is_empty() {
            return Err("proxies must contain at least one entry".to_string());
        }
        Ok(())
    }
}

/// Reads and validates the run input. Nothing touches the network before
/// this succeeds.
pub fn load_input<P: AsRef<Path>>(path: P) -> Result<ScrapeInput, InputError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        return Err(InputError::WrongExtension(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    parse_input(&content).map_err(|err| match err {
        ParseFailure::Syntax(source) => InputError::Json {
            source,
            path: path.to_path_buf(),
        },
        ParseFailure::Schema(reason) => InputError::Schema {
            reason,
            path: path.to_path_buf(),
        },
    })
}

enum ParseFailure {
    Syntax(serde_json::Error),
    Schema(String),
}

fn parse_input(content: &str) -> Result<ScrapeInput, ParseFailure> {
    let input: ScrapeInput = serde_json::from_str(content).map_err(|err| match err.classify() {
        Category::Data => ParseFailure::Schema(err.to_string()),
        Category::Io | Category::Syntax | Category::Eof => ParseFailure::Syntax(err),
    })?;
    input.check_non_empty().map_err(ParseFailure::Schema)?;
    Ok(input)
}
