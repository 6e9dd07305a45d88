pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod input;
pub mod orchestrator;
pub mod output;

pub use config::{load_scout_config, ScoutConfig};
pub use error::{ConfigError, Result};
pub use extract::{ExtractError, GithubExtractor};
pub use input::{load_input, InputError, ScrapeInput, SearchType};
pub use orchestrator::{ScrapeError, ScrapeOrchestrator, ScrapeReport, ScrapeSettings};
pub use output::{
    render_records, write_records, ExtraInfo, LanguageStats, OutputError, SearchResultRecord,
};
