mod automation;
mod error;
mod metrics;
mod race;
mod retry;
mod session;
#[cfg(test)]
mod testing;

pub use automation::{BrowserLauncher, ChromiumSession, ChromiumSessionFactory};
pub use error::{BrowserError, BrowserResult};
pub use metrics::{MetricsHandle, RunMetrics};
pub use race::{ProxyRace, RaceOutcome};
pub use retry::{RetryOutcome, RetryPolicy};
pub use session::{load, FetchSession, SessionFactory};
