use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::browser::{
    BrowserError, FetchSession, MetricsHandle, ProxyRace, RaceOutcome, RetryPolicy,
    RunMetrics, SessionFactory,
};
use crate::config::ScoutConfig;
use crate::extract::{ExtractError, GithubExtractor};
use crate::input::ScrapeInput;
use crate::output::SearchResultRecord;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("launching: {0}")]
    Launch(#[source] BrowserError),
    #[error("configuring: {0}")]
    Configuration(String),
    #[error("racing: no working proxy found among {candidates} candidates")]
    NoWorkingProxy { candidates: usize },
    #[error("fetching {url}: gave up after {attempts} attempts: {source}")]
    ExhaustedRetry {
        url: String,
        attempts: usize,
        #[source]
        source: BrowserError,
    },
    #[error("extracting {url}: {source}")]
    Extraction {
        url: String,
        #[source]
        source: ExtractError,
    },
}

impl ScrapeError {
    pub fn stage(&self) -> &'static str {
        match self {
            ScrapeError::Launch(_) => "launching",
            ScrapeError::Configuration(_) => "configuring",
            ScrapeError::NoWorkingProxy { .. } => "racing",
            ScrapeError::ExhaustedRetry { .. } => "fetching",
            ScrapeError::Extraction { .. } => "extracting",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub probe_target: String,
    pub attempt_timeout: Duration,
    pub load_timeout: Duration,
    pub site_base: String,
    pub search_endpoint: Url,
}

impl ScrapeSettings {
    pub fn from_config(config: &ScoutConfig) -> Result<Self, ScrapeError> {
        let base = Url::parse(&config.site.base_url)
            .map_err(|err| ScrapeError::Configuration(format!("site.base_url: {err}")))?;
        let search_endpoint = base
            .join(&config.site.search_path)
            .map_err(|err| ScrapeError::Configuration(format!("site.search_path: {err}")))?;
        Ok(Self {
            probe_target: config.race.probe_target.clone(),
            attempt_timeout: config.race.attempt_timeout(),
            load_timeout: config.fetch.load_timeout(),
            site_base: config.site.base_url.clone(),
            search_endpoint,
        })
    }

    /// Search page URL, e.g. `https://github.com/search?q=rust+async&type=Repositories`.
    pub fn search_url(&self, input: &ScrapeInput) -> String {
        let mut url = self.search_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", &input.query())
            .append_pair("type", input.search_type.as_str());
        url.into()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    pub proxy: String,
    pub search_url: String,
    pub records: Vec<SearchResultRecord>,
    pub metrics: RunMetrics,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

pub struct ScrapeOrchestrator {
    race: ProxyRace,
    retry: RetryPolicy,
    extractor: GithubExtractor,
    settings: ScrapeSettings,
    metrics: MetricsHandle,
}

impl ScrapeOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        retry: RetryPolicy,
        settings: ScrapeSettings,
    ) -> Result<Self, ScrapeError> {
        let extractor = GithubExtractor::new(&settings.site_base)
            .map_err(|err| ScrapeError::Configuration(err.to_string()))?;
        let metrics = MetricsHandle::new();
        Ok(Self {
            race: ProxyRace::new(sessions, metrics.clone()),
            retry,
            extractor,
            settings,
            metrics,
        })
    }

    pub fn from_config(
        sessions: Arc<dyn SessionFactory>,
        config: &ScoutConfig,
    ) -> Result<Self, ScrapeError> {
        Self::new(
            sessions,
            RetryPolicy::new(config.retry.clone()),
            ScrapeSettings::from_config(config)?,
        )
    }

    pub fn metrics(&self) -> RunMetrics {
        self.metrics.snapshot()
    }

    pub fn build_search_url(&self, input: &ScrapeInput) -> String {
        self.settings.search_url(input)
    }

    /// Races the proxies and closes the winning session right away, returning
    /// only which proxy won.
    pub async fn probe(&self, proxies: &[String]) -> Result<String, ScrapeError> {
        let (proxy, mut session) = self.commit(proxies).await?;
        self.close(session.as_mut()).await;
        Ok(proxy)
    }

    pub async fn run(&self, input: &ScrapeInput) -> Result<ScrapeReport, ScrapeError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let search_url = self.build_search_url(input);
        info!(
            search_url = %search_url,
            candidates = input.proxies.len(),
            max_attempts = self.retry.max_attempts(),
            "scrape started"
        );

        let (proxy, mut session) = self.commit(&input.proxies).await?;
        let collected = self.collect(session.as_mut(), input, &search_url).await;
        self.close(session.as_mut()).await;
        let records = collected?;

        let report = ScrapeReport {
            proxy,
            search_url,
            records,
            metrics: self.metrics.snapshot(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            proxy = %report.proxy,
            records = report.records.len(),
            retries = report.metrics.retries,
            duration_ms = report.duration_ms,
            "scrape finished"
        );
        Ok(report)
    }

    async fn commit(
        &self,
        proxies: &[String],
    ) -> Result<(String, Box<dyn FetchSession>), ScrapeError> {
        match self
            .race
            .race(
                proxies,
                &self.settings.probe_target,
                self.settings.attempt_timeout,
            )
            .await
        {
            RaceOutcome::Won { proxy, session } => Ok((proxy, session)),
            RaceOutcome::NoneWorked => Err(ScrapeError::NoWorkingProxy {
                candidates: proxies.len(),
            }),
        }
    }

    async fn collect(
        &self,
        session: &mut dyn FetchSession,
        input: &ScrapeInput,
        search_url: &str,
    ) -> Result<Vec<SearchResultRecord>, ScrapeError> {
        let html = self.fetch(session, search_url).await?;
        let mut records = self.extractor.parse_search_results(&html);
        info!(
            proxy = session.proxy(),
            search_type = %input.search_type,
            results = records.len(),
            "search results parsed"
        );

        if !input.search_type.wants_extras() {
            return Ok(records);
        }

        for record in records.iter_mut() {
            let html = self.fetch(session, &record.url).await?;
            let extra = self
                .extractor
                .parse_extras(&html)
                .map_err(|source| ScrapeError::Extraction {
                    url: record.url.clone(),
                    source,
                })?;
            debug!(url = %record.url, owner = %extra.owner, "repository details extracted");
            record.extra = Some(extra);
        }
        Ok(records)
    }

    async fn fetch(&self, session: &mut dyn FetchSession, url: &str) -> Result<String, ScrapeError> {
        let outcome = self
            .retry
            .fetch_with_retry(session, url, self.settings.load_timeout, &self.metrics)
            .await;
        let attempts = outcome.attempts();
        outcome
            .into_result()
            .map_err(|source| ScrapeError::ExhaustedRetry {
                url: url.to_string(),
                attempts,
                source,
            })
    }

    async fn close(&self, session: &mut dyn FetchSession) {
        session.close().await;
        self.metrics.with(RunMetrics::record_session_close);
        debug!(proxy = session.proxy(), "committed session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserResult;
    use crate::input::SearchType;
    use async_trait::async_trait;

    struct NoSessions;

    #[async_trait]
    impl SessionFactory for NoSessions {
        async fn open(&self, proxy: &str) -> BrowserResult<Box<dyn FetchSession>> {
            Err(BrowserError::Connect {
                proxy: proxy.to_string(),
                reason: "refused".into(),
            })
        }
    }

    fn orchestrator() -> ScrapeOrchestrator {
        ScrapeOrchestrator::from_config(Arc::new(NoSessions), &ScoutConfig::default()).unwrap()
    }

    #[test]
    fn search_url_encodes_keywords_and_type() {
        let input = ScrapeInput {
            keywords: vec!["openstack".into(), "nova".into(), "c++".into()],
            proxies: vec!["1.2.3.4:80".into()],
            search_type: SearchType::Repositories,
        };
        let url = orchestrator().build_search_url(&input);
        assert_eq!(
            url,
            "https://github.com/search?q=openstack+nova+c%2B%2B&type=Repositories"
        );
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<_> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("q".to_string(), "openstack nova c++".to_string()));
    }

    #[tokio::test]
    async fn no_working_proxy_is_a_racing_failure() {
        let input = ScrapeInput {
            keywords: vec!["rust".into()],
            proxies: vec!["1.2.3.4:80".into(), "5.6.7.8:3128".into()],
            search_type: SearchType::Issues,
        };
        let err = orchestrator().run(&input).await.unwrap_err();
        assert_eq!(err.stage(), "racing");
        assert_eq!(
            err.to_string(),
            "racing: no working proxy found among 2 candidates"
        );
    }

    #[test]
    fn bad_search_path_is_a_configuration_error() {
        let mut config = ScoutConfig::default();
        config.site.base_url = "mailto:someone".into();
        let err = ScrapeSettings::from_config(&config).unwrap_err();
        assert_eq!(err.stage(), "configuring");
    }
}
