use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{BrowserError, BrowserResult};
use super::metrics::{MetricsHandle, RunMetrics};
use super::session::{load, FetchSession, SessionFactory};

pub enum RaceOutcome {
    Won {
        proxy: String,
        session: Box<dyn FetchSession>,
    },
    NoneWorked,
}

impl std::fmt::Debug for RaceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaceOutcome::Won { proxy, .. } => f.debug_struct("Won").field("proxy", proxy).finish(),
            RaceOutcome::NoneWorked => f.write_str("NoneWorked"),
        }
    }
}

enum ProbeOutcome {
    Connected {
        proxy: String,
        session: Box<dyn FetchSession>,
    },
    Failed {
        proxy: String,
        error: BrowserError,
    },
    Cancelled {
        proxy: String,
    },
}

pub struct ProxyRace {
    sessions: Arc<dyn SessionFactory>,
    metrics: MetricsHandle,
}

impl ProxyRace {
    pub fn new(sessions: Arc<dyn SessionFactory>, metrics: MetricsHandle) -> Self {
        Self { sessions, metrics }
    }

    pub async fn race(
        &self,
        proxies: &[String],
        probe_target: &str,
        per_attempt_timeout: Duration,
    ) -> RaceOutcome {
        if proxies.is_empty() {
            debug!("empty proxy list, nothing to race");
            return RaceOutcome::NoneWorked;
        }

        let cancel = CancellationToken::new();
        let probe_target: Arc<str> = Arc::from(probe_target);
        let mut attempts = JoinSet::new();
        for proxy in proxies {
            self.metrics.with(RunMetrics::record_probe_started);
            attempts.spawn(probe(
                Arc::clone(&self.sessions),
                proxy.clone(),
                Arc::clone(&probe_target),
                per_attempt_timeout,
                cancel.child_token(),
                self.metrics.clone(),
            ));
        }
        info!(
            candidates = proxies.len(),
            target = %probe_target,
            timeout_ms = per_attempt_timeout.as_millis() as u64,
            "racing proxies"
        );

        let mut winner: Option<(String, Box<dyn FetchSession>)> = None;
        // Drain every attempt so no losing session outlives the race.
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(ProbeOutcome::Connected { proxy, mut session }) => {
                    if winner.is_none() {
                        info!(proxy = %proxy, "proxy won the race");
                        cancel.cancel();
                        winner = Some((proxy, session));
                    } else {
                        debug!(proxy = %proxy, "late success after commit, closing");
                        session.close().await;
                        self.metrics.with(RunMetrics::record_session_close);
                        self.metrics.with(RunMetrics::record_probe_cancelled);
                    }
                }
                Ok(ProbeOutcome::Failed { proxy, error }) => {
                    warn!(proxy = %proxy, connect = error.is_connect(), error = %error, "proxy probe failed");
                    self.metrics.with(RunMetrics::record_probe_failed);
                }
                Ok(ProbeOutcome::Cancelled { proxy }) => {
                    debug!(proxy = %proxy, "probe cancelled after commit");
                    self.metrics.with(RunMetrics::record_probe_cancelled);
                }
                Err(err) => {
                    warn!(error = %BrowserError::from(err), "probe task aborted");
                    self.metrics.with(RunMetrics::record_probe_failed);
                }
            }
        }

        match winner {
            Some((proxy, session)) => RaceOutcome::Won { proxy, session },
            None => {
                warn!(candidates = proxies.len(), "no proxy completed the probe");
                RaceOutcome::NoneWorked
            }
        }
    }
}

async fn probe(
    sessions: Arc<dyn SessionFactory>,
    proxy: String,
    probe_target: Arc<str>,
    timeout: Duration,
    cancel: CancellationToken,
    metrics: MetricsHandle,
) -> ProbeOutcome {
    // Open runs in its own task and is never interrupted. A session that
    // arrives past the deadline is closed by `close_when_opened`.
    let mut opening: JoinHandle<BrowserResult<Box<dyn FetchSession>>> = tokio::spawn({
        let proxy = proxy.clone();
        async move { sessions.open(&proxy).await }
    });
    let mut session = match tokio::time::timeout(timeout, &mut opening).await {
        Ok(Ok(Ok(session))) => session,
        Ok(Ok(Err(error))) => return ProbeOutcome::Failed { proxy, error },
        Ok(Err(join_error)) => {
            return ProbeOutcome::Failed {
                proxy,
                error: join_error.into(),
            }
        }
        Err(_) => {
            tokio::spawn(close_when_opened(opening, metrics));
            let reason = format!("open did not finish within {}ms", timeout.as_millis());
            return ProbeOutcome::Failed {
                error: BrowserError::Connect {
                    proxy: proxy.clone(),
                    reason,
                },
                proxy,
            };
        }
    };
    metrics.with(RunMetrics::record_session_open);

    if cancel.is_cancelled() {
        session.close().await;
        metrics.with(RunMetrics::record_session_close);
        return ProbeOutcome::Cancelled { proxy };
    }

    let loaded = tokio::select! {
        _ = cancel.cancelled() => None,
        loaded = load(session.as_mut(), &probe_target, timeout) => Some(loaded),
    };

    match loaded {
        Some(Ok(_)) => {
            metrics.with(RunMetrics::record_page_load);
            ProbeOutcome::Connected { proxy, session }
        }
        Some(Err(error)) => {
            metrics.with(RunMetrics::record_load_failure);
            session.close().await;
            metrics.with(RunMetrics::record_session_close);
            ProbeOutcome::Failed { proxy, error }
        }
        None => {
            session.close().await;
            metrics.with(RunMetrics::record_session_close);
            ProbeOutcome::Cancelled { proxy }
        }
    }
}

async fn close_when_opened(
    opening: JoinHandle<BrowserResult<Box<dyn FetchSession>>>,
    metrics: MetricsHandle,
) {
    if let Ok(Ok(mut session)) = opening.await {
        metrics.with(RunMetrics::record_session_open);
        session.close().await;
        metrics.with(RunMetrics::record_session_close);
        debug!(proxy = session.proxy(), "closed session that opened past its deadline");
    }
}
