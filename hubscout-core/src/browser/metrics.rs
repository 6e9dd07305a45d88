use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub probes_started: u64,
    pub probes_failed: u64,
    pub probes_cancelled: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub pages_loaded: u64,
    pub load_failures: u64,
    pub retries: u64,
}

impl RunMetrics {
    pub fn record_probe_started(&mut self) {
        self.probes_started = self.probes_started.saturating_add(1);
    }

    pub fn record_probe_failed(&mut self) {
        self.probes_failed = self.probes_failed.saturating_add(1);
    }

    pub fn record_probe_cancelled(&mut self) {
        self.probes_cancelled = self.probes_cancelled.saturating_add(1);
    }

    pub fn record_session_open(&mut self) {
        self.sessions_opened = self.sessions_opened.saturating_add(1);
    }

    pub fn record_session_close(&mut self) {
        self.sessions_closed = self.sessions_closed.saturating_add(1);
    }

    pub fn record_page_load(&mut self) {
        self.pages_loaded = self.pages_loaded.saturating_add(1);
    }

    pub fn record_load_failure(&mut self) {
        self.load_failures = self.load_failures.saturating_add(1);
    }

    pub fn record_retry(&mut self) {
        self.retries = self.retries.saturating_add(1);
    }

    pub fn open_sessions(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsHandle {
    inner: Arc<Mutex<RunMetrics>>,
}

impl MetricsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut RunMetrics) -> R,
    {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn snapshot(&self) -> RunMetrics {
        self.with(|metrics| metrics.clone())
    }
}
