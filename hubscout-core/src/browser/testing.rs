use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::error::{BrowserError, BrowserResult};
use super::session::{FetchSession, SessionFactory};

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub opened: Vec<String>,
    pub closed: Vec<String>,
}

impl Ledger {
    pub fn still_open(&self) -> Vec<String> {
        let mut remaining = self.closed.clone();
        let mut open = Vec::new();
        for proxy in &self.opened {
            if let Some(pos) = remaining.iter().position(|closed| closed == proxy) {
                remaining.remove(pos);
            } else {
                open.push(proxy.clone());
            }
        }
        open
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProxyScript {
    connects: bool,
    open_delay: Duration,
    delay: Duration,
    succeeds: bool,
}

impl ProxyScript {
    pub fn succeed_after(delay: Duration) -> Self {
        Self {
            connects: true,
            open_delay: Duration::ZERO,
            delay,
            succeeds: true,
        }
    }

    pub fn fail_after(delay: Duration) -> Self {
        Self {
            connects: true,
            open_delay: Duration::ZERO,
            delay,
            succeeds: false,
        }
    }

    pub fn opening_after(mut self, open_delay: Duration) -> Self {
        self.open_delay = open_delay;
        self
    }

    pub fn refuse_connect() -> Self {
        Self {
            connects: false,
            open_delay: Duration::ZERO,
            delay: Duration::ZERO,
            succeeds: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeFactory {
    scripts: HashMap<String, ProxyScript>,
    ledger: Arc<Mutex<Ledger>>,
}

impl FakeFactory {
    pub fn script(mut self, proxy: &str, script: ProxyScript) -> Self {
        self.scripts.insert(proxy.to_string(), script);
        self
    }

    pub fn ledger(&self) -> Ledger {
        self.ledger.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, proxy: &str) -> BrowserResult<Box<dyn FetchSession>> {
        let script = self
            .scripts
            .get(proxy)
            .copied()
            .unwrap_or_else(ProxyScript::refuse_connect);
        if !script.open_delay.is_zero() {
            tokio::time::sleep(script.open_delay).await;
        }
        if !script.connects {
            return Err(BrowserError::Connect {
                proxy: proxy.to_string(),
                reason: "connection refused".into(),
            });
        }
        self.ledger.lock().unwrap().opened.push(proxy.to_string());
        Ok(Box::new(FakeSession {
            proxy: proxy.to_string(),
            script,
            closed: false,
            ledger: Arc::clone(&self.ledger),
        }))
    }
}

struct FakeSession {
    proxy: String,
    script: ProxyScript,
    closed: bool,
    ledger: Arc<Mutex<Ledger>>,
}

#[async_trait]
impl FetchSession for FakeSession {
    fn proxy(&self) -> &str {
        &self.proxy
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<String> {
        tokio::time::sleep(self.script.delay).await;
        if self.script.succeeds {
            Ok(format!("<html><body>{url}</body></html>"))
        } else {
            Err(BrowserError::Load {
                url: url.to_string(),
                reason: "net::ERR_PROXY_CONNECTION_FAILED".into(),
            })
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.ledger.lock().unwrap().closed.push(self.proxy.clone());
        }
    }
}

pub struct FlakySession {
    failures_before_success: usize,
    content: String,
    pub calls: usize,
}

impl FlakySession {
    pub fn new(failures_before_success: usize, content: &str) -> Self {
        Self {
            failures_before_success,
            content: content.to_string(),
            calls: 0,
        }
    }
}

#[async_trait]
impl FetchSession for FlakySession {
    fn proxy(&self) -> &str {
        "127.0.0.1:3128"
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<String> {
        self.calls += 1;
        if self.calls <= self.failures_before_success {
            Err(BrowserError::Load {
                url: url.to_string(),
                reason: format!("attempt {} failed", self.calls),
            })
        } else {
            Ok(self.content.clone())
        }
    }

    async fn close(&mut self) {}
}
