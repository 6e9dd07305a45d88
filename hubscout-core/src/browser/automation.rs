use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ChromiumSection, ScoutConfig};

use super::error::{BrowserError, BrowserResult};
use super::session::{FetchSession, SessionFactory};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const HANDLER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    config: Arc<ChromiumSection>,
    user_agents: Vec<String>,
}

impl BrowserLauncher {
    pub fn new(config: &ScoutConfig) -> Self {
        Self {
            config: Arc::new(config.chromium.clone()),
            user_agents: config.user_agents.pool.clone(),
        }
    }

    pub async fn launch(&self) -> BrowserResult<ChromiumSessionFactory> {
        let user_agent = self.select_user_agent();
        let chromium_config = self.build_chromium_config(&user_agent)?;
        info!(
            ua = %user_agent,
            headless = self.config.headless,
            "launching chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        Ok(ChromiumSessionFactory {
            browser: Arc::new(browser),
            handler_task: Mutex::new(Some(handler_task)),
            user_agent,
            accept_language: self.config.lang.clone(),
        })
    }

    fn select_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        self.user_agents
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    fn build_chromium_config(&self, user_agent: &str) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder();
        if let Some(executable) = &self.config.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.config.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![format!("--user-agent={user_agent}")];
        if self.config.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &self.config.lang {
            args.push(format!("--lang={lang}"));
        }
        args.push("--no-first-run".into());
        args.push("--disable-features=AutomationControlled".into());
        args.push("--password-store=basic".into());

        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[derive(Debug)]
pub struct ChromiumSessionFactory {
    browser: Arc<Browser>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    user_agent: String,
    accept_language: Option<String>,
}

impl ChromiumSessionFactory {
    pub async fn shutdown(&self) {
        info!("shutting down chromium instance");
        if let Err(err) = self.browser.execute(CloseParams::default()).await {
            warn!(error = %err, "failed to close browser gracefully");
        }
        let handle = self
            .handler_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            match tokio::time::timeout(HANDLER_SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "browser handler join error"),
                Err(_) => warn!("browser handler did not stop after close"),
            }
        }
    }

    async fn open_context(&self, proxy: &str) -> BrowserResult<(BrowserContextId, Page)> {
        let mut context_params = CreateBrowserContextParams::default();
        context_params.dispose_on_detach = Some(true);
        context_params.proxy_server = Some(format!("http://{proxy}"));
        let context_id = self
            .browser
            .execute(context_params)
            .await?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        let page = match self.browser.new_page(target).await {
            Ok(page) => page,
            Err(err) => {
                dispose_context(&self.browser, context_id).await;
                return Err(err.into());
            }
        };
        if let Err(err) = self.configure_page(&page).await {
            let _ = page.close().await;
            dispose_context(&self.browser, context_id).await;
            return Err(err);
        }
        Ok((context_id, page))
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        let mut params_builder =
            SetUserAgentOverrideParams::builder().user_agent(self.user_agent.clone());
        if let Some(accept) = &self.accept_language {
            params_builder = params_builder.accept_language(accept.clone());
        }
        let params = params_builder
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn open(&self, proxy: &str) -> BrowserResult<Box<dyn FetchSession>> {
        let (context_id, page) =
            self.open_context(proxy)
                .await
                .map_err(|err| BrowserError::Connect {
                    proxy: proxy.to_string(),
                    reason: err.to_string(),
                })?;
        debug!(proxy, "opened browser context");
        Ok(Box::new(ChromiumSession {
            proxy: proxy.to_string(),
            browser: Arc::clone(&self.browser),
            context_id: Some(context_id),
            page: Some(page),
        }))
    }
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(err) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        debug!(error = %err, "failed to dispose browser context");
    }
}

#[derive(Debug)]
pub struct ChromiumSession {
    proxy: String,
    browser: Arc<Browser>,
    context_id: Option<BrowserContextId>,
    page: Option<Page>,
}

#[async_trait]
impl FetchSession for ChromiumSession {
    fn proxy(&self) -> &str {
        &self.proxy
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<String> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| BrowserError::Unexpected(format!("session {} is closed", self.proxy)))?;
        let load_error = |reason: String| BrowserError::Load {
            url: url.to_string(),
            reason,
        };
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        page.goto(params)
            .await
            .map_err(|err| load_error(err.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|err| load_error(err.to_string()))?;
        // Chromium renders proxy and DNS failures as an internal error page.
        if let Some(current) = page.url().await? {
            if current.starts_with("chrome-error://") {
                return Err(load_error(format!("browser error page at {current}")));
            }
        }
        Ok(page.content().await?)
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(err) = page.close().await {
                debug!(proxy = %self.proxy, error = %err, "failed to close page");
            }
        }
        if let Some(context_id) = self.context_id.take() {
            dispose_context(&self.browser, context_id).await;
            debug!(proxy = %self.proxy, "closed browser context");
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if self.context_id.is_some() {
            warn!(proxy = %self.proxy, "chromium session dropped without explicit close");
        }
    }
}
