use std::time::Duration;

use async_trait::async_trait;

use super::error::{BrowserError, BrowserResult};

// Whoever opens a session owns it and must close it before dropping it.
#[async_trait]
pub trait FetchSession: Send {
    fn proxy(&self) -> &str;

    async fn navigate(&mut self, url: &str) -> BrowserResult<String>;

    async fn close(&mut self);
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, proxy: &str) -> BrowserResult<Box<dyn FetchSession>>;
}

pub async fn load(
    session: &mut dyn FetchSession,
    url: &str,
    timeout: Duration,
) -> BrowserResult<String> {
    match tokio::time::timeout(timeout, session.navigate(url)).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout(format!(
            "{url} via {} after {}ms",
            session.proxy(),
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSession {
        delay: Duration,
    }

    #[async_trait]
    impl FetchSession for SlowSession {
        fn proxy(&self) -> &str {
            "10.0.0.1:8080"
        }

        async fn navigate(&mut self, _url: &str) -> BrowserResult<String> {
            tokio::time::sleep(self.delay).await;
            Ok("<html></html>".to_string())
        }

        async fn close(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn load_returns_content_within_deadline() {
        let mut session = SlowSession {
            delay: Duration::from_millis(100),
        };
        let html = load(&mut session, "https://github.com/", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(html, "<html></html>");
    }

    #[tokio::test(start_paused = true)]
    async fn load_times_out_as_timeout_error() {
        let mut session = SlowSession {
            delay: Duration::from_secs(10),
        };
        let err = load(&mut session, "https://github.com/", Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            BrowserError::Timeout(message) => {
                assert!(message.contains("10.0.0.1:8080"));
                assert!(message.contains("1000ms"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
