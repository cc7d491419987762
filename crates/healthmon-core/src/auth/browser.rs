//! Authorization-session opener.
//!
//! `AuthSession` never talks to a browser directly. It hands the authorization
//! URL to an `AuthBrowser` and suspends until that returns a terminal outcome.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use super::redirect::{RedirectEvent, RedirectHub};

/// Terminal result of one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// Browser was redirected to the callback; carries the final URL.
    Success(Url),
    /// User closed the browser before the redirect.
    Dismissed,
    Error(String),
}

#[async_trait]
pub trait AuthBrowser: Send + Sync {
    /// Open `url` and wait until the browser lands on `callback_uri` or is dismissed.
    async fn open_auth_session(&self, url: &Url, callback_uri: &str) -> BrowserOutcome;
}

/// Launches a URL in the system browser. Returns an error message on failure.
pub type UrlLauncher = Arc<dyn Fn(&Url) -> Result<(), String> + Send + Sync>;

/// Browser opener for platforms that deliver the callback as a deep link.
///
/// The redirect listener is registered before the URL is launched and is
/// released when this call returns, whatever the outcome.
pub struct LinkBrowser {
    hub: Arc<RedirectHub>,
    launcher: UrlLauncher,
    timeout: Option<Duration>,
}

impl LinkBrowser {
    pub fn new(hub: Arc<RedirectHub>, launcher: UrlLauncher) -> Self {
        Self {
            hub,
            launcher,
            timeout: None,
        }
    }

    /// Give up (as dismissed) if no redirect arrives within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl AuthBrowser for LinkBrowser {
    async fn open_auth_session(&self, url: &Url, callback_uri: &str) -> BrowserOutcome {
        let mut listener = self.hub.listen(callback_uri);

        if let Err(e) = (self.launcher)(url) {
            warn!(error = %e, "Failed to launch browser");
            return BrowserOutcome::Error(e);
        }

        let event = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, listener.recv()).await {
                Ok(event) => event,
                Err(_) => {
                    debug!(?timeout, "Authorization session timed out");
                    RedirectEvent::Dismissed
                }
            },
            None => listener.recv().await,
        };

        match event {
            RedirectEvent::Redirected(url) => BrowserOutcome::Success(url),
            RedirectEvent::Dismissed => BrowserOutcome::Dismissed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALLBACK: &str = "healthmonitor://oauth/callback";

    #[tokio::test]
    async fn test_link_browser_returns_delivered_redirect() {
        let hub = RedirectHub::new();
        let delivering_hub = Arc::clone(&hub);
        let launcher: UrlLauncher = Arc::new(move |_url: &Url| {
            let redirect = Url::parse("healthmonitor://oauth/callback?code=c&state=s").unwrap();
            delivering_hub.deliver(redirect);
            Ok(())
        });

        let browser = LinkBrowser::new(Arc::clone(&hub), launcher);
        let auth_url = Url::parse("https://auth.example.org/authorize").unwrap();
        let outcome = browser.open_auth_session(&auth_url, CALLBACK).await;

        match outcome {
            BrowserOutcome::Success(url) => assert!(url.as_str().contains("code=c")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_releases_listener() {
        let hub = RedirectHub::new();
        let launcher: UrlLauncher = Arc::new(|_url: &Url| Err("no browser".to_string()));

        let browser = LinkBrowser::new(Arc::clone(&hub), launcher);
        let auth_url = Url::parse("https://auth.example.org/authorize").unwrap();
        let outcome = browser.open_auth_session(&auth_url, CALLBACK).await;

        assert_eq!(outcome, BrowserOutcome::Error("no browser".to_string()));
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_dismissal() {
        let hub = RedirectHub::new();
        let launcher: UrlLauncher = Arc::new(|_url: &Url| Ok(()));

        let browser = LinkBrowser::new(Arc::clone(&hub), launcher)
            .with_timeout(Duration::from_millis(20));
        let auth_url = Url::parse("https://auth.example.org/authorize").unwrap();

        assert_eq!(
            browser.open_auth_session(&auth_url, CALLBACK).await,
            BrowserOutcome::Dismissed
        );
        assert_eq!(hub.listener_count(), 0);
    }
}
