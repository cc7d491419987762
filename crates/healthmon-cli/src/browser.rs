//! Terminal stand-in for the system browser.
//!
//! The authorization URL is printed for the user to open by hand. The URL the
//! browser lands on afterwards is pasted back on stdin and fed through a
//! `RedirectHub`, the same path a deep-link handler would use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use healthmon_core::auth::{AuthBrowser, BrowserOutcome, LinkBrowser, RedirectHub, UrlLauncher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use url::Url;

pub struct ConsoleBrowser {
    inner: LinkBrowser,
}

impl ConsoleBrowser {
    pub fn new(timeout: Duration) -> Self {
        let hub = RedirectHub::new();
        let paste_hub = Arc::clone(&hub);

        let launcher: UrlLauncher = Arc::new(move |url: &Url| {
            eprintln!();
            eprintln!("Open this URL in your browser to continue:");
            eprintln!();
            eprintln!("  {}", url);
            eprintln!();
            eprintln!("Then paste the URL you were redirected to, or press Enter when done:");
            tokio::spawn(read_pasted_redirect(Arc::clone(&paste_hub)));
            Ok(())
        });

        Self {
            inner: LinkBrowser::new(hub, launcher).with_timeout(timeout),
        }
    }
}

#[async_trait]
impl AuthBrowser for ConsoleBrowser {
    async fn open_auth_session(&self, url: &Url, callback_uri: &str) -> BrowserOutcome {
        self.inner.open_auth_session(url, callback_uri).await
    }
}

/// Read one line from stdin. An empty line or EOF counts as closing the browser.
async fn read_pasted_redirect(hub: Arc<RedirectHub>) {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());

    match stdin.read_line(&mut line).await {
        Ok(0) => {
            hub.dismiss();
            return;
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "Failed to read redirect from stdin");
            hub.dismiss();
            return;
        }
    }

    let pasted = line.trim();
    if pasted.is_empty() {
        debug!("Empty line; treating as dismissal");
        hub.dismiss();
        return;
    }

    match Url::parse(pasted) {
        Ok(url) => {
            if !hub.deliver(url) {
                eprintln!("That URL is not the expected callback; cancelling.");
                hub.dismiss();
            }
        }
        Err(e) => {
            eprintln!("Not a valid URL ({}); cancelling.", e);
            hub.dismiss();
        }
    }
}
