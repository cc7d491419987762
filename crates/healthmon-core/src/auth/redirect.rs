//! Deep-link redirect delivery.
//!
//! The platform's URL handler calls `RedirectHub::deliver` for every incoming
//! deep link. An authorization flow subscribes with `listen` before opening the
//! browser and awaits its `RedirectListener`. Dropping the listener releases the
//! registration, so success, dismissal, error and cancellation all unregister.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;
use url::Url;

/// What a listener receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectEvent {
    Redirected(Url),
    Dismissed,
}

struct Registration {
    prefix: String,
    sender: oneshot::Sender<RedirectEvent>,
}

#[derive(Default)]
pub struct RedirectHub {
    listeners: Mutex<HashMap<u64, Registration>>,
    next_id: AtomicU64,
}

impl RedirectHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register interest in redirects whose URL starts with `prefix`.
    pub fn listen(self: &Arc<Self>, prefix: impl Into<String>) -> RedirectListener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.lock().insert(
            id,
            Registration {
                prefix: prefix.into(),
                sender,
            },
        );
        debug!(listener = id, "Registered redirect listener");

        RedirectListener {
            hub: Arc::clone(self),
            id,
            receiver: Some(receiver),
        }
    }

    /// Hand an incoming deep link to the first matching listener.
    /// Returns false when nobody was waiting for it.
    pub fn deliver(&self, url: Url) -> bool {
        let mut listeners = self.lock();
        let id = listeners
            .iter()
            .find(|(_, reg)| is_callback(&url, &reg.prefix))
            .map(|(id, _)| *id);

        match id.and_then(|id| listeners.remove(&id)) {
            Some(reg) => reg.sender.send(RedirectEvent::Redirected(url)).is_ok(),
            None => false,
        }
    }

    /// The user closed the browser: wake every waiting listener.
    pub fn dismiss(&self) {
        for (_, reg) in self.lock().drain() {
            let _ = reg.sender.send(RedirectEvent::Dismissed);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            debug!(listener = id, "Released redirect listener");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Registration>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `url` is the callback itself, optionally followed by a query or fragment.
fn is_callback(url: &Url, callback: &str) -> bool {
    url.as_str()
        .strip_prefix(callback)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('?') || rest.starts_with('#'))
}

/// Scoped registration; unregisters on drop.
pub struct RedirectListener {
    hub: Arc<RedirectHub>,
    id: u64,
    receiver: Option<oneshot::Receiver<RedirectEvent>>,
}

impl RedirectListener {
    /// Wait for the redirect or dismissal. A hub torn down mid-wait counts as dismissal.
    pub async fn recv(&mut self) -> RedirectEvent {
        match self.receiver.take() {
            Some(receiver) => receiver.await.unwrap_or(RedirectEvent::Dismissed),
            None => RedirectEvent::Dismissed,
        }
    }
}

impl Drop for RedirectListener {
    fn drop(&mut self) {
        self.hub.release(self.id);
    }
}
