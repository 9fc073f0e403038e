//! The webhook registry.

use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{EventStream, Observer, PushSubscription, SourceError, push};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{DeliveryError, WebhookError};
use crate::types::{RequestContext, WebhookRequest, WebhookStatus};
use crate::url::destination_url;

/// Called with `(url, error)` when a registration is torn down by a failure.
pub type FailureCallback = Arc<dyn Fn(&str, &DeliveryError) + Send + Sync>;

/// Delivery settings.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

struct Entry {
    generation: u64,
    subscription: PushSubscription,
}

struct Inner {
    client: reqwest::Client,
    entries: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    on_failure: Option<FailureCallback>,
}

impl Inner {
    /// Remove `url` if it still belongs to `generation`.
    fn remove_if_current(&self, url: &str, generation: u64) -> bool {
        let mut entries = self.entries.lock();
        if entries.get(url).is_some_and(|e| e.generation == generation) {
            if let Some(entry) = entries.remove(url) {
                entry.subscription.cancel();
            }
            true
        } else {
            false
        }
    }
}

/// Registry of outbound webhook subscriptions keyed by destination URL.
///
/// Cloning shares the same registrations.
#[derive(Clone)]
pub struct WebhookRegistry {
    inner: Arc<Inner>,
}

impl WebhookRegistry {
    /// Create a registry.
    pub fn new(config: &WebhookConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a registry that reports torn-down registrations to `on_failure`.
    pub fn with_failure_callback(config: &WebhookConfig, on_failure: FailureCallback) -> Self {
        Self::build(config, Some(on_failure))
    }

    fn build(config: &WebhookConfig, on_failure: Option<FailureCallback>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("relay-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                client,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                on_failure,
            }),
        }
    }

    /// Register a webhook fed by `source`.
    ///
    /// Returns [`WebhookStatus::NoContent`] if the URL is already
    /// registered; the existing delivery keeps running and `source` is
    /// dropped unopened.
    pub fn add(
        &self,
        ctx: Option<&RequestContext>,
        req: &WebhookRequest,
        source: Option<EventStream>,
    ) -> Result<WebhookStatus, WebhookError> {
        let url = destination_url(ctx, req)?;
        let source = source.ok_or_else(|| WebhookError::bad_request("event source is required"))?;

        let mut entries = self.inner.entries.lock();
        if entries.contains_key(&url) {
            debug!(url = %url, "webhook already registered");
            return Ok(WebhookStatus::NoContent);
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let observer = DeliveryObserver {
            client: self.inner.client.clone(),
            registry: Arc::downgrade(&self.inner),
            url: url.clone(),
            generation,
        };
        let subscription = push::subscribe(source, observer);
        info!(url = %url, "webhook registered");
        let _ = entries.insert(
            url,
            Entry {
                generation,
                subscription,
            },
        );
        Ok(WebhookStatus::Created)
    }

    /// Cancel and remove the registration for the request's URL.
    pub fn remove(
        &self,
        ctx: Option<&RequestContext>,
        req: &WebhookRequest,
    ) -> Result<WebhookStatus, WebhookError> {
        let url = destination_url(ctx, req)?;
        let entry = self.inner.entries.lock().remove(&url);
        match entry {
            Some(entry) => {
                entry.subscription.cancel();
                info!(url = %url, "webhook removed");
                Ok(WebhookStatus::Removed)
            }
            None => Err(WebhookError::NotFound(url)),
        }
    }

    /// Cancel and remove every registration.
    pub fn clear(&self) {
        let drained: Vec<(String, Entry)> = self.inner.entries.lock().drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "clearing webhooks");
        }
        for (_, entry) in drained {
            entry.subscription.cancel();
        }
    }

    /// Whether `url` is registered.
    pub fn contains(&self, url: &str) -> bool {
        self.inner.entries.lock().contains_key(url)
    }

    /// Registered URLs, sorted.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.inner.entries.lock().keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Whether there are no registrations.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }
}

impl fmt::Debug for WebhookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookRegistry")
            .field("urls", &self.urls())
            .finish_non_exhaustive()
    }
}

struct DeliveryObserver {
    client: reqwest::Client,
    registry: Weak<Inner>,
    url: String,
    generation: u64,
}

impl DeliveryObserver {
    async fn deliver(&self, value: &Value) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(value).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }

    fn fail(&self, error: &DeliveryError) {
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        if inner.remove_if_current(&self.url, self.generation) {
            warn!(url = %self.url, error = %error, "webhook removed after failure");
            if let Some(callback) = &inner.on_failure {
                callback(&self.url, error);
            }
        }
    }
}

#[async_trait]
impl Observer for DeliveryObserver {
    async fn on_next(&self, value: Value) -> ControlFlow<()> {
        match self.deliver(&value).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(error) => {
                self.fail(&error);
                ControlFlow::Break(())
            }
        }
    }

    async fn on_error(&self, error: SourceError) {
        self.fail(&DeliveryError::Source(error));
    }

    async fn on_complete(&self) {
        if let Some(inner) = self.registry.upgrade() {
            if inner.remove_if_current(&self.url, self.generation) {
                debug!(url = %self.url, "webhook source completed");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
