//! Wakes the remote scraper worker.
//!
//! The web tier never runs the browser itself. It pings the worker host
//! (which may be sleeping on a free-tier platform) and asks it to start
//! draining the queue. At most one trigger call is in flight per process.

use clinexec_store::{setting_keys, SqliteStore, StoreError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::WorkerSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// No worker URL configured
    Disabled,
    /// Queue empty or auto trigger switched off
    NothingPending,
    /// Another trigger call has not returned yet
    AlreadyInFlight,
    Triggered,
    Failed { reason: String },
}

impl TriggerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerOutcome::Disabled => "disabled",
            TriggerOutcome::NothingPending => "nothing_pending",
            TriggerOutcome::AlreadyInFlight => "already_in_flight",
            TriggerOutcome::Triggered => "triggered",
            TriggerOutcome::Failed { .. } => "failed",
        }
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct WorkerTrigger {
    client: reqwest::Client,
    settings: WorkerSettings,
    in_flight: AtomicBool,
}

impl WorkerTrigger {
    pub fn new(settings: WorkerSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            client,
            settings,
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.settings.url.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wake the worker and ask it to process the queue.
    pub async fn trigger(&self, reason: &str) -> TriggerOutcome {
        let Some(base) = self.settings.url.as_deref() else {
            tracing::debug!(reason, "Worker trigger skipped: no worker URL");
            return TriggerOutcome::Disabled;
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(reason, "Worker trigger already in flight");
            return TriggerOutcome::AlreadyInFlight;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let base = base.trim_end_matches('/');

        // Best effort: a cold host may take the ping to boot
        if let Err(e) = self.client.get(format!("{}/health", base)).send().await {
            tracing::debug!(error = %e, "Worker wake ping failed");
        }

        let mut request = self
            .client
            .post(format!("{}/trigger", base))
            .json(&serde_json::json!({ "reason": reason }));
        if let Some(token) = &self.settings.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(reason, status = %response.status(), "Worker triggered");
                TriggerOutcome::Triggered
            }
            Ok(response) => {
                let status = response.status();
                tracing::warn!(reason, status = %status, "Worker rejected trigger");
                TriggerOutcome::Failed {
                    reason: format!("worker responded with {}", status),
                }
            }
            Err(e) => {
                tracing::error!(reason, error = %e, "Failed to reach worker");
                TriggerOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Trigger only when there is queued work and auto triggering is on.
    #[allow(clippy::result_large_err)]
    pub async fn maybe_trigger(
        &self,
        store: &SqliteStore,
        reason: &str,
    ) -> Result<TriggerOutcome, StoreError> {
        if !store.get_bool_setting(setting_keys::SCRAP_AUTO_TRIGGER, true)?
            || !store.has_pending_scrap()?
        {
            return Ok(TriggerOutcome::NothingPending);
        }
        Ok(self.trigger(reason).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::{get, post}, Router};
    use std::sync::{Arc, Mutex};

    fn settings(url: Option<String>) -> WorkerSettings {
        WorkerSettings {
            url,
            token: Some("s3cret".to_string()),
            timeout_secs: 2,
            ..WorkerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_without_url() {
        let trigger = WorkerTrigger::new(settings(None)).unwrap();
        assert!(!trigger.is_configured());
        assert_eq!(trigger.trigger("manual").await, TriggerOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let trigger = WorkerTrigger::new(settings(Some("http://127.0.0.1:9".into()))).unwrap();
        trigger.in_flight.store(true, Ordering::Release);
        assert_eq!(trigger.trigger("manual").await, TriggerOutcome::AlreadyInFlight);
        // Still held by the other caller
        assert!(trigger.is_in_flight());
    }

    #[tokio::test]
    async fn test_unreachable_worker_fails_and_clears_flag() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let trigger = WorkerTrigger::new(settings(Some(format!("http://{}", addr)))).unwrap();
        let outcome = trigger.trigger("manual").await;
        assert!(matches!(outcome, TriggerOutcome::Failed { .. }));
        assert!(!trigger.is_in_flight());
    }

    #[tokio::test]
    async fn test_trigger_sends_bearer_token() {
        let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&seen);
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/trigger",
                post(move |headers: HeaderMap| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *captured.lock().unwrap() = auth;
                    "queued"
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let trigger = WorkerTrigger::new(settings(Some(format!("http://{}/", addr)))).unwrap();
        assert_eq!(trigger.trigger("manual").await, TriggerOutcome::Triggered);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("Bearer s3cret"));
        assert!(!trigger.is_in_flight());
    }

    #[tokio::test]
    async fn test_maybe_trigger_requires_pending_job() {
        let store = SqliteStore::open(":memory:").unwrap();
        let trigger = WorkerTrigger::new(settings(Some("http://127.0.0.1:9".into()))).unwrap();
        let outcome = trigger.maybe_trigger(&store, "enqueue").await.unwrap();
        assert_eq!(outcome, TriggerOutcome::NothingPending);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(TriggerOutcome::Failed {
            reason: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "boom");
        assert_eq!(
            serde_json::to_value(TriggerOutcome::Triggered).unwrap()["outcome"],
            "triggered"
        );
    }
}
