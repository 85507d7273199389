//! Live status broadcast loop.
//!
//! A registry of subscribed channels owns at most one poll loop. The loop is
//! started when the registry goes from empty to one subscriber and cancelled
//! when it drops back to empty; joining or leaving in between never touches
//! the loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::channel::SessionChannel;
use crate::engine::status::{protocols_by_alias, HostStatus, StatusSource};
use crate::hostconfig::ProtocolIndex;

#[derive(Serialize)]
struct StatusBroadcast<'a> {
    class: &'static str,
    data: &'a [HostStatus],
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<Uuid, Arc<SessionChannel>>,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

/// Subscriber registry and poll loop owner for the `fsa` class.
pub struct LiveStatusPublisher {
    source: Arc<dyn StatusSource>,
    period: Duration,
    protocols: ProtocolIndex,
    shutdown: CancellationToken,
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for LiveStatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStatusPublisher")
            .field("period", &self.period)
            .field("subscribers", &self.subscriber_count())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl LiveStatusPublisher {
    /// Publisher polling `source` every `period`. Cancelling `shutdown`
    /// stops any running loop.
    #[must_use]
    pub fn new(
        source: Arc<dyn StatusSource>,
        period: Duration,
        protocols: ProtocolIndex,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            period,
            protocols,
            shutdown,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Add `channel` to the subscriber set, starting the loop if it is the
    /// first one. Returns `true` when this call started the loop.
    pub fn subscribe(&self, channel: Arc<SessionChannel>) -> bool {
        let mut registry = self.lock();
        registry.subscribers.insert(channel.id(), channel);
        if registry.running.is_some() {
            return false;
        }
        let token = self.shutdown.child_token();
        let handle = self.spawn_loop(token.clone());
        registry.running = Some((token, handle));
        info!(subscribers = registry.subscribers.len(), "fsa loop started");
        true
    }

    /// Remove a subscriber, stopping the loop if none remain. Returns `true`
    /// when this call stopped the loop.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let mut registry = self.lock();
        registry.subscribers.remove(&id);
        if !registry.subscribers.is_empty() {
            return false;
        }
        match registry.running.take() {
            Some((token, _handle)) => {
                token.cancel();
                info!("fsa loop stopped");
                true
            }
            None => false,
        }
    }

    /// Number of subscribed channels.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Whether a poll loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock()
            .running
            .as_ref()
            .is_some_and(|(token, _)| !token.is_cancelled())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_loop(&self, token: CancellationToken) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let registry = Arc::clone(&self.registry);
        let protocols = self.protocols.clone();
        let period = self.period;
        let span = info_span!("fsa_loop", period_ms = period.as_millis());

        tokio::spawn(
            async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = token.cancelled() => {
                            debug!("fsa loop cancelled");
                            break;
                        }
                        _ = interval.tick() => {
                            tick(source.as_ref(), &registry, &protocols).await;
                        }
                    }
                }
            }
            .instrument(span),
        )
    }
}

async fn tick(source: &dyn StatusSource, registry: &Mutex<Registry>, protocols: &ProtocolIndex) {
    let snapshot = match source.fetch().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(%err, "fsa poll failed");
            return;
        }
    };
    protocols.replace(protocols_by_alias(&snapshot));

    let text = match serde_json::to_string(&StatusBroadcast {
        class: "fsa",
        data: &snapshot,
    }) {
        Ok(text) => text,
        Err(err) => {
            error!(%err, "fsa snapshot not serializable");
            return;
        }
    };

    let subscribers: Vec<Arc<SessionChannel>> = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .subscribers
        .values()
        .cloned()
        .collect();
    for channel in subscribers {
        if let Err(err) = channel.send_text(text.as_str()) {
            debug!(channel = %channel.id(), %err, "fsa broadcast skipped");
        }
    }
}
