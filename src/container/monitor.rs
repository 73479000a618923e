//! Container completion detection.
//!
//! A deployment container runs to completion on its own; the deployer only needs to
//! know when it has stopped. Two strategies are available behind [`CompletionWatcher`]:
//!
//! - [`PollingWatcher`] (default): inspects the container at a fixed interval until it
//!   reaches a terminal status or a hard timeout elapses. A failed inspection is logged
//!   and retried on the next tick; only [`ContainerError::NotFound`] ends the wait early.
//!   The last inspection happens at the deadline itself.
//! - [`EventWatcher`]: follows the runtime's event stream for the container, replayed
//!   from the moment just before the container was started, and returns on the first
//!   `die` event. No hard timeout. If the stream ends first, one inspection decides.
//!
//! Neither strategy holds a lock while waiting. Cancellation is done by dropping the
//! returned future, which also closes an open event stream.

use crate::container::{ContainerError, ContainerRuntime, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default interval between inspections.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default hard limit on how long a deployment may run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How the end of a container's run was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Container reached a terminal status
    Exited {
        /// Exit code reported by the runtime
        exit_code: Option<i64>,
    },
    /// Container was still running when the timeout elapsed
    TimedOut,
}

/// Waits for a container to finish.
#[async_trait]
pub trait CompletionWatcher: Send + Sync {
    /// Block until the container terminates (or the strategy gives up).
    ///
    /// `since` is a point in time no later than the container's start.
    async fn wait(
        &self,
        runtime: &dyn ContainerRuntime,
        container_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Completion>;
}

/// Completion strategy selection, as found in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CompletionStrategy {
    /// Inspect the container periodically
    Polling {
        /// Seconds between inspections
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
        /// Seconds before giving up
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// Follow the runtime event stream
    Events,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for CompletionStrategy {
    fn default() -> Self {
        Self::Polling {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CompletionStrategy {
    /// Build the watcher implementing this strategy.
    pub fn watcher(&self) -> Box<dyn CompletionWatcher> {
        match *self {
            Self::Polling {
                poll_interval_secs,
                timeout_secs,
            } => Box::new(PollingWatcher::new(
                Duration::from_secs(poll_interval_secs),
                Duration::from_secs(timeout_secs),
            )),
            Self::Events => Box::new(EventWatcher),
        }
    }
}

/// Polls container inspection until the container stops.
#[derive(Debug, Clone)]
pub struct PollingWatcher {
    interval: Duration,
    timeout: Duration,
}

impl Default for PollingWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT)
    }
}

impl PollingWatcher {
    /// Create a polling watcher.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

#[async_trait]
impl CompletionWatcher for PollingWatcher {
    async fn wait(
        &self,
        runtime: &dyn ContainerRuntime,
        container_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Completion> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match runtime.inspect_container(container_id).await {
                Ok(inspection) if inspection.status.is_terminal() => {
                    info!("Container {} terminated with {:?}", container_id, inspection.exit_code);
                    return Ok(Completion::Exited {
                        exit_code: inspection.exit_code,
                    });
                }
                Ok(inspection) => debug!(
                    "Container {} status: {} (exit code {:?})",
                    container_id, inspection.status, inspection.exit_code
                ),
                Err(e @ ContainerError::NotFound(_)) => return Err(e),
                Err(e) => warn!("Failed to inspect container {}, retrying: {}", container_id, e),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("Container {} still running after {:?}", container_id, self.timeout);
                return Ok(Completion::TimedOut);
            }

            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}

/// Waits for the runtime's `die` event for the container.
#[derive(Debug, Clone, Default)]
pub struct EventWatcher;

#[async_trait]
impl CompletionWatcher for EventWatcher {
    async fn wait(
        &self,
        runtime: &dyn ContainerRuntime,
        container_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Completion> {
        // Replayed from `since`, so a `die` emitted before the first poll is still seen.
        let mut events = runtime.container_events(container_id, since);

        while let Some(event) = events.next().await {
            let event = event?;
            debug!("Container {} event: {}", container_id, event.action);

            if event.is_die() {
                drop(events);
                let inspection = runtime.inspect_container(container_id).await?;
                info!("Container {} terminated with {:?}", container_id, inspection.exit_code);
                return Ok(Completion::Exited {
                    exit_code: inspection.exit_code,
                });
            }
        }

        warn!("Event stream for container {} closed before it terminated", container_id);
        let inspection = runtime.inspect_container(container_id).await?;
        if inspection.status.is_terminal() {
            return Ok(Completion::Exited {
                exit_code: inspection.exit_code,
            });
        }

        Err(ContainerError::Other(format!(
            "Event stream closed while container {} was still {}",
            container_id, inspection.status
        )))
    }
}
