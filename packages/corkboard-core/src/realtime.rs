/// Push-channel subscription for one active view.
///
/// The channel is best effort: it only tells the view that its data went
/// stale, and every event turns into (at most) one coalesced refetch. When
/// the reconnect table runs out the listener stops and the view keeps
/// working from explicit refetches alone.
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::api::Scope;
use crate::config::ReconnectPolicy;
use crate::error::SyncError;
use crate::hub::PushEvent;
use crate::notice::{Notice, Notices};
use crate::refresh::{Fetch, Liveness, Refresher};

const TARGET: &str = "corkboard.sync.realtime";

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open the channel and join `scope`. Resolves once the join has been
    /// acknowledged.
    async fn connect(&self, scope: &Scope) -> Result<Box<dyn PushConnection>, SyncError>;
}

#[async_trait]
pub trait PushConnection: Send {
    /// Next invalidation; `Ok(None)` when the server closed the channel.
    async fn next_event(&mut self) -> Result<Option<PushEvent>, SyncError>;
}

pub struct RealtimeListener<T: Fetch> {
    transport: Arc<dyn PushTransport>,
    refresher: Refresher<T>,
    policy: ReconnectPolicy,
    notices: Notices,
    liveness: Liveness,
}

/// Running listener task. Dropping the handle does not stop the task.
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit on its own (reconnect table exhausted).
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}

impl<T: Fetch> RealtimeListener<T> {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        refresher: Refresher<T>,
        policy: ReconnectPolicy,
        notices: Notices,
        liveness: Liveness,
    ) -> Self {
        Self {
            transport,
            refresher,
            policy,
            notices,
            liveness,
        }
    }

    pub fn spawn(self) -> ListenerHandle {
        ListenerHandle {
            task: tokio::spawn(self.run()),
        }
    }

    fn report(&self, scope: &Scope, err: &SyncError) {
        if *err == SyncError::RateLimited {
            log::warn!(target: TARGET, "Push channel for {} is throttled", scope);
            self.notices.emit(Notice::ChannelThrottled);
        } else {
            log::warn!(target: TARGET, "Push channel for {}: {}", scope, err);
        }
    }

    async fn run(self) {
        let scope = self.refresher.scope().clone();
        let mut attempt = 0;
        let mut joined_before = false;

        loop {
            let Some(delay) = self.policy.delay(attempt) else {
                let err = SyncError::ChannelDisconnected(format!(
                    "gave up on {} after {} attempts",
                    scope, attempt
                ));
                log::warn!(target: TARGET, "{}, continuing without live updates", err);
                return;
            };
            attempt += 1;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !self.liveness.is_alive() {
                return;
            }

            let mut connection = match self.transport.connect(&scope).await {
                Ok(connection) => connection,
                Err(e) => {
                    self.report(&scope, &e);
                    continue;
                }
            };
            if !self.liveness.is_alive() {
                return;
            }
            log::info!(target: TARGET, "Joined push channel for {}", scope);
            attempt = 0;
            if joined_before {
                // Invalidations sent while we were away are lost.
                self.refresher.trigger();
            }
            joined_before = true;

            loop {
                match connection.next_event().await {
                    Ok(Some(event)) => {
                        if !self.liveness.is_alive() {
                            return;
                        }
                        if event.concerns(&scope) {
                            log::debug!(target: TARGET, "{:?} invalidates {}", event, scope);
                            self.refresher.trigger();
                        } else {
                            log::debug!(target: TARGET, "Ignoring {:?} while viewing {}", event, scope);
                        }
                    }
                    Ok(None) => {
                        log::info!(target: TARGET, "Push channel for {} closed by server", scope);
                        break;
                    }
                    Err(e) => {
                        self.report(&scope, &e);
                        break;
                    }
                }
            }
        }
    }
}
