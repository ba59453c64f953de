use tokio::sync::broadcast;

use crate::error::SyncError;

/// User-visible conditions surfaced by the engine. Rendering them (toast,
/// banner, redirect) is up to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    RateLimited,
    Maintenance,
    /// The push channel is being throttled; the view keeps working without
    /// live updates.
    ChannelThrottled,
}

impl Notice {
    pub fn for_request_error(err: &SyncError) -> Option<Notice> {
        match err {
            SyncError::RateLimited => Some(Notice::RateLimited),
            SyncError::ServiceUnavailable => Some(Notice::Maintenance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notices {
    tx: broadcast::Sender<Notice>,
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}

impl Notices {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn emit(&self, notice: Notice) {
        // No receiver just means no view is listening.
        let _ = self.tx.send(notice);
    }

    /// Emit a notice for user-visible errors, log everything else.
    pub fn report(&self, target: &'static str, context: &str, err: &SyncError) {
        match Notice::for_request_error(err) {
            Some(notice) => {
                log::warn!(target: target, "{}: {}", context, err);
                self.emit(notice);
            }
            None => log::error!(target: target, "{}: {}", context, err),
        }
    }
}
