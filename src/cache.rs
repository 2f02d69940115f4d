use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};

use crate::frame::Frame;

#[derive(Debug, Clone)]
struct CachedFrame {
    frame: Frame,
    seq: u64,
    received_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<u32, CachedFrame>,
    next_seq: u64,
}

/// Latest-frame-per-camera store shared between connection handlers (writers)
/// and stream publishers (readers).
///
/// One lock guards the whole map, so a reader always sees a complete frame:
/// either the previous one or the newest one, never a mix. Each `set` bumps a
/// cache-wide sequence number and wakes everyone waiting on
/// [`change_listener`](Self::change_listener), which lets publishers emit each
/// cached frame at most once instead of busy-polling.
#[derive(Clone, Default)]
pub struct FrameCache {
    inner: Arc<RwLock<Inner>>,
    changed: Arc<Notify>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `camera_id`. Last write wins; there is no
    /// merging and no history.
    pub async fn set(&self, camera_id: u32, frame: Frame) {
        {
            let mut inner = self.inner.write().await;
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner.entries.insert(
                camera_id,
                CachedFrame { frame, seq, received_at: Utc::now() },
            );
        }
        self.changed.notify_waiters();
    }

    pub async fn latest(&self, camera_id: u32) -> Option<Frame> {
        let inner = self.inner.read().await;
        inner.entries.get(&camera_id).map(|entry| entry.frame.clone())
    }

    /// Latest frame together with its sequence number, so callers can tell a
    /// fresh frame from one they already consumed.
    pub async fn latest_versioned(&self, camera_id: u32) -> Option<(u64, Frame)> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(&camera_id)
            .map(|entry| (entry.seq, entry.frame.clone()))
    }

    pub async fn last_received(&self, camera_id: u32) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().await;
        inner.entries.get(&camera_id).map(|entry| entry.received_at)
    }

    /// Handle for waiting on cache changes. Register interest with
    /// `notified()` before reading the cache to avoid missing an update that
    /// lands in between.
    pub fn change_listener(&self) -> Arc<Notify> {
        self.changed.clone()
    }
}
