//! In-process lock backend (§4.2 "Local (in-process) backend").
//!
//! [`LocalLeaseBackend`] is a trivial [`LeaseBackend`]: a `DashMap` used as
//! a presence set, matching the reference crate's use of a concurrent map
//! (`DashMap<u64, SharedFileInfo>` in `manager/core.rs`) as its single
//! piece of process-wide mutable state. [`GenericLocker`] layers the
//! acquire/handover/keep-alive state machine described in §4.2 on top of
//! *any* `LeaseBackend`, so the same code drives both this in-process
//! backend and, in principle, a distributed one (out of scope here, see
//! §1/§9).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{Lock, LeaseBackend, Locker, LockerInner};
use crate::error::LockError;
use crate::model::UploadId;

/// A presence-only lease store: holding the map entry *is* the lease.
/// There is no real expiry because the holder and the map live in the same
/// process; `extend` is a liveness no-op that always succeeds as long as
/// the entry is still ours.
#[derive(Debug, Default)]
pub struct LocalLeaseBackend {
    held: DashMap<UploadId, ()>,
}

impl LocalLeaseBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseBackend for LocalLeaseBackend {
    async fn try_acquire(&self, id: &UploadId, _ttl: Duration) -> Result<bool, LockError> {
        Ok(self.held.insert(id.clone(), ()).is_none())
    }

    async fn extend(&self, id: &UploadId, _ttl: Duration) -> Result<bool, LockError> {
        Ok(self.held.contains_key(id))
    }

    async fn release(&self, id: &UploadId) -> Result<(), LockError> {
        self.held.remove(id);
        Ok(())
    }
}

/// Generic acquire/handover/keep-alive engine atop a [`LeaseBackend`].
pub struct GenericLocker<B: LeaseBackend + 'static> {
    backend: Arc<B>,
    /// Per-ID channel a waiter uses to ask the current holder to release.
    request_notify: DashMap<UploadId, Arc<Notify>>,
    /// Per-ID channel the holder fires on `unlock` so a waiter retries.
    released_notify: DashMap<UploadId, Arc<Notify>>,
}

impl<B: LeaseBackend + 'static> GenericLocker<B> {
    pub fn new(backend: B) -> Arc<Self> {
        Arc::new(Self {
            backend: Arc::new(backend),
            request_notify: DashMap::new(),
            released_notify: DashMap::new(),
        })
    }

    fn request_notify_for(&self, id: &UploadId) -> Arc<Notify> {
        self.request_notify
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn released_notify_for(&self, id: &UploadId) -> Arc<Notify> {
        self.released_notify
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn spawn_keep_alive(
        self: &Arc<Self>,
        id: UploadId,
        ttl: Duration,
        cancel: CancellationToken,
        release_requested: Arc<Notify>,
    ) {
        let backend = self.backend.clone();
        let interval = (ttl / 2).max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; discard
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(upload_id = %id, "keep-alive cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        match backend.extend(&id, ttl).await {
                            Ok(true) => continue,
                            Ok(false) | Err(_) => {
                                warn!(upload_id = %id, "lease extension failed; requesting abort");
                                release_requested.notify_one();
                                break;
                            }
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl<B: LeaseBackend + 'static> Locker for Arc<GenericLocker<B>> {
    #[instrument(skip(self, ttl, timeout), fields(upload_id = %id))]
    async fn lock(
        &self,
        id: &UploadId,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Lock, LockError> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.backend.try_acquire(id, ttl).await? {
                let cancel = CancellationToken::new();
                let release_requested = self.request_notify_for(id);
                self.spawn_keep_alive(id.clone(), ttl, cancel.clone(), release_requested.clone());

                let inner: Arc<dyn LockerInner> = self.clone();
                return Ok(Lock {
                    id: id.clone(),
                    keep_alive_cancel: cancel,
                    release_requested,
                    locker: inner,
                });
            }

            // Contended: ask the current holder to release, then wait for
            // either the release notification or our deadline.
            self.request_notify_for(id).notify_one();
            let released = self.released_notify_for(id);

            tokio::select! {
                _ = released.notified() => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(LockError::Timeout { id: id.clone() });
                }
            }
        }
    }
}

#[async_trait]
impl<B: LeaseBackend + 'static> LockerInner for GenericLocker<B> {
    async fn unlock(&self, id: &UploadId) {
        // Best-effort: "already released" is not an error (§4.2).
        let _ = self.backend.release(id).await;
        if let Some(notify) = self.released_notify.get(id) {
            notify.notify_one();
        }
    }
}

/// The in-process locker this crate ships concretely.
pub type LocalLocker = Arc<GenericLocker<LocalLeaseBackend>>;

pub fn new_local_locker() -> LocalLocker {
    GenericLocker::new(LocalLeaseBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_lock_waits_then_succeeds_after_unlock() {
        let locker = new_local_locker();
        let id = "race".to_string();

        let first = locker.lock(&id, Duration::from_secs(8), Duration::from_secs(1)).await.unwrap();

        let locker2 = locker.clone();
        let id2 = id.clone();
        let waiter = tokio::spawn(async move {
            locker2.lock(&id2, Duration::from_secs(8), Duration::from_secs(2)).await
        });

        // Give the waiter a moment to register contention and request release.
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.unlock().await;

        let second = waiter.await.unwrap().expect("second lock should succeed after release");
        second.unlock().await;
    }

    #[tokio::test]
    async fn lock_times_out_if_never_released() {
        let locker = new_local_locker();
        let id = "stuck".to_string();
        let _first = locker.lock(&id, Duration::from_secs(8), Duration::from_secs(1)).await.unwrap();

        let err = locker
            .lock(&id, Duration::from_secs(8), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[tokio::test]
    async fn holder_sees_release_request_from_contender() {
        let locker = new_local_locker();
        let id = "handover".to_string();
        let first = locker.lock(&id, Duration::from_secs(8), Duration::from_secs(1)).await.unwrap();
        let notified = first.release_requested();

        let locker2 = locker.clone();
        let id2 = id.clone();
        tokio::spawn(async move {
            let _ = locker2.lock(&id2, Duration::from_secs(8), Duration::from_millis(500)).await;
        });

        tokio::time::timeout(Duration::from_millis(200), notified.notified())
            .await
            .expect("holder should observe a release request");
        first.unlock().await;
    }
}
