//! Distributed lock coordinator (§4.2).
//!
//! `Locker` is the per-ID exclusive-lease contract the protocol engine
//! drives directly. Its acquire/extend/handover/keep-alive machinery is
//! factored on top of a small [`LeaseBackend`] trait so the same state
//! machine can in principle sit atop any backend (in-process map, or a
//! distributed store such as redis/etcd) — but per §1 only the in-process
//! backend ([`local::LocalLocker`]) is concretely implemented here; a
//! distributed `LeaseBackend` is an out-of-scope integration left to the
//! deployer.

pub mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::LockError;
use crate::model::UploadId;

/// The minimal operations a lease store must provide. `try_acquire` and
/// `extend` are both "fails if someone else already holds it" — contention
/// is expressed as `Ok(false)`, not an error; only genuine backend failures
/// (network, serialization) are `Err`.
#[async_trait]
pub trait LeaseBackend: Send + Sync {
    /// Attempts to acquire a fresh lease for `id` with the given TTL.
    /// Returns `true` if acquired, `false` if already held elsewhere.
    async fn try_acquire(&self, id: &UploadId, ttl: Duration) -> Result<bool, LockError>;

    /// Extends an already-held lease. Returns `false` if the lease was lost
    /// (e.g. expired before this call) — the caller must treat that as an
    /// involuntary release and abort its operation.
    async fn extend(&self, id: &UploadId, ttl: Duration) -> Result<bool, LockError>;

    /// Releases a held lease. Best-effort: "already released" is not an
    /// error (§4.2 "Failure semantics").
    async fn release(&self, id: &UploadId) -> Result<(), LockError>;
}

/// A held lock lease. Dropping it without calling [`Lock::unlock`] still
/// cancels the keep-alive task (via `CancellationToken`), but does not
/// release the backend lease early — callers should always call `unlock`.
pub struct Lock {
    pub(crate) id: UploadId,
    pub(crate) keep_alive_cancel: CancellationToken,
    pub(crate) release_requested: Arc<Notify>,
    pub(crate) locker: Arc<dyn LockerInner>,
}

impl Lock {
    /// A future that resolves when another node has requested this lease be
    /// released (§4.2 cooperative handover). The caller should race this
    /// against its in-flight work and, on firing, abort and call `unlock`.
    pub fn release_requested(&self) -> Arc<Notify> {
        self.release_requested.clone()
    }

    /// Releases the lease and notifies any waiter performing a handover.
    pub async fn unlock(self) {
        self.keep_alive_cancel.cancel();
        self.locker.unlock(&self.id).await;
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.id
    }
}

/// Internal trait object boundary so `Lock::unlock` doesn't need to be
/// generic over the concrete `Locker` implementation.
#[async_trait]
pub(crate) trait LockerInner: Send + Sync {
    async fn unlock(&self, id: &UploadId);
}

/// The contract the protocol engine drives: acquire a per-ID exclusive
/// lease, optionally registering a callback invoked when another node
/// requests cooperative handover.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Blocks until the lease is acquired or `timeout` elapses. While held,
    /// a background task extends the lease at `ttl / 2` intervals; if an
    /// extension fails, the lease is considered lost and
    /// `lock.release_requested()` fires so the holder can abort quickly
    /// (§4.2 "Liveness").
    async fn lock(
        &self,
        id: &UploadId,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Lock, LockError>;
}
