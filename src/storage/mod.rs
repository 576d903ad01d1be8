//! The storage backend abstraction (§4.1).
//!
//! `DataStore` is the required contract every backend implements. The four
//! optional extensions (`Terminater`, `Concater`, `LengthDeclarer`,
//! `ContentServer`) are separate traits a backend may or may not implement;
//! the [`crate::composer::Composer`] records which ones a given backend
//! instance actually provides at construction time, so the engine never has
//! to downcast a trait object mid-request (§9).

pub mod filesystem;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::http_types::BodyReader;
use crate::model::FileInfo;

/// Required contract for every storage backend.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Persists `info`, assigning any storage-specific fields (e.g. a
    /// filesystem path) and returning the finalized record. Durable: once
    /// this returns, `get_info(info.id)` succeeds from any process sharing
    /// the same storage.
    async fn new_upload(&self, info: FileInfo) -> Result<FileInfo, StorageError>;

    /// Resolves `id` to its current, durable `FileInfo`.
    async fn get_info(&self, id: &str) -> Result<FileInfo, StorageError>;

    /// Appends bytes read from `reader` starting at `offset`, which MUST
    /// equal the upload's current durable offset. Returns the number of
    /// bytes actually committed, which may be less than the reader
    /// produced (client disconnect, truncated body) — in which case the
    /// backend's durable offset is advanced by exactly that many bytes,
    /// never more.
    async fn write_chunk(
        &self,
        id: &str,
        offset: u64,
        reader: BodyReader,
    ) -> Result<u64, StorageError>;

    /// A reader over bytes `0..offset` of the payload.
    async fn get_reader(&self, id: &str) -> Result<BodyReader, StorageError>;

    /// Invoked once the durable offset reaches the declared size. The
    /// default implementation does nothing; backends that need to flush or
    /// seal storage override this.
    async fn finish_upload(&self, _id: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Optional: the backend can permanently remove an upload's payload and
/// metadata. Missing files are tolerated (`Terminate` is idempotent).
#[async_trait]
pub trait Terminater: Send + Sync {
    async fn terminate(&self, id: &str) -> Result<(), StorageError>;
}

/// Optional: the backend can assemble a final upload's payload from a
/// sequence of completed partial uploads.
#[async_trait]
pub trait Concater: Send + Sync {
    /// `parts` are the partials' current `FileInfo`s, in concatenation
    /// order; every one must already satisfy `offset == size`.
    async fn concat_uploads(&self, id: &str, parts: &[FileInfo]) -> Result<(), StorageError>;
}

/// Optional: the backend can set a deferred upload's size after creation.
#[async_trait]
pub trait LengthDeclarer: Send + Sync {
    /// Sets `size` when the upload is still `size_is_deferred`, flipping
    /// that flag off. Invalid if the durable offset already exceeds `size`.
    async fn declare_length(&self, id: &str, size: u64) -> Result<(), StorageError>;
}

/// Optional: the backend can serve payload bytes directly (e.g. range-aware
/// downloads). Backends without a specialized implementation can still be
/// read via `DataStore::get_reader`; this trait exists purely so the
/// Composer can advertise the capability distinctly from plain readability.
pub trait ContentServer: Send + Sync {}
