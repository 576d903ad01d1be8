//! The `FileInfo` data model (§3) and the upload ID type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque, globally unique upload identifier. Server-minted by default
/// (`UploadId::new`); a pre-create hook may supply its own.
pub type UploadId = String;

/// Mints a new server-side upload ID. 32 lowercase hex characters, matching
/// the reference tus server's convention.
pub fn new_upload_id() -> UploadId {
    Uuid::new_v4().simple().to_string()
}

/// Client-supplied metadata, round-tripped verbatim from the
/// `Upload-Metadata` header through to `HEAD` responses.
pub type MetaData = HashMap<String, String>;

/// Persisted alongside the payload bytes for every upload (§3).
///
/// `MetaData`, `is_partial`, `is_final` and `partial_uploads` are set once at
/// creation and never mutated afterwards; only `offset` (via `PatchFile`) and
/// `size`/`size_is_deferred` (via `DeclareLength`, exactly once) change after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    pub id: UploadId,
    pub size: u64,
    pub size_is_deferred: bool,
    pub offset: u64,
    pub metadata: MetaData,
    pub is_partial: bool,
    pub is_final: bool,
    pub partial_uploads: Vec<UploadId>,
    /// Backend-private fields (e.g. filesystem path). Opaque to the engine.
    pub storage: HashMap<String, String>,
}

impl FileInfo {
    /// A freshly-minted, otherwise-empty upload record. Callers fill in
    /// `size`/`size_is_deferred`/`metadata`/concat fields before handing
    /// this to `DataStore::new_upload`.
    pub fn new(id: UploadId) -> Self {
        Self {
            id,
            size: 0,
            size_is_deferred: false,
            offset: 0,
            metadata: MetaData::new(),
            is_partial: false,
            is_final: false,
            partial_uploads: Vec::new(),
            storage: HashMap::new(),
        }
    }

    /// An upload is complete once its durable offset has reached its
    /// declared size and the size is no longer deferred (§3 invariants).
    pub fn is_complete(&self) -> bool {
        !self.size_is_deferred && self.offset >= self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_info_is_incomplete_until_deferred_length_resolved() {
        let mut info = FileInfo::new(new_upload_id());
        info.size_is_deferred = true;
        assert!(!info.is_complete());

        info.size_is_deferred = false;
        info.size = 0;
        assert!(info.is_complete());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_upload_id(), new_upload_id());
    }
}
