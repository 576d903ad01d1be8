//! Unified error handling for the protocol engine, storage backends, lock
//! coordinator and hook dispatcher.
//!
//! Every fallible path in this crate eventually collapses into [`TusError`],
//! which carries a fixed mapping to an HTTP status code via
//! [`TusError::status_code`]. Call sites never hand-roll a match on error
//! kind; they construct the appropriate variant and let the engine map it.

use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

/// Top-level error type for all tusd operations.
#[derive(Error, Debug)]
pub enum TusError {
    // --- Client errors (malformed request) ---
    #[error("missing or malformed Upload-Length / Upload-Defer-Length header")]
    InvalidUploadLength,

    #[error("malformed Upload-Offset header")]
    InvalidOffset,

    #[error("malformed Upload-Concat header: {0}")]
    InvalidConcatHeader(String),

    #[error("Content-Type must be application/offset+octet-stream")]
    InvalidContentType,

    #[error("unsupported Tus-Resumable version: {0}")]
    UnsupportedVersion(String),

    #[error("upload size {size} exceeds configured maximum {max}")]
    SizeExceeded { size: u64, max: u64 },

    #[error("a final upload cannot also declare Upload-Length")]
    FinalUploadHasLength,

    #[error("referenced partial upload {id} is not yet complete")]
    UploadNotFinished { id: String },

    #[error("invalid concatenation: {0}")]
    InvalidConcat(String),

    #[error("Upload-Length may only be sent once, while the upload is deferred")]
    LengthAlreadyDeclared,

    // --- Conflict errors ---
    #[error("offset mismatch: request gave {given}, upload is at {actual}")]
    MismatchOffset { given: u64, actual: u64 },

    #[error("upload {id} is final and cannot be modified")]
    ModifyFinal { id: String },

    #[error("lock for upload {id} is held by another writer")]
    LockContention { id: String },

    #[error("timed out waiting for lock on upload {id}")]
    LockTimeout { id: String },

    // --- Not found ---
    #[error("upload {id} does not exist")]
    NotFound { id: String },

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("{0} is not supported by the configured backend")]
    UnsupportedExtension(&'static str),

    #[error("a request body is required")]
    MissingBody,

    #[error("upload stopped by post-receive hook")]
    StoppedByHook,

    // --- Policy rejection (hook-originated) ---
    #[error("rejected by hook: {message}")]
    PolicyRejection {
        status: StatusCode,
        message: String,
        headers: Vec<(String, String)>,
    },

    // --- Transient backend errors ---
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("hook dispatch error: {0}")]
    Hook(#[from] HookError),

    #[error("lock backend error: {0}")]
    LockBackend(String),

    // --- Fatal / configuration ---
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TusError {
    /// The fixed error → status code mapping referenced throughout §7 of the
    /// specification. HEAD responses never carry a body regardless of the
    /// message text returned alongside this code.
    pub fn status_code(&self) -> StatusCode {
        use TusError::*;
        match self {
            InvalidUploadLength
            | InvalidOffset
            | InvalidConcatHeader(_)
            | FinalUploadHasLength
            | UploadNotFinished { .. }
            | InvalidConcat(_)
            | LengthAlreadyDeclared => StatusCode::BAD_REQUEST,

            InvalidContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UnsupportedVersion(_) => StatusCode::PRECONDITION_FAILED,
            SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            MismatchOffset { .. } => StatusCode::CONFLICT,
            ModifyFinal { .. } => StatusCode::FORBIDDEN,
            LockContention { .. } => StatusCode::LOCKED,
            LockTimeout { .. } => StatusCode::LOCKED,

            NotFound { .. } => StatusCode::NOT_FOUND,
            MethodNotAllowed | UnsupportedExtension(_) => StatusCode::METHOD_NOT_ALLOWED,
            MissingBody => StatusCode::BAD_REQUEST,
            StoppedByHook => StatusCode::FORBIDDEN,

            PolicyRejection { status, .. } => *status,

            Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,

            Storage(_) | Hook(_) | LockBackend(_) | Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message surfaced to the client. [`PolicyRejection`] uses the hook's
    /// own body verbatim; everything else uses the `Display` text.
    pub fn client_message(&self) -> String {
        match self {
            TusError::PolicyRejection { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors from a [`crate::storage::DataStore`] implementation.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("upload {id} not found")]
    NotFound { id: String },

    #[error("path {0:?} escapes the configured storage root")]
    PathConfinement(PathBuf),

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("capability {0} is not supported by the configured backend")]
    UnsupportedCapability(&'static str),
}

/// Errors from a [`crate::lock::Locker`]/[`crate::lock::LeaseBackend`].
#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock for {id} is already held")]
    Contention { id: String },

    #[error("timed out acquiring lock for {id}")]
    Timeout { id: String },

    #[error("lease backend error: {0}")]
    Backend(String),
}

/// Errors from a [`crate::hooks::HookHandler`] transport.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("hook transport failed: {0}")]
    Transport(String),

    #[error("hook process exited with status {0}")]
    NonZeroExit(i32),

    #[error("hook response could not be decoded: {0}")]
    Decode(String),

    #[error("hook invocation timed out")]
    Timeout,
}

/// Errors raised while building or validating a [`crate::config::TusdConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
}

pub type TusResult<T> = Result<T, TusError>;
