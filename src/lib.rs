//! A modular, resumable upload server implementing the tus 1.0 protocol.
//!
//! The crate is organized around four collaborating components:
//! [`storage`] (persists upload bytes and metadata), [`lock`] (serializes
//! concurrent writers per upload), [`hooks`] (dispatches lifecycle events to
//! external policy) and [`handler`] (the protocol engine that ties the three
//! together behind a transport-agnostic request/response contract).
//! [`composer`] records, once at startup, which optional capabilities the
//! chosen backends actually provide.

pub mod composer;
pub mod concat;
pub mod config;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod lock;
pub mod metadata;
pub mod model;
pub mod storage;

mod http_types;

pub use composer::Composer;
pub use config::{ConfigBuilder, TusdConfig};
pub use error::{TusError, TusResult};
pub use handler::Handler;
pub use http_types::{BodyReader, IncomingRequest, OutgoingResponse};
pub use model::{FileInfo, MetaData, UploadId};
