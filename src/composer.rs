//! Constructor-time capability advertisement (§4.5, §9).
//!
//! `Composer` is built once at startup from whatever concrete backends the
//! deployer chooses, and handed to the [`crate::handler::Handler`] by
//! reference. Capability presence is recorded here — never discovered by
//! downcasting a trait object mid-request (§9 "Dynamic dispatch on backend
//! capabilities").

use std::sync::Arc;

use crate::storage::{Concater, ContentServer, DataStore, LengthDeclarer, Terminater};

/// Registered backend capabilities. Each field is `Some` iff the backend
/// passed to [`Composer::new`] implements that optional trait.
pub struct Composer {
    pub store: Arc<dyn DataStore>,
    terminater: Option<Arc<dyn Terminater>>,
    concater: Option<Arc<dyn Concater>>,
    length_declarer: Option<Arc<dyn LengthDeclarer>>,
    content_server: bool,
}

impl Composer {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            terminater: None,
            concater: None,
            length_declarer: None,
            content_server: false,
        }
    }

    pub fn with_terminater(mut self, terminater: Arc<dyn Terminater>) -> Self {
        self.terminater = Some(terminater);
        self
    }

    pub fn with_concater(mut self, concater: Arc<dyn Concater>) -> Self {
        self.concater = Some(concater);
        self
    }

    pub fn with_length_declarer(mut self, declarer: Arc<dyn LengthDeclarer>) -> Self {
        self.length_declarer = Some(declarer);
        self
    }

    pub fn with_content_server(mut self, supported: bool) -> Self {
        self.content_server = supported;
        self
    }

    pub fn terminater(&self) -> Option<&Arc<dyn Terminater>> {
        self.terminater.as_ref()
    }

    pub fn concater(&self) -> Option<&Arc<dyn Concater>> {
        self.concater.as_ref()
    }

    pub fn length_declarer(&self) -> Option<&Arc<dyn LengthDeclarer>> {
        self.length_declarer.as_ref()
    }

    pub fn supports_content_serving(&self) -> bool {
        self.content_server
    }

    /// The `Tus-Extension` header value, built from currently registered
    /// capabilities (§4.4 OPTIONS, §6).
    pub fn tus_extension_header(&self) -> String {
        let mut extensions = Vec::new();
        if self.terminater.is_some() {
            extensions.push("termination");
        }
        if self.concater.is_some() {
            extensions.push("concatenation");
        }
        if self.length_declarer.is_some() {
            extensions.push("creation-defer-length");
        }
        extensions.push("creation");
        extensions.join(",")
    }
}

/// Convenience constructor for the common case: a single backend value
/// that implements every optional trait (e.g. [`crate::storage::filesystem::FilesystemStore`]).
pub fn compose_uniform_backend<S>(store: Arc<S>) -> Composer
where
    S: DataStore + Terminater + Concater + LengthDeclarer + ContentServer + 'static,
{
    Composer::new(store.clone() as Arc<dyn DataStore>)
        .with_terminater(store.clone() as Arc<dyn Terminater>)
        .with_concater(store.clone() as Arc<dyn Concater>)
        .with_length_declarer(store.clone() as Arc<dyn LengthDeclarer>)
        .with_content_server(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::filesystem::FilesystemStore;

    #[tokio::test]
    async fn uniform_backend_advertises_all_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FilesystemStore::new(dir.path()).await.unwrap());
        let composer = compose_uniform_backend(store);

        assert!(composer.terminater().is_some());
        assert!(composer.concater().is_some());
        assert!(composer.length_declarer().is_some());
        assert!(composer.supports_content_serving());
        let ext = composer.tus_extension_header();
        assert!(ext.contains("termination"));
        assert!(ext.contains("concatenation"));
        assert!(ext.contains("creation-defer-length"));
    }
}
