//! Metadata-fetch registration boundary.
//!
//! When a round announcement carries a usable content identifier, the
//! round handler registers an asynchronous fetch for the metadata
//! document. Retrieval itself is an external collaborator; the core
//! only fires the registration and never consumes the result.

use tracing::info;

/// Fire-and-forget registration of a metadata fetch by content
/// identifier.
pub trait MetadataSink {
    /// Registers a fetch for the document identified by `cid`.
    fn register(&self, cid: &str);
}

/// Sink that drops registrations. Default for replays that do not care
/// about metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetadataSink for NoopSink {
    fn register(&self, _cid: &str) {}
}

/// Sink that logs registrations, used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetadataSink for TracingSink {
    fn register(&self, cid: &str) {
        info!(cid, "registered round metadata fetch");
    }
}

/// Sink that records registrations in order, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    registered: std::cell::RefCell<Vec<String>>,
}

impl RecordingSink {
    /// Returns the content identifiers registered so far.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.registered.borrow().clone()
    }
}

impl MetadataSink for RecordingSink {
    fn register(&self, cid: &str) {
        self.registered.borrow_mut().push(cid.to_string());
    }
}
