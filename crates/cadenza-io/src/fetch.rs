//! Resolving a [`SourceRef`] to encoded bytes.

use std::sync::Arc;

use cadenza_core::SourceRef;

use crate::{Error, Result};

/// Retrieves the encoded bytes behind a source reference.
///
/// Calls block; the engine runs them on a blocking worker thread.
pub trait SourceFetcher: Send + Sync {
    /// Fetch the full encoded payload.
    fn fetch(&self, source: &SourceRef) -> Result<Arc<[u8]>>;
}

/// Reads local files, passes in-memory bytes through and, with the `http`
/// feature, downloads URLs with reqwest.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFetcher;

impl SourceFetcher for DefaultFetcher {
    fn fetch(&self, source: &SourceRef) -> Result<Arc<[u8]>> {
        match source {
            SourceRef::Bytes(bytes) => Ok(Arc::clone(bytes)),
            SourceRef::Path(path) => std::fs::read(path)
                .map(Arc::from)
                .map_err(|e| Error::Fetch(format!("{}: {e}", path.display()))),
            SourceRef::Url(url) => fetch_url(url),
        }
    }
}

#[cfg(feature = "http")]
fn fetch_url(url: &str) -> Result<Arc<[u8]>> {
    let response = reqwest::blocking::get(url)
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| Error::Fetch(format!("{url}: {e}")))?;
    let body = response
        .bytes()
        .map_err(|e| Error::Fetch(format!("{url}: {e}")))?;
    tracing::debug!(url, bytes = body.len(), "fetched remote source");
    Ok(Arc::from(body.as_ref()))
}

#[cfg(not(feature = "http"))]
fn fetch_url(url: &str) -> Result<Arc<[u8]>> {
    Err(Error::Fetch(format!("{url}: built without the `http` feature")))
}
