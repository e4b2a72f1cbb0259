use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::trace;

use crate::error::Error;
use crate::symbols::SymbolKey;

/// The content-addressed symbol store, keyed by [`SymbolKey::archive_path`].
pub trait SymbolStore: Send + Sync {
    /// `Err` means the store could not be asked, not that the file is absent.
    fn exists(&self, key: &SymbolKey) -> Result<bool, Error>;
}

/// Probes a symbol server over HTTP with metadata-only `HEAD` requests.
pub struct HttpSymbolStore {
    client: Client,
    base: Url,
}

impl HttpSymbolStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Other(format!("Invalid symbol server URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Other(format!(
                "Symbol server URL {} cannot be a base",
                base_url
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn object_url(&self, key: &SymbolKey) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend([&key.debug_file, &key.debug_id, &key.symbol_file_name()]);
        }
        url
    }
}

impl SymbolStore for HttpSymbolStore {
    fn exists(&self, key: &SymbolKey) -> Result<bool, Error> {
        let url = self.object_url(key);
        let status = self.client.head(url.clone()).send()?.status();
        trace!("HEAD {} -> {}", url, status);
        Ok(status == StatusCode::OK)
    }
}
