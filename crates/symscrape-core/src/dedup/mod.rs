pub mod markers;
pub mod missing;
pub mod remote;

pub use markers::{open_marker_store, DirMarkerStore, MarkerStore, MemoryMarkerStore};
pub use missing::{fetch_missing_symbols, FeedSource, HttpFeedSource, MissingSymbolSet};
pub use remote::{HttpSymbolStore, SymbolStore};

use std::sync::Arc;
use tracing::debug;

use crate::symbols::SymbolKey;

/// Why a symbol is not worth collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Filtering on the missing-symbols feed and the symbol is not listed.
    NotMissing,
    LocalMarker,
    OnServer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    New,
    /// Treated as new because the marker store or the server could not be
    /// asked.
    Unverified,
    Skip(SkipReason),
}

impl Verdict {
    pub fn is_new(self) -> bool {
        matches!(self, Verdict::New | Verdict::Unverified)
    }
}

/// Decides whether a symbol still needs to be collected.
///
/// Checks run in order and stop at the first that proves the symbol known:
/// the missing-symbols filter, the local marker store, then the remote
/// store. Each check is optional. Read-only, so one oracle is shared by all
/// workers.
#[derive(Default, Clone)]
pub struct DedupOracle {
    missing: Option<MissingSymbolSet>,
    markers: Option<Arc<dyn MarkerStore>>,
    store: Option<Arc<dyn SymbolStore>>,
}

impl DedupOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only symbols listed in `missing` can be new. `None` disables the filter.
    pub fn with_missing(mut self, missing: Option<MissingSymbolSet>) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_markers(mut self, markers: Option<Arc<dyn MarkerStore>>) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_store(mut self, store: Option<Arc<dyn SymbolStore>>) -> Self {
        self.store = store;
        self
    }

    pub fn markers(&self) -> Option<&Arc<dyn MarkerStore>> {
        self.markers.as_ref()
    }

    pub fn is_new(&self, key: &SymbolKey) -> bool {
        self.check(key).is_new()
    }

    /// Marker read failures count as "not marked" and probe failures as "not
    /// on the server"; either makes the verdict [`Verdict::Unverified`].
    pub fn check(&self, key: &SymbolKey) -> Verdict {
        let mut verdict = Verdict::New;

        if let Some(missing) = &self.missing {
            if !missing.contains(key) {
                return Verdict::Skip(SkipReason::NotMissing);
            }
        }

        if let Some(markers) = &self.markers {
            match markers.contains(key) {
                Ok(true) => return Verdict::Skip(SkipReason::LocalMarker),
                Ok(false) => {}
                Err(err) => {
                    debug!("Can't read marker for {}: {}", key, err);
                    verdict = Verdict::Unverified;
                }
            }
        }

        if let Some(store) = &self.store {
            match store.exists(key) {
                Ok(true) => return Verdict::Skip(SkipReason::OnServer),
                Ok(false) => {}
                Err(err) => {
                    debug!("Can't check server for {}: {}", key, err);
                    verdict = Verdict::Unverified;
                }
            }
        }

        verdict
    }
}
