use bandit_core::{BanditError, LoadState, SessionDescriptor, Site, Variant};
use std::sync::Arc;

/// How the current variant was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionSource {
    /// Override passed by the caller.
    Explicit,
    /// `select` field of the site document.
    Site,
    /// Chosen by the named selection algorithm.
    Algorithm(String),
    /// Nothing matched; the invariant variant was used instead of `requested`.
    Fallback { requested: String },
}

/// Immutable snapshot of a client's lifecycle. Each transition publishes a
/// new snapshot; holders of an older one never see it change.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub state: LoadState,
    pub error: Option<Arc<BanditError>>,
    pub site: Option<Arc<Site>>,
    pub variant: Option<Variant>,
    pub selection: Option<SelectionSource>,
    pub session: Option<SessionDescriptor>,
}

impl ClientState {
    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    pub fn site_name(&self) -> Option<&str> {
        self.site.as_deref().map(|s| s.name.as_str())
    }

    pub fn variant_name(&self) -> Option<&str> {
        self.variant.as_ref().map(|v| v.name.as_str())
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.selection, Some(SelectionSource::Fallback { .. }))
    }
}
