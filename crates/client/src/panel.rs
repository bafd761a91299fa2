//! Coordination of the floating chat panels.
//!
//! On small screens only one floating panel may be open at a time. That
//! used to be ambient global state; here it has a single owner both
//! widgets hold a handle to, so each can be tested in isolation.
//! Process-lifetime only: construction is the reset.

use tokio::sync::watch;

/// Identifier of a floating panel ("messenger", "group-chat", ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelId(String);

impl PanelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PanelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Owner of the "which floating panel is open" state. Cheap to clone; all
/// clones share the same slot.
#[derive(Clone)]
pub struct PanelCoordinator {
    open: std::sync::Arc<watch::Sender<Option<PanelId>>>,
}

impl PanelCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            open: std::sync::Arc::new(tx),
        }
    }

    /// Open a panel, implicitly closing whichever one was open.
    pub fn open(&self, id: PanelId) {
        self.open.send_replace(Some(id));
    }

    /// Close `id` if it is the open panel; closing a panel that is not
    /// open is a no-op.
    pub fn close(&self, id: &PanelId) {
        self.open.send_if_modified(|current| {
            if current.as_ref() == Some(id) {
                *current = None;
                true
            } else {
                false
            }
        });
    }

    pub fn is_open(&self, id: &PanelId) -> bool {
        self.open.borrow().as_ref() == Some(id)
    }

    pub fn current(&self) -> Option<PanelId> {
        self.open.borrow().clone()
    }

    /// Watch for changes; widgets re-render from this.
    pub fn watch(&self) -> watch::Receiver<Option<PanelId>> {
        self.open.subscribe()
    }
}

impl Default for PanelCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
