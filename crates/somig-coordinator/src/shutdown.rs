//! Cooperative cancellation shared by the coordinator and its runners.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

const DEFAULT_REASON: &str = "cancelled";

/// A cancellation token that remembers why it was triggered.
///
/// The first reason wins; later triggers only cancel.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
    parent_reason: Option<Arc<OnceLock<String>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle that is triggered along with `self` but can also
    /// be triggered on its own without affecting `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            reason: Arc::new(OnceLock::new()),
            parent_reason: Some(Arc::clone(&self.reason)),
        }
    }

    pub fn trigger(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once [`trigger`](Self::trigger) has been called.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    pub fn reason(&self) -> String {
        self.reason
            .get()
            .or_else(|| self.parent_reason.as_ref().and_then(|parent| parent.get()))
            .cloned()
            .unwrap_or_else(|| DEFAULT_REASON.to_string())
    }
}
