//! Where recorded reconcile state lives between runs.

use async_trait::async_trait;

use super::types::ReconcileState;
use crate::error::Result;

/// Persists the [`ReconcileState`] that seeds the next apply's hints.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state.
    ///
    /// Returns `None` if nothing has been recorded yet.
    async fn load(&self) -> Result<Option<ReconcileState>>;

    /// Replaces the recorded state.
    async fn save(&self, state: &ReconcileState) -> Result<()>;

    /// Forgets every recorded resource.
    async fn delete(&self) -> Result<()>;

    /// Checks if any state has been recorded.
    async fn exists(&self) -> Result<bool>;

    /// Human-readable location of the state, for messages.
    fn describe(&self) -> String;

    /// Loads the state, starting from an empty one when none is recorded.
    async fn load_or_default(&self) -> Result<ReconcileState> {
        Ok(self.load().await?.unwrap_or_default())
    }
}
