//! Target system capability seam.
//!
//! Any system this engine can reconcile against implements the small
//! [`TargetSystem`] capability set; the pipeline is written once against
//! this trait and vendor-specific logic lives entirely behind it. The
//! handle is constructed at invocation start and threaded explicitly
//! through the fetcher and executor, never stored in process-wide state.

mod http;
mod memory;

pub use http::HttpTarget;
pub use memory::MemoryTarget;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{CurrentState, Delta, DesiredState, ResourceIdentity};

/// Capability set a target system must provide.
///
/// `list_candidates` must be read-only; the three mutating calls each
/// perform exactly one logical remote operation (which may internally be
/// several API calls, e.g. create-then-refetch).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TargetSystem: Send + Sync {
    /// Returns the target kind name, for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Lists remote objects that may match the given identity.
    ///
    /// Returning more candidates than actually match is acceptable; the
    /// fetcher applies the exact-match disambiguation rule on top.
    async fn list_candidates(&self, identity: &ResourceIdentity) -> Result<Vec<CurrentState>>;

    /// Creates the resource described by the desired state and returns
    /// the resulting remote state.
    async fn create(&self, desired: &DesiredState) -> Result<CurrentState>;

    /// Applies the delta to the identified resource and returns the
    /// resulting remote state.
    async fn update(&self, id: &str, delta: &Delta) -> Result<CurrentState>;

    /// Deletes the identified resource. Deleting an already-absent
    /// resource is not an error.
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl TargetSystem for Box<dyn TargetSystem> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn list_candidates(&self, identity: &ResourceIdentity) -> Result<Vec<CurrentState>> {
        (**self).list_candidates(identity).await
    }

    async fn create(&self, desired: &DesiredState) -> Result<CurrentState> {
        (**self).create(desired).await
    }

    async fn update(&self, id: &str, delta: &Delta) -> Result<CurrentState> {
        (**self).update(id, delta).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id).await
    }
}
