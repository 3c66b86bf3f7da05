//! Dependency-injection seam for durable side effects.
//!
//! The manager itself never persists anything. Whenever a stream changes
//! durable state it hands an owned snapshot to the injector, always with
//! no registry locks held, and surfaces whatever the injector returns.

use async_trait::async_trait;

use crate::models::{ActiveStream, StreamSnapshot};

/// External collaborator that records stream facts durably (document
/// store updates, per-donor statistics). Implementations must be
/// thread-safe.
#[async_trait]
pub trait Injector: Send + Sync {
    /// A stream just returned to the inactive set. `stream` carries the
    /// quiescent durable fields, `session` the finished checkout.
    async fn deactivate_stream_service(
        &self,
        stream: &StreamSnapshot,
        session: &ActiveStream,
    ) -> anyhow::Result<()>;

    /// A stream became eligible for assignment again.
    async fn enable_stream_service(&self, _stream: &StreamSnapshot) -> anyhow::Result<()> {
        Ok(())
    }

    /// A stream was pulled from assignment rotation.
    async fn disable_stream_service(&self, _stream: &StreamSnapshot) -> anyhow::Result<()> {
        Ok(())
    }
}
