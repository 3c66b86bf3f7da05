//! Per-target bookkeeping: stream sets, token index, heartbeat timers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::models::{ActiveStream, AuthToken, Stream, StreamId, StreamState};

/// Book of one target's streams. Guarded by the owning [`Target`]'s lock;
/// only the manager touches it, with the lock order manager → target →
/// stream.
#[derive(Default)]
pub(crate) struct TargetState {
    /// Streams available for checkout. Ordered by id so selection is
    /// deterministic within a process lifetime; the order itself is not
    /// a contract.
    pub(crate) inactive: BTreeMap<StreamId, Arc<Stream>>,
    /// Streams currently checked out to a core.
    pub(crate) active: HashMap<StreamId, Arc<Stream>>,
    /// Token → stream resolution for the active set.
    pub(crate) tokens: HashMap<AuthToken, Arc<Stream>>,
    /// One heartbeat timer per active stream, cancellable.
    pub(crate) timers: HashMap<StreamId, CancellationToken>,
}

impl TargetState {
    pub(crate) fn stream_total(&self) -> usize {
        self.inactive.len() + self.active.len()
    }

    /// Field-level side effects of leaving the active set: cancel the
    /// heartbeat timer, unbind the token, move the stream back to the
    /// inactive set, and detach the session record.
    ///
    /// Assumes the target and stream write locks are held. Returns `None`
    /// when the stream carries no session, which indicates a broken
    /// token index.
    pub(crate) fn detach_active(
        &mut self,
        stream: &Arc<Stream>,
        state: &mut StreamState,
    ) -> Option<ActiveStream> {
        let session = state.take_active()?;
        self.tokens.remove(&session.auth_token);
        if let Some(timer) = self.timers.remove(stream.stream_id()) {
            timer.cancel();
        }
        self.active.remove(stream.stream_id());
        self.inactive
            .insert(stream.stream_id().clone(), Arc::clone(stream));
        Some(session)
    }
}

/// Grouping of streams sharing one problem definition. Created when its
/// first stream registers, garbage-collected with the last.
pub(crate) struct Target {
    pub(crate) state: RwLock<TargetState>,
}

impl Target {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(TargetState::default()),
        }
    }
}
