//! The stream lifecycle manager: concurrent registry and activation engine.
//!
//! The manager owns the authoritative map of which streams exist, which are
//! checked out, who holds them, and when to reclaim them. Locking rules:
//!
//! 1. The lock order is manager → target → stream, always. A task holding a
//!    child lock never reaches up for a parent lock.
//! 2. Holding the manager lock (read or write) means no concurrent stream
//!    creation, deletion, activation, or deactivation can complete under
//!    you. A read lock alone does not protect individual targets or
//!    streams; their own locks must still be taken.
//! 3. Parent locks are dropped while a child lock is still held wherever
//!    a caller-supplied closure runs, so a slow closure (file writes in
//!    the frame path) stalls only its own stream.
//! 4. A target exists in the target map if and only if at least one of its
//!    streams exists in the stream map.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::{Error, Result, TokenFault};
use crate::models::{
    ActiveStream, AuthToken, Stream, StreamId, StreamSnapshot, StreamState, StreamStatus, TargetId,
};

use super::injector::Injector;
use super::target::Target;

/// Active/inactive population of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOccupancy {
    pub active: usize,
    pub inactive: usize,
}

/// The two top-level indexes, guarded together by the manager lock.
#[derive(Default)]
struct Registry {
    targets: HashMap<TargetId, Arc<Target>>,
    streams: HashMap<StreamId, Arc<Stream>>,
}

impl Registry {
    fn target_of(&self, stream: &Stream) -> Result<Arc<Target>> {
        self.targets.get(stream.target_id()).cloned().ok_or_else(|| {
            Error::Internal(format!(
                "stream {} is registered but target {} is not",
                stream.stream_id(),
                stream.target_id()
            ))
        })
    }

    fn target_for_token(&self, token: &AuthToken) -> Result<Arc<Target>> {
        let target_id = token
            .target_prefix()
            .ok_or_else(|| Error::invalid_token(token, TokenFault::Malformed))?;
        self.targets
            .get(&target_id)
            .cloned()
            .ok_or_else(|| Error::invalid_token(token, TokenFault::UnknownTarget))
    }
}

/// Process-wide registry of streams grouped by target.
///
/// Constructed as an `Arc` so heartbeat timers can hold a weak handle
/// back to it; dropping the manager disarms every outstanding timer.
pub struct Manager {
    registry: RwLock<Registry>,
    injector: Arc<dyn Injector>,
    expiration_window: Duration,
    me: Weak<Manager>,
    shutdown_token: CancellationToken,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("expiration_window", &self.expiration_window)
            .finish()
    }
}

impl Manager {
    pub fn new(injector: Arc<dyn Injector>, config: &ManagerConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            registry: RwLock::new(Registry::default()),
            injector,
            expiration_window: config.expiration_window(),
            me: me.clone(),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Register a stream under its target, creating the target if this is
    /// its first stream. The caller must have created the stream's
    /// persistent structures (documents, directories) beforehand.
    pub async fn add_stream(&self, stream: Stream) -> Result<()> {
        let mut registry = self.registry.write().await;
        if registry.streams.contains_key(stream.stream_id()) {
            return Err(Error::AlreadyExists(stream.stream_id().clone()));
        }
        let stream = Arc::new(stream);
        registry
            .streams
            .insert(stream.stream_id().clone(), Arc::clone(&stream));
        let target = Arc::clone(
            registry
                .targets
                .entry(stream.target_id().clone())
                .or_insert_with(|| Arc::new(Target::new())),
        );
        let mut target_state = target.state.write().await;
        debug!(stream = %stream.stream_id(), target = %stream.target_id(), "registered stream");
        target_state
            .inactive
            .insert(stream.stream_id().clone(), stream);
        Ok(())
    }

    /// Unregister a stream immediately. An active stream is detached from
    /// its session first, but the injector is deliberately not notified:
    /// the caller is presumed to be doing a harder teardown.
    pub async fn remove_stream(&self, stream_id: &StreamId) -> Result<()> {
        let mut registry = self.registry.write().await;
        let stream = registry
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(stream_id.clone()))?;
        let target = registry.target_of(&stream)?;
        let mut target_state = target.state.write().await;
        let mut state = stream.state.write().await;

        registry.streams.remove(stream_id);
        if state.is_active() {
            target_state.detach_active(&stream, &mut state);
        }
        target_state.inactive.remove(stream_id);
        info!(stream = %stream_id, "removed stream");
        if target_state.stream_total() == 0 {
            registry.targets.remove(stream.target_id());
            info!(target = %stream.target_id(), "target drained of streams, collected");
        }
        Ok(())
    }

    /// Run `f` with shared access to the stream's mutable fields. The
    /// manager and target locks are released before the closure runs, so
    /// it may be arbitrarily slow; other readers may be concurrent.
    pub async fn read_stream<R, F>(&self, stream_id: &StreamId, f: F) -> Result<R>
    where
        F: FnOnce(&StreamState) -> anyhow::Result<R>,
    {
        let registry = self.registry.read().await;
        let stream = registry
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(stream_id.clone()))?;
        let target = registry.target_of(&stream)?;
        let target_state = target.state.read().await;
        let state = stream.state.read().await;
        drop(target_state);
        drop(registry);
        f(&state).map_err(Error::Closure)
    }

    /// Run `f` with exclusive access to the stream's mutable fields.
    /// Routing is identical to [`read_stream`](Self::read_stream).
    pub async fn modify_stream<R, F>(&self, stream_id: &StreamId, f: F) -> Result<R>
    where
        F: FnOnce(&mut StreamState) -> anyhow::Result<R>,
    {
        let registry = self.registry.read().await;
        let stream = registry
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(stream_id.clone()))?;
        let target = registry.target_of(&stream)?;
        let target_state = target.state.read().await;
        let mut state = stream.state.write().await;
        drop(target_state);
        drop(registry);
        f(&mut state).map_err(Error::Closure)
    }

    /// Run `f` with exclusive access to the stream an activation token
    /// resolves to. The three token faults (malformed, unknown target
    /// prefix, token unknown within the target) come back as distinct
    /// [`TokenFault`] kinds for audit logs.
    pub async fn modify_active_stream<R, F>(&self, token: &AuthToken, f: F) -> Result<R>
    where
        F: FnOnce(&mut StreamState) -> anyhow::Result<R>,
    {
        let registry = self.registry.read().await;
        let target = registry.target_for_token(token)?;
        let target_state = target.state.read().await;
        let stream = target_state
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Error::invalid_token(token, TokenFault::Unregistered))?;
        let mut state = stream.state.write().await;
        drop(target_state);
        drop(registry);
        f(&mut state).map_err(Error::Closure)
    }

    /// Check one of the target's inactive streams out to a core.
    ///
    /// Selection is "any enabled element"; the iteration order of the
    /// inactive set is deterministic but not a contract. Only the manager
    /// read lock plus this target's write lock are held, so activations
    /// against distinct targets proceed in parallel.
    pub async fn activate_stream(
        &self,
        target_id: &TargetId,
        user: &str,
        engine: &str,
    ) -> Result<(AuthToken, StreamId)> {
        let registry = self.registry.read().await;
        let target = registry
            .targets
            .get(target_id)
            .cloned()
            .ok_or_else(|| Error::UnknownTarget(target_id.clone()))?;
        let mut target_state = target.state.write().await;

        let mut selected = None;
        for stream in target_state.inactive.values().rev() {
            let state = stream.state.read().await;
            if state.status.is_enabled() {
                selected = Some(Arc::clone(stream));
                break;
            }
        }
        let stream = selected.ok_or_else(|| Error::TargetDrained(target_id.clone()))?;

        let token = AuthToken::mint(target_id);
        let mut state = stream.state.write().await;
        target_state.inactive.remove(stream.stream_id());
        state.active = Some(ActiveStream::new(
            token.clone(),
            user.to_string(),
            engine.to_string(),
        ));
        target_state
            .active
            .insert(stream.stream_id().clone(), Arc::clone(&stream));
        target_state.tokens.insert(token.clone(), Arc::clone(&stream));
        target_state
            .timers
            .insert(stream.stream_id().clone(), self.arm_heartbeat(token.clone()));

        debug!(
            stream = %stream.stream_id(),
            target = %target_id,
            user,
            engine,
            "activated stream"
        );
        Ok((token, stream.stream_id().clone()))
    }

    /// Return an active stream to the inactive set, then notify the
    /// injector with no locks held. The injector's error is the
    /// operation's error.
    pub async fn deactivate_stream(&self, token: &AuthToken) -> Result<()> {
        let registry = self.registry.read().await;
        let target = registry.target_for_token(token)?;
        let mut target_state = target.state.write().await;
        let stream = target_state
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Error::invalid_token(token, TokenFault::Unregistered))?;
        let mut state = stream.state.write().await;
        let session = target_state
            .detach_active(&stream, &mut state)
            .ok_or_else(|| {
                Error::Internal(format!("token {token} indexed a stream with no session"))
            })?;
        let snapshot = StreamSnapshot::capture(&stream, &state);
        drop(state);
        drop(target_state);
        drop(registry);

        debug!(stream = %snapshot.stream_id, target = %snapshot.target_id, "deactivated stream");
        self.injector
            .deactivate_stream_service(&snapshot, &session)
            .await
            .map_err(Error::Injector)
    }

    /// Re-arm an active stream's heartbeat timer for a fresh expiration
    /// window. No other state changes.
    pub async fn reset_active_stream(&self, token: &AuthToken) -> Result<()> {
        let registry = self.registry.read().await;
        let target = registry.target_for_token(token)?;
        let mut target_state = target.state.write().await;
        let stream = target_state
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Error::invalid_token(token, TokenFault::Unregistered))?;
        if let Some(timer) = target_state.timers.remove(stream.stream_id()) {
            timer.cancel();
        }
        target_state
            .timers
            .insert(stream.stream_id().clone(), self.arm_heartbeat(token.clone()));
        debug!(stream = %stream.stream_id(), "heartbeat timer reset");
        Ok(())
    }

    /// Make a stream eligible for assignment again, clearing its error
    /// count, then notify the injector with no locks held.
    pub async fn enable_stream(&self, stream_id: &StreamId) -> Result<()> {
        let snapshot = self
            .flip_status(stream_id, StreamStatus::Enabled, true)
            .await?;
        self.injector
            .enable_stream_service(&snapshot)
            .await
            .map_err(Error::Injector)
    }

    /// Pull a stream from assignment rotation. An active checkout runs to
    /// completion; the stream is simply never selected again until
    /// re-enabled.
    pub async fn disable_stream(&self, stream_id: &StreamId) -> Result<()> {
        let snapshot = self
            .flip_status(stream_id, StreamStatus::Disabled, false)
            .await?;
        self.injector
            .disable_stream_service(&snapshot)
            .await
            .map_err(Error::Injector)
    }

    async fn flip_status(
        &self,
        stream_id: &StreamId,
        status: StreamStatus,
        reset_errors: bool,
    ) -> Result<StreamSnapshot> {
        let registry = self.registry.read().await;
        let stream = registry
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(stream_id.clone()))?;
        let target = registry.target_of(&stream)?;
        let target_state = target.state.read().await;
        let mut state = stream.state.write().await;
        drop(target_state);
        drop(registry);

        state.status = status;
        if reset_errors {
            state.error_count = 0;
        }
        info!(stream = %stream_id, status = status.as_str(), "stream status changed");
        Ok(StreamSnapshot::capture(&stream, &state))
    }

    /// Owned copies of every session record currently checked out of the
    /// target.
    pub async fn active_streams(&self, target_id: &TargetId) -> Result<Vec<ActiveStream>> {
        let registry = self.registry.read().await;
        let target = registry
            .targets
            .get(target_id)
            .cloned()
            .ok_or_else(|| Error::UnknownTarget(target_id.clone()))?;
        let target_state = target.state.read().await;
        let mut sessions = Vec::with_capacity(target_state.tokens.len());
        for stream in target_state.tokens.values() {
            let state = stream.state.read().await;
            if let Some(session) = state.active() {
                sessions.push(session.clone());
            }
        }
        Ok(sessions)
    }

    /// Number of registered streams, active and inactive.
    pub async fn stream_count(&self) -> usize {
        self.registry.read().await.streams.len()
    }

    /// Number of live targets.
    pub async fn target_count(&self) -> usize {
        self.registry.read().await.targets.len()
    }

    pub async fn target_occupancy(&self, target_id: &TargetId) -> Result<TargetOccupancy> {
        let registry = self.registry.read().await;
        let target = registry
            .targets
            .get(target_id)
            .cloned()
            .ok_or_else(|| Error::UnknownTarget(target_id.clone()))?;
        let target_state = target.state.read().await;
        Ok(TargetOccupancy {
            active: target_state.active.len(),
            inactive: target_state.inactive.len(),
        })
    }

    /// Disarm every outstanding heartbeat timer. Meant for process
    /// teardown; the registry itself is left intact and armed timers
    /// become inert rather than firing late deactivations.
    pub fn shutdown(&self) {
        info!("manager shutting down, cancelling heartbeat timers");
        self.shutdown_token.cancel();
    }

    /// Spawn the one-shot heartbeat task for a fresh checkout. The task
    /// holds only a weak manager handle; if the token loses the race with
    /// an explicit deactivation, the resulting invalid-token error is
    /// discarded.
    fn arm_heartbeat(&self, token: AuthToken) -> CancellationToken {
        let cancel = self.shutdown_token.child_token();
        let timer = cancel.clone();
        let window = self.expiration_window;
        let manager = self.me.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep(window) => {
                    let Some(manager) = manager.upgrade() else { return };
                    match manager.deactivate_stream(&token).await {
                        Ok(()) => {
                            debug!(token = %token, "heartbeat window elapsed, stream reclaimed");
                        }
                        Err(err) if err.is_invalid_token() => {}
                        Err(err) => {
                            warn!(token = %token, error = %err, "timer-driven deactivation failed");
                        }
                    }
                }
            }
        });
        cancel
    }
}
