//! Stream records: the leaf data unit the manager custodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::id::{StreamId, TargetId};
use super::token::AuthToken;

/// Persistence status mirrored to the document store.
///
/// A disabled stream stays registered and keeps its place in the target's
/// inactive set, but is skipped by activation selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Enabled,
    Disabled,
}

impl StreamStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Frame accounting failures, surfaced through the closure contract.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("stream is not checked out to a core")]
    NotActive,
    #[error("frame payload duplicates the previous digest")]
    DuplicateFrame,
}

/// Session record attached to a stream while a core holds it.
///
/// Created by activation, detached by deactivation or removal. Mutated
/// only under the owning stream's write lock.
#[derive(Debug, Clone)]
pub struct ActiveStream {
    pub auth_token: AuthToken,
    pub user: String,
    pub engine: String,
    pub start_time: DateTime<Utc>,
    /// Frames contributed by this donor, including partial frames.
    pub donor_frames: f64,
    /// Frames accumulated since the last checkpoint.
    pub buffer_frames: u64,
    /// Digest of the last accepted frame payload, for retry dedup.
    pub frame_hash: Option<String>,
}

impl ActiveStream {
    #[must_use]
    pub fn new(auth_token: AuthToken, user: String, engine: String) -> Self {
        Self {
            auth_token,
            user,
            engine,
            start_time: Utc::now(),
            donor_frames: 0.0,
            buffer_frames: 0,
            frame_hash: None,
        }
    }
}

/// Mutable stream fields. Only reachable through the owning stream's
/// lock; manager closures receive a reference to this.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub frames: u64,
    pub error_count: u32,
    pub creation_date: DateTime<Utc>,
    pub status: StreamStatus,
    pub(crate) active: Option<ActiveStream>,
}

impl StreamState {
    #[must_use]
    pub fn active(&self) -> Option<&ActiveStream> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active_mut(&mut self) -> Option<&mut ActiveStream> {
        self.active.as_mut()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn take_active(&mut self) -> Option<ActiveStream> {
        self.active.take()
    }

    /// Accept one frame payload into the checkout's buffer.
    ///
    /// A digest equal to the previous one means the core retried a send
    /// that already landed; the frame is rejected instead of counted twice.
    pub fn buffer_frame(&mut self, digest: &str) -> Result<(), FrameError> {
        let session = self.active.as_mut().ok_or(FrameError::NotActive)?;
        if session.frame_hash.as_deref() == Some(digest) {
            return Err(FrameError::DuplicateFrame);
        }
        session.frame_hash = Some(digest.to_string());
        session.buffer_frames += 1;
        Ok(())
    }

    /// Fold the buffered frames into the durable total and credit the
    /// donor with `donor_frames` (fractional frames allowed).
    pub fn commit_checkpoint(&mut self, donor_frames: f64) -> Result<(), FrameError> {
        let session = self.active.as_mut().ok_or(FrameError::NotActive)?;
        self.frames += session.buffer_frames;
        session.donor_frames += donor_frames;
        session.buffer_frames = 0;
        Ok(())
    }
}

/// One trajectory's in-memory record.
///
/// Identity fields never change after construction and are safe to read
/// without taking the lock.
#[derive(Debug)]
pub struct Stream {
    stream_id: StreamId,
    target_id: TargetId,
    owner: String,
    pub(crate) state: RwLock<StreamState>,
}

impl Stream {
    /// A freshly created stream: zero frames, enabled, created now.
    #[must_use]
    pub fn new(stream_id: StreamId, target_id: TargetId, owner: String) -> Self {
        Self::restore(
            stream_id,
            target_id,
            owner,
            0,
            0,
            Utc::now(),
            StreamStatus::Enabled,
        )
    }

    /// Rehydrate a stream from previously persisted fields.
    #[must_use]
    pub fn restore(
        stream_id: StreamId,
        target_id: TargetId,
        owner: String,
        frames: u64,
        error_count: u32,
        creation_date: DateTime<Utc>,
        status: StreamStatus,
    ) -> Self {
        Self {
            stream_id,
            target_id,
            owner,
            state: RwLock::new(StreamState {
                frames,
                error_count,
                creation_date,
                status,
                active: None,
            }),
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    #[must_use]
    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Owned copy of a stream's durable fields, handed to the injector with
/// no locks held.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    pub stream_id: StreamId,
    pub target_id: TargetId,
    pub owner: String,
    pub frames: u64,
    pub error_count: u32,
    pub creation_date: DateTime<Utc>,
    pub status: StreamStatus,
}

impl StreamSnapshot {
    pub(crate) fn capture(stream: &Stream, state: &StreamState) -> Self {
        Self {
            stream_id: stream.stream_id.clone(),
            target_id: stream.target_id.clone(),
            owner: stream.owner.clone(),
            frames: state.frames,
            error_count: state.error_count,
            creation_date: state.creation_date,
            status: state.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_state() -> StreamState {
        let target_id = TargetId::from_string("t".to_string());
        StreamState {
            frames: 5,
            error_count: 0,
            creation_date: Utc::now(),
            status: StreamStatus::Enabled,
            active: Some(ActiveStream::new(
                AuthToken::mint(&target_id),
                "alice".to_string(),
                "engA".to_string(),
            )),
        }
    }

    #[test]
    fn test_buffer_frame_rejects_duplicate_digest() {
        let mut state = active_state();
        state.buffer_frame("abc").unwrap();
        assert_eq!(state.buffer_frame("abc"), Err(FrameError::DuplicateFrame));
        state.buffer_frame("def").unwrap();
        assert_eq!(state.active().unwrap().buffer_frames, 2);
    }

    #[test]
    fn test_buffer_frame_requires_checkout() {
        let mut state = active_state();
        state.take_active();
        assert_eq!(state.buffer_frame("abc"), Err(FrameError::NotActive));
    }

    #[test]
    fn test_commit_checkpoint_folds_buffer() {
        let mut state = active_state();
        state.buffer_frame("a").unwrap();
        state.buffer_frame("b").unwrap();
        state.commit_checkpoint(1.5).unwrap();

        assert_eq!(state.frames, 7);
        let session = state.active().unwrap();
        assert_eq!(session.buffer_frames, 0);
        assert!((session.donor_frames - 1.5).abs() < f64::EPSILON);

        // an empty buffer commits cleanly (checkpoint-only post)
        state.commit_checkpoint(0.25).unwrap();
        assert_eq!(state.frames, 7);
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!(StreamStatus::Enabled.as_str(), "enabled");
        assert_eq!(StreamStatus::Disabled.as_str(), "disabled");
        assert!(StreamStatus::Enabled.is_enabled());
        assert!(!StreamStatus::Disabled.is_enabled());
    }

    #[test]
    fn test_new_stream_defaults() {
        let stream = Stream::new(
            StreamId::from_string("s1".to_string()),
            TargetId::from_string("t1".to_string()),
            "joe".to_string(),
        );
        assert_eq!(stream.stream_id().as_str(), "s1");
        assert_eq!(stream.target_id().as_str(), "t1");
        assert_eq!(stream.owner(), "joe");
    }
}
