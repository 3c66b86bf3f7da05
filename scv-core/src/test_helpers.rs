//! Test helpers and fixtures for scv-core tests
//!
//! Shared fixtures, id shorthands, and a recording injector used by both
//! the unit tests and the integration suite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::ManagerConfig;
use crate::models::{
    ActiveStream, Stream, StreamId, StreamSnapshot, StreamStatus, TargetId,
};
use crate::service::{Injector, Manager};

/// Create a test stream ID
pub fn test_stream_id(id: &str) -> StreamId {
    StreamId::from_string(id.to_string())
}

/// Create a test target ID
pub fn test_target_id(id: &str) -> TargetId {
    TargetId::from_string(id.to_string())
}

/// A fresh enabled stream with zero counters
pub fn test_stream(stream_id: &str, target_id: &str) -> Stream {
    StreamFixture::new()
        .with_stream_id(test_stream_id(stream_id))
        .with_target_id(test_target_id(target_id))
        .build()
}

/// A manager wired to a [`RecordingInjector`] and the default
/// twenty-minute expiration window
pub fn test_manager() -> (Arc<Manager>, Arc<RecordingInjector>) {
    let injector = Arc::new(RecordingInjector::default());
    let manager = Manager::new(
        Arc::clone(&injector) as Arc<dyn Injector>,
        &ManagerConfig::default(),
    );
    (manager, injector)
}

/// Test fixture builder for Stream
pub struct StreamFixture {
    stream_id: StreamId,
    target_id: TargetId,
    owner: String,
    frames: u64,
    error_count: u32,
    status: StreamStatus,
}

impl StreamFixture {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stream_id: StreamId::new(),
            target_id: TargetId::new(),
            owner: "test_owner".to_string(),
            frames: 0,
            error_count: 0,
            status: StreamStatus::Enabled,
        }
    }

    #[must_use]
    pub fn with_stream_id(mut self, stream_id: StreamId) -> Self {
        self.stream_id = stream_id;
        self
    }

    #[must_use]
    pub fn with_target_id(mut self, target_id: TargetId) -> Self {
        self.target_id = target_id;
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    #[must_use]
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    #[must_use]
    pub fn with_error_count(mut self, error_count: u32) -> Self {
        self.error_count = error_count;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: StreamStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn build(self) -> Stream {
        Stream::restore(
            self.stream_id,
            self.target_id,
            self.owner,
            self.frames,
            self.error_count,
            Utc::now(),
            self.status,
        )
    }
}

impl Default for StreamFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Injector that records every notification it receives.
///
/// `fail_next` arms a single injected failure for the next deactivation,
/// for exercising the error path.
#[derive(Default)]
pub struct RecordingInjector {
    pub deactivations: Mutex<Vec<(StreamSnapshot, ActiveStream)>>,
    pub enables: Mutex<Vec<StreamSnapshot>>,
    pub disables: Mutex<Vec<StreamSnapshot>>,
    fail_next: AtomicBool,
}

impl RecordingInjector {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Injector for RecordingInjector {
    async fn deactivate_stream_service(
        &self,
        stream: &StreamSnapshot,
        session: &ActiveStream,
    ) -> anyhow::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("injected deactivation failure");
        }
        self.deactivations
            .lock()
            .await
            .push((stream.clone(), session.clone()));
        Ok(())
    }

    async fn enable_stream_service(&self, stream: &StreamSnapshot) -> anyhow::Result<()> {
        self.enables.lock().await.push(stream.clone());
        Ok(())
    }

    async fn disable_stream_service(&self, stream: &StreamSnapshot) -> anyhow::Result<()> {
        self.disables.lock().await.push(stream.clone());
        Ok(())
    }
}

/// Injector that ignores everything.
pub struct NullInjector;

#[async_trait]
impl Injector for NullInjector {
    async fn deactivate_stream_service(
        &self,
        _stream: &StreamSnapshot,
        _session: &ActiveStream,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
