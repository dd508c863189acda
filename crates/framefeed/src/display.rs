//! Display resources.
//!
//! Fetched payloads are materialized into a [`FrameRegistry`], which hands out
//! locally addressable [`HandleId`]s (`frame:<n>`) in the way a browser hands
//! out object URLs. A [`DisplayHandle`] owns one registry entry and revokes it
//! when dropped, so release happens on every exit path.
//!
//! [`DisplayResourceManager`] keeps at most one handle current and publishes
//! the renderer-facing [`FeedView`] over a `watch` channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::trace;

use crate::frame::{FetchFailure, FrameFormat};

/// Address of a materialized frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HandleId(u64);

impl HandleId {
    /// The numeric part of the address.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// A materialized frame, as seen by a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Address this frame is registered under.
    pub id: HandleId,
    /// Detected image format.
    pub format: FrameFormat,
    /// The encoded image.
    pub data: Bytes,
    /// When the frame was materialized.
    pub materialized_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    live: HashMap<HandleId, Frame>,
    created: u64,
    released: u64,
}

/// Local store of materialized frames.
///
/// Cloning is cheap and every clone refers to the same store.
#[derive(Debug, Clone, Default)]
pub struct FrameRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl FrameRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Materialize `data` into a new live frame.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailure::Decode`] if the payload is not a recognizable
    /// image. Nothing is registered in that case.
    pub fn materialize(&self, data: Bytes) -> std::result::Result<DisplayHandle, FetchFailure> {
        let Some(format) = FrameFormat::sniff(&data) else {
            return Err(FetchFailure::Decode(format!(
                "unrecognized {}-byte payload",
                data.len()
            )));
        };

        let mut inner = self.lock();
        inner.next_id += 1;
        let id = HandleId(inner.next_id);
        inner.created += 1;
        inner.live.insert(
            id,
            Frame {
                id,
                format,
                data,
                materialized_at: Utc::now(),
            },
        );
        trace!(handle = %id, %format, "Materialized frame");

        Ok(DisplayHandle {
            id,
            format,
            registry: self.clone(),
        })
    }

    /// Look up a live frame. Returns `None` once its handle has been released.
    #[must_use]
    pub fn resolve(&self, id: HandleId) -> Option<Frame> {
        self.lock().live.get(&id).cloned()
    }

    /// Number of frames currently live.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Total frames ever materialized.
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.lock().created
    }

    /// Total frames released.
    #[must_use]
    pub fn released_count(&self) -> u64 {
        self.lock().released
    }

    fn revoke(&self, id: HandleId) {
        let mut inner = self.lock();
        if inner.live.remove(&id).is_some() {
            inner.released += 1;
            trace!(handle = %id, "Released frame");
        }
    }
}

/// Owning reference to one live frame. Dropping it releases the frame.
#[derive(Debug)]
pub struct DisplayHandle {
    id: HandleId,
    format: FrameFormat,
    registry: FrameRegistry,
}

impl DisplayHandle {
    /// Address of the frame this handle owns.
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Format of the frame this handle owns.
    #[must_use]
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Release the frame now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.registry.revoke(self.id);
    }
}

/// What a renderer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "handle", rename_all = "snake_case")]
pub enum FeedView {
    /// The session has not been mounted.
    #[default]
    Idle,
    /// Mounted, but no frame has been published yet.
    Loading,
    /// The given frame is current.
    Live(HandleId),
    /// The session has been torn down.
    Stopped,
}

impl FeedView {
    /// The current frame address, if any.
    #[must_use]
    pub fn handle(self) -> Option<HandleId> {
        match self {
            Self::Live(id) => Some(id),
            _ => None,
        }
    }
}

/// Owns the current display handle and the renderer-facing view.
#[derive(Debug)]
pub struct DisplayResourceManager {
    registry: FrameRegistry,
    current: Option<DisplayHandle>,
    view: watch::Sender<FeedView>,
}

impl DisplayResourceManager {
    /// Create a manager that materializes into `registry`.
    #[must_use]
    pub fn new(registry: FrameRegistry) -> Self {
        let (view, _) = watch::channel(FeedView::Idle);
        Self {
            registry,
            current: None,
            view,
        }
    }

    /// Subscribe to view changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.view.subscribe()
    }

    /// The view as of now.
    #[must_use]
    pub fn view(&self) -> FeedView {
        *self.view.borrow()
    }

    /// Address of the current frame, if any.
    #[must_use]
    pub fn current(&self) -> Option<HandleId> {
        self.current.as_ref().map(DisplayHandle::id)
    }

    /// Show the loading state until the first frame arrives.
    pub fn activate(&mut self) {
        if self.current.is_none() {
            self.view.send_replace(FeedView::Loading);
        }
    }

    /// Materialize `data` and make it current, releasing the previous frame.
    ///
    /// The view switches to the new frame before the old one is revoked, so
    /// a subscriber never sees a released handle as current.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailure::Decode`] if `data` is not a displayable image;
    /// the current frame is left untouched.
    pub fn publish(&mut self, data: Bytes) -> std::result::Result<HandleId, FetchFailure> {
        let handle = self.registry.materialize(data)?;
        let id = handle.id();
        let previous = self.current.replace(handle);
        self.view.send_replace(FeedView::Live(id));
        drop(previous);
        Ok(id)
    }

    /// Release the current frame, if any; a no-op otherwise.
    ///
    /// A live view falls back to loading before the handle is revoked. Any
    /// other view is left as it is.
    pub fn release_current(&mut self) {
        let Some(previous) = self.current.take() else {
            return;
        };
        self.view.send_if_modified(|view| {
            if matches!(view, FeedView::Live(_)) {
                *view = FeedView::Loading;
                true
            } else {
                false
            }
        });
        drop(previous);
    }

    /// Mark the view stopped, then release the current frame.
    pub fn close(&mut self) {
        self.view.send_replace(FeedView::Stopped);
        self.release_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::fixtures;

    #[test]
    fn test_handle_id_display() {
        assert_eq!(HandleId(3).to_string(), "frame:3");
        assert_eq!(HandleId(3).get(), 3);
    }

    #[test]
    fn test_materialize_and_resolve() {
        let registry = FrameRegistry::new();
        let handle = registry.materialize(fixtures::jpeg(1)).unwrap();

        let frame = registry.resolve(handle.id()).unwrap();
        assert_eq!(frame.format, FrameFormat::Jpeg);
        assert_eq!(frame.data, fixtures::jpeg(1));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let registry = FrameRegistry::new();
        let handle = registry.materialize(fixtures::jpeg(1)).unwrap();
        let id = handle.id();

        handle.release();
        assert!(registry.resolve(id).is_none());
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.created_count(), 1);
        assert_eq!(registry.released_count(), 1);
    }

    #[test]
    fn test_materialize_rejects_non_image() {
        let registry = FrameRegistry::new();
        let err = registry.materialize(Bytes::from_static(b"oops")).unwrap_err();
        assert!(matches!(err, FetchFailure::Decode(_)));
        assert_eq!(registry.created_count(), 0);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let registry = FrameRegistry::new();
        let first = registry.materialize(fixtures::jpeg(1)).unwrap().id();
        let second = registry.materialize(fixtures::jpeg(2)).unwrap().id();
        assert_ne!(first, second);
    }

    #[test]
    fn test_publish_releases_previous() {
        let registry = FrameRegistry::new();
        let mut manager = DisplayResourceManager::new(registry.clone());

        let h1 = manager.publish(fixtures::jpeg(1)).unwrap();
        assert_eq!(manager.current(), Some(h1));

        let h2 = manager.publish(fixtures::jpeg(2)).unwrap();
        assert_eq!(manager.current(), Some(h2));
        assert_eq!(manager.view(), FeedView::Live(h2));
        assert!(registry.resolve(h1).is_none());
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_publish_decode_failure_keeps_current() {
        let registry = FrameRegistry::new();
        let mut manager = DisplayResourceManager::new(registry.clone());
        let h1 = manager.publish(fixtures::jpeg(1)).unwrap();

        assert!(manager.publish(Bytes::from_static(b"garbage")).is_err());
        assert_eq!(manager.current(), Some(h1));
        assert!(registry.resolve(h1).is_some());
    }

    #[test]
    fn test_release_current_is_idempotent() {
        let registry = FrameRegistry::new();
        let mut manager = DisplayResourceManager::new(registry.clone());
        manager.publish(fixtures::jpeg(1)).unwrap();

        manager.release_current();
        manager.release_current();
        assert!(manager.current().is_none());
        assert_eq!(manager.view(), FeedView::Loading);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.released_count(), 1);
    }

    #[test]
    fn test_activate_and_close() {
        let registry = FrameRegistry::new();
        let mut manager = DisplayResourceManager::new(registry.clone());
        assert_eq!(manager.view(), FeedView::Idle);

        manager.activate();
        assert_eq!(manager.view(), FeedView::Loading);

        manager.publish(fixtures::jpeg(1)).unwrap();
        manager.close();
        assert_eq!(manager.view(), FeedView::Stopped);
        assert!(manager.current().is_none());
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.released_count(), 1);
    }

    #[test]
    fn test_close_never_shows_loading() {
        let registry = FrameRegistry::new();
        let mut manager = DisplayResourceManager::new(registry.clone());
        manager.activate();
        let id = manager.publish(fixtures::jpeg(1)).unwrap();
        let mut rx = manager.subscribe();
        assert_eq!(*rx.borrow_and_update(), FeedView::Live(id));

        manager.close();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), FeedView::Stopped);

        // Releasing after close is a no-op and keeps the stopped view.
        manager.release_current();
        assert!(!rx.has_changed().unwrap());
        assert!(registry.resolve(id).is_none());
    }

    #[test]
    fn test_release_current_without_frame_keeps_view() {
        let registry = FrameRegistry::new();
        let mut manager = DisplayResourceManager::new(registry.clone());
        manager.release_current();
        assert_eq!(manager.view(), FeedView::Idle);
        assert_eq!(registry.released_count(), 0);
    }

    #[test]
    fn test_subscriber_never_sees_released_handle() {
        let registry = FrameRegistry::new();
        let mut manager = DisplayResourceManager::new(registry.clone());
        let rx = manager.subscribe();

        for tag in 0..5 {
            manager.publish(fixtures::jpeg(tag)).unwrap();
            let view = *rx.borrow();
            let id = view.handle().unwrap();
            assert!(registry.resolve(id).is_some());
        }
    }

    #[test]
    fn test_feed_view_serialization() {
        let json = serde_json::to_string(&FeedView::Live(HandleId(4))).unwrap();
        assert_eq!(json, r#"{"state":"live","handle":4}"#);
        let json = serde_json::to_string(&FeedView::Loading).unwrap();
        assert_eq!(json, r#"{"state":"loading"}"#);
    }
}
