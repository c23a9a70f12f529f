#![deny(unsafe_code)]

//! Collaborator boundary for the presentation core.
//!
//! The chat SDK and the platform audio stack live outside this workspace. This crate
//! pins down the value types they hand over and the async traits the core calls into,
//! plus in-memory implementations used by tests and the QA runner.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

pub mod error;
pub mod ids;
pub mod memory;
pub mod types;

pub use error::{CollabError, CollabResult};
pub use ids::{AssetId, AttachmentId, ConversationId, MessageId, UserId};
pub use memory::{CaptureCall, InMemoryCapture, InMemorySearch};
pub use types::{
    AttachmentKind, AudioAsset, ImageAttachment, ListOrder, Message, MessageFlags, MessageList,
    SearchHit, SearchQuery, TelemetryEvent, VideoAttachment,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Paged message search offered by the chat SDK.
///
/// Returned futures own everything they need so the caller can hand them to any
/// executor and marshal the result back onto its own context.
pub trait MessageSearch: Send + Sync {
    /// Starts a new search and resolves with its first page.
    fn search(&self, query: SearchQuery) -> BoxFuture<'static, CollabResult<Vec<SearchHit>>>;
    /// Resolves with the page after the last one delivered for the active query.
    fn load_next_page(&self) -> BoxFuture<'static, CollabResult<Vec<SearchHit>>>;
}

/// Audio capture and playback subsystem.
///
/// Synchronous methods only signal the device and must return immediately.
pub trait AudioCapture: Send + Sync {
    fn start_capture(&self) -> CollabResult<()>;
    fn pause_capture(&self) -> CollabResult<()>;
    /// Finalizes the running capture into an asset.
    fn stop_capture(&self) -> BoxFuture<'static, CollabResult<AudioAsset>>;
    /// Stops the running capture and throws the partial recording away.
    fn abort_capture(&self) -> CollabResult<()>;
    fn delete_asset(&self, asset: &AudioAsset) -> CollabResult<()>;
    fn start_playback(&self, asset: &AudioAsset) -> CollabResult<()>;
    fn pause_playback(&self) -> CollabResult<()>;
    /// Opens a fresh telemetry feed; earlier feeds stop receiving events.
    fn subscribe_telemetry(&self) -> TelemetryStream;
}

/// Receiving half of the live waveform/duration feed.
pub struct TelemetryStream {
    events: mpsc::UnboundedReceiver<TelemetryEvent>,
}

impl TelemetryStream {
    pub fn new(events: mpsc::UnboundedReceiver<TelemetryEvent>) -> Self {
        Self { events }
    }

    pub async fn recv(&mut self) -> Option<TelemetryEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TelemetryEvent> {
        self.events.try_recv().ok()
    }
}

/// Creates a connected telemetry sender/stream pair.
pub fn telemetry_channel() -> (mpsc::UnboundedSender<TelemetryEvent>, TelemetryStream) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (event_tx, TelemetryStream::new(event_rx))
}
