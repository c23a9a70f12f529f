use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use super::error::{
    AssetMissingSnafu, CaptureNotRunningSnafu, CaptureUnavailableSnafu, CollabResult,
    NoActiveQuerySnafu, PlaybackFailedSnafu, SearchFailedSnafu,
};
use super::ids::AssetId;
use super::types::{AudioAsset, SearchHit, SearchQuery, TelemetryEvent};
use super::{AudioCapture, BoxFuture, MessageSearch, TelemetryStream, telemetry_channel};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Fixtures never leave state half-written, so a poisoned lock is still usable.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SearchState {
    corpus: Vec<SearchHit>,
    matches: Vec<SearchHit>,
    cursor: usize,
    active: bool,
    pending_failures: usize,
}

/// Paged search over a fixed corpus of hits.
#[derive(Debug, Clone)]
pub struct InMemorySearch {
    state: Arc<Mutex<SearchState>>,
    page_size: usize,
    issued: Arc<AtomicUsize>,
}

impl InMemorySearch {
    pub fn new(corpus: Vec<SearchHit>, page_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SearchState {
                corpus,
                ..SearchState::default()
            })),
            page_size: page_size.max(1),
            issued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of fetches handed out so far, counted when the future is created.
    pub fn issued_requests(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Makes the next `count` fetches resolve with `SearchFailed`.
    pub fn fail_next(&self, count: usize) {
        lock(&self.state).pending_failures = count;
    }

    /// Appends hits to the corpus; they become visible to the next `search`.
    pub fn push_hits(&self, hits: impl IntoIterator<Item = SearchHit>) {
        lock(&self.state).corpus.extend(hits);
    }

    fn take_failure(state: &mut SearchState, stage: &'static str) -> CollabResult<()> {
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return SearchFailedSnafu {
                stage,
                details: "injected failure".to_string(),
            }
            .fail();
        }
        Ok(())
    }

    fn next_page(state: &mut SearchState, page_size: usize) -> Vec<SearchHit> {
        let start = state.cursor.min(state.matches.len());
        let end = (start + page_size).min(state.matches.len());
        state.cursor = end;
        state.matches[start..end].to_vec()
    }
}

impl MessageSearch for InMemorySearch {
    fn search(&self, query: SearchQuery) -> BoxFuture<'static, CollabResult<Vec<SearchHit>>> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        let page_size = self.page_size;

        Box::pin(async move {
            let mut state = lock(&state);
            Self::take_failure(&mut state, "in-memory-search")?;
            state.matches = state
                .corpus
                .iter()
                .filter(|hit| query.matches(hit))
                .cloned()
                .collect();
            state.cursor = 0;
            state.active = true;
            Ok(Self::next_page(&mut state, page_size))
        })
    }

    fn load_next_page(&self) -> BoxFuture<'static, CollabResult<Vec<SearchHit>>> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        let page_size = self.page_size;

        Box::pin(async move {
            let mut state = lock(&state);
            Self::take_failure(&mut state, "in-memory-load-next-page")?;
            if !state.active {
                return NoActiveQuerySnafu {
                    stage: "in-memory-load-next-page",
                }
                .fail();
            }
            Ok(Self::next_page(&mut state, page_size))
        })
    }
}

/// Call log entry recorded by [`InMemoryCapture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureCall {
    Start,
    Pause,
    Stop,
    Abort,
    Delete(AssetId),
    StartPlayback(AssetId),
    PausePlayback,
}

#[derive(Debug, Default)]
struct CaptureState {
    calls: Vec<CaptureCall>,
    capturing: bool,
    samples: Vec<(Duration, f32)>,
    live_assets: HashSet<AssetId>,
    telemetry: Option<mpsc::UnboundedSender<TelemetryEvent>>,
    unavailable: Option<String>,
    stop_failure: Option<String>,
    playback_failure: Option<String>,
}

/// Scriptable audio subsystem that keeps assets in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl InMemoryCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `start_capture` fail as if the microphone were missing.
    pub fn make_unavailable(&self, details: impl Into<String>) {
        lock(&self.state).unavailable = Some(details.into());
    }

    /// Makes the next `stop_capture` fail while the device keeps recording.
    pub fn fail_next_stop(&self, details: impl Into<String>) {
        lock(&self.state).stop_failure = Some(details.into());
    }

    /// Makes the next `start_playback` fail.
    pub fn fail_next_playback(&self, details: impl Into<String>) {
        lock(&self.state).playback_failure = Some(details.into());
    }

    pub fn calls(&self) -> Vec<CaptureCall> {
        lock(&self.state).calls.clone()
    }

    pub fn is_capturing(&self) -> bool {
        lock(&self.state).capturing
    }

    pub fn live_asset_count(&self) -> usize {
        lock(&self.state).live_assets.len()
    }

    /// Feeds one waveform sample as the device would while capturing.
    pub fn emit_capture_sample(&self, duration: Duration, level: f32) {
        let mut state = lock(&self.state);
        if !state.capturing {
            return;
        }
        state.samples.push((duration, level));
        if let Some(sender) = &state.telemetry {
            let _ = sender.send(TelemetryEvent::Capture { duration, level });
        }
    }

    pub fn emit_playback_progress(&self, position: Duration, playing: bool) {
        if let Some(sender) = &lock(&self.state).telemetry {
            let _ = sender.send(TelemetryEvent::Playback { position, playing });
        }
    }
}

impl AudioCapture for InMemoryCapture {
    fn start_capture(&self) -> CollabResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(CaptureCall::Start);
        if let Some(details) = state.unavailable.clone() {
            return CaptureUnavailableSnafu {
                stage: "in-memory-start-capture",
                details,
            }
            .fail();
        }
        state.capturing = true;
        state.samples.clear();
        Ok(())
    }

    fn pause_capture(&self) -> CollabResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(CaptureCall::Pause);
        if !state.capturing {
            return CaptureNotRunningSnafu {
                stage: "in-memory-pause-capture",
            }
            .fail();
        }
        Ok(())
    }

    fn stop_capture(&self) -> BoxFuture<'static, CollabResult<AudioAsset>> {
        lock(&self.state).calls.push(CaptureCall::Stop);
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            let mut state = lock(&state);
            if !state.capturing {
                return CaptureNotRunningSnafu {
                    stage: "in-memory-stop-capture",
                }
                .fail();
            }
            if let Some(details) = state.stop_failure.take() {
                return CaptureUnavailableSnafu {
                    stage: "in-memory-stop-capture",
                    details,
                }
                .fail();
            }
            state.capturing = false;

            let id = AssetId::new_v7();
            let duration = state
                .samples
                .last()
                .map(|(duration, _)| *duration)
                .unwrap_or_default();
            let waveform = state.samples.drain(..).map(|(_, level)| level).collect();
            state.live_assets.insert(id.clone());

            Ok(AudioAsset {
                location: format!("memory://voice/{id}.aac"),
                id,
                duration,
                waveform,
            })
        })
    }

    fn abort_capture(&self) -> CollabResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(CaptureCall::Abort);
        state.capturing = false;
        state.samples.clear();
        Ok(())
    }

    fn delete_asset(&self, asset: &AudioAsset) -> CollabResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(CaptureCall::Delete(asset.id.clone()));
        if !state.live_assets.remove(&asset.id) {
            return AssetMissingSnafu {
                stage: "in-memory-delete-asset",
                asset_id: asset.id.to_string(),
            }
            .fail();
        }
        Ok(())
    }

    fn start_playback(&self, asset: &AudioAsset) -> CollabResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(CaptureCall::StartPlayback(asset.id.clone()));
        if let Some(details) = state.playback_failure.take() {
            return PlaybackFailedSnafu {
                stage: "in-memory-start-playback",
                details,
            }
            .fail();
        }
        if !state.live_assets.contains(&asset.id) {
            return AssetMissingSnafu {
                stage: "in-memory-start-playback",
                asset_id: asset.id.to_string(),
            }
            .fail();
        }
        Ok(())
    }

    fn pause_playback(&self) -> CollabResult<()> {
        lock(&self.state).calls.push(CaptureCall::PausePlayback);
        Ok(())
    }

    fn subscribe_telemetry(&self) -> TelemetryStream {
        let (sender, stream) = telemetry_channel();
        lock(&self.state).telemetry = Some(sender);
        stream
    }
}
