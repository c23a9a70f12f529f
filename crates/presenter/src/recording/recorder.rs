use std::sync::Arc;
use std::time::Duration;

use parley_collab::{AudioAsset, AudioCapture, CollabError, TelemetryEvent, TelemetryStream};
use snafu::{ResultExt, Snafu};

use super::state::{
    GestureEvent, Point, RecordingEffect, RecordingRejection, RecordingState, cancel_opacity,
    lock_indicator_offset,
};
use crate::observe::Observable;
use crate::settings::RecordingSettings;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RecordingError {
    #[snafu(display("recording event rejected on `{stage}`: {rejection:?}"))]
    Rejected {
        stage: &'static str,
        rejection: RecordingRejection,
    },
    #[snafu(display("audio capture failed on `{stage}`: {source}"))]
    Capture {
        stage: &'static str,
        source: CollabError,
    },
    #[snafu(display("audio playback failed on `{stage}`: {source}"))]
    Playback {
        stage: &'static str,
        source: CollabError,
    },
}

pub type RecordingResult<T> = Result<T, RecordingError>;

/// Data accumulated for the session between press and confirm/discard.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordingSession {
    pub state: RecordingState,
    pub duration: Duration,
    pub waveform: Vec<f32>,
    pub asset: Option<AudioAsset>,
    pub playback_position: Duration,
}

/// A confirmed recording, ready to be attached to the outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub asset: AudioAsset,
    pub duration: Duration,
    pub waveform: Vec<f32>,
}

/// Render-ready view of the recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSnapshot {
    pub state: RecordingState,
    pub location: Point,
    pub duration: Duration,
    pub waveform: Vec<f32>,
    pub playback_position: Duration,
    pub cancel_opacity: f32,
    pub lock_indicator_offset: f32,
    pub has_pending_asset: bool,
}

impl RecordingSnapshot {
    fn of(session: &RecordingSession, settings: &RecordingSettings) -> Self {
        let location = session.state.location();
        Self {
            state: session.state.clone(),
            location,
            duration: session.duration,
            waveform: session.waveform.clone(),
            playback_position: session.playback_position,
            cancel_opacity: cancel_opacity(location, settings),
            lock_indicator_offset: lock_indicator_offset(location, settings),
            has_pending_asset: session.asset.is_some(),
        }
    }
}

/// Drives [`RecordingState`] and carries out its effects against the audio subsystem.
///
/// One recorder belongs to one composer. Dropping it tears the session down.
pub struct VoiceRecorder {
    capture: Arc<dyn AudioCapture>,
    settings: RecordingSettings,
    session: RecordingSession,
    telemetry: Option<TelemetryStream>,
    snapshots: Observable<RecordingSnapshot>,
}

impl VoiceRecorder {
    pub fn new(capture: Arc<dyn AudioCapture>, settings: RecordingSettings) -> Self {
        let settings = settings.normalized();
        let session = RecordingSession::default();
        let snapshots = Observable::new(RecordingSnapshot::of(&session, &settings));
        Self {
            capture,
            settings,
            session,
            telemetry: None,
            snapshots,
        }
    }

    pub fn state(&self) -> &RecordingState {
        &self.session.state
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn snapshot(&self) -> RecordingSnapshot {
        self.snapshots.current()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<RecordingSnapshot> {
        self.snapshots.subscribe()
    }

    /// Applies one gesture or command and performs the resulting effects.
    ///
    /// Returns the finished recording when the event confirmed a stopped session. A
    /// capture failure ends the session and leaves the recorder idle.
    pub async fn handle(
        &mut self,
        event: GestureEvent,
    ) -> RecordingResult<Option<FinishedRecording>> {
        let transition = match self.session.state.apply(&event, &self.settings) {
            Ok(transition) => transition,
            Err(rejection) => {
                tracing::warn!(?event, ?rejection, "recording event rejected");
                return RejectedSnafu {
                    stage: "apply-gesture",
                    rejection,
                }
                .fail();
            }
        };

        if transition.next != self.session.state {
            tracing::debug!(
                from = ?self.session.state,
                to = ?transition.next,
                effects = ?transition.effects,
                "recording state changed"
            );
        }
        self.session.state = transition.next;

        let mut handed_off = None;
        for effect in transition.effects {
            match self.run_effect(effect).await {
                Ok(Some(recording)) => handed_off = Some(recording),
                Ok(None) => {}
                Err(error) => {
                    if matches!(error, RecordingError::Capture { .. }) {
                        tracing::warn!(%error, "audio capture failed; ending recording session");
                        self.fail_session(effect, error.to_string());
                    }
                    self.publish();
                    return Err(error);
                }
            }
        }

        if !self.session.state.is_active() {
            self.clear_session();
        }
        self.publish();
        Ok(handed_off)
    }

    /// Folds pending telemetry into the session. Returns whether anything changed.
    pub fn poll_telemetry(&mut self) -> bool {
        let Some(stream) = self.telemetry.as_mut() else {
            return false;
        };

        let mut changed = false;
        while let Some(event) = stream.try_recv() {
            match event {
                TelemetryEvent::Capture { duration, level }
                    if self.session.state.is_capturing() =>
                {
                    self.session.duration = duration;
                    self.session.waveform.push(level);
                    changed = true;
                }
                TelemetryEvent::Playback { position, playing }
                    if matches!(self.session.state, RecordingState::Stopped { .. }) =>
                {
                    self.session.playback_position = position;
                    if !playing && self.session.state.is_playing() {
                        self.session.state = RecordingState::Stopped { playing: false };
                    }
                    changed = true;
                }
                TelemetryEvent::Capture { .. } | TelemetryEvent::Playback { .. } => {}
            }
        }

        if changed {
            self.publish();
        }
        changed
    }

    /// Releases every resource the session holds and returns to idle.
    ///
    /// Call when the conversation closes or the composer disappears.
    pub fn teardown(&mut self) {
        let transition = self
            .session
            .state
            .apply(&GestureEvent::Teardown, &self.settings);
        if let Ok(transition) = transition {
            for effect in transition.effects {
                self.release(effect);
            }
        }
        self.session.state = RecordingState::Idle;
        self.clear_session();
        self.publish();
        tracing::debug!("voice recorder torn down");
    }

    async fn run_effect(
        &mut self,
        effect: RecordingEffect,
    ) -> RecordingResult<Option<FinishedRecording>> {
        match effect {
            RecordingEffect::StartCapture => {
                self.session.duration = Duration::ZERO;
                self.session.waveform.clear();
                self.telemetry = Some(self.capture.subscribe_telemetry());
                self.capture.start_capture().context(CaptureSnafu {
                    stage: "start-capture",
                })?;
            }
            RecordingEffect::StopCapture => {
                let asset = self.capture.stop_capture().await.context(CaptureSnafu {
                    stage: "stop-capture",
                })?;
                // The finalized asset is authoritative over live telemetry.
                self.session.duration = self.session.duration.max(asset.duration);
                if !asset.waveform.is_empty() {
                    self.session.waveform = asset.waveform.clone();
                }
                self.session.playback_position = Duration::ZERO;
                self.session.asset = Some(asset);
            }
            RecordingEffect::StartPlayback => {
                let Some(asset) = self.session.asset.as_ref() else {
                    self.session.state = RecordingState::Stopped { playing: false };
                    return Ok(None);
                };
                if let Err(source) = self.capture.start_playback(asset) {
                    self.session.state = RecordingState::Stopped { playing: false };
                    return Err(source).context(PlaybackSnafu {
                        stage: "start-playback",
                    });
                }
            }
            RecordingEffect::HandOff => {
                let Some(asset) = self.session.asset.take() else {
                    tracing::warn!("confirmed recording has no asset");
                    return Ok(None);
                };
                tracing::info!(
                    asset_id = %asset.id,
                    duration_ms = self.session.duration.as_millis() as u64,
                    "voice recording handed off"
                );
                return Ok(Some(FinishedRecording {
                    asset,
                    duration: self.session.duration,
                    waveform: std::mem::take(&mut self.session.waveform),
                }));
            }
            RecordingEffect::ShowTip => {
                tracing::debug!("press too short; showing hold-to-record tip");
            }
            RecordingEffect::AbortCapture
            | RecordingEffect::DeleteAsset
            | RecordingEffect::PausePlayback => self.release(effect),
        }
        Ok(None)
    }

    /// Best-effort cleanup; failures are logged and never block the transition.
    fn release(&mut self, effect: RecordingEffect) {
        let outcome = match effect {
            RecordingEffect::AbortCapture => {
                self.telemetry = None;
                self.capture.abort_capture()
            }
            RecordingEffect::PausePlayback => self.capture.pause_playback(),
            RecordingEffect::DeleteAsset => match self.session.asset.take() {
                Some(asset) => self.capture.delete_asset(&asset),
                None => Ok(()),
            },
            RecordingEffect::StartCapture
            | RecordingEffect::StopCapture
            | RecordingEffect::HandOff
            | RecordingEffect::ShowTip
            | RecordingEffect::StartPlayback => Ok(()),
        };
        if let Err(error) = outcome {
            tracing::warn!(?effect, %error, "recording cleanup failed");
        }
    }

    /// Releases everything after `failed` could not reach the device.
    fn fail_session(&mut self, failed: RecordingEffect, reason: String) {
        let mut cleanup = self
            .session
            .state
            .apply(&GestureEvent::CaptureFailed { reason }, &self.settings)
            .map(|transition| transition.effects)
            .unwrap_or_default();
        // A capture that failed to start or stop may still hold the microphone.
        let touched_device = matches!(
            failed,
            RecordingEffect::StartCapture | RecordingEffect::StopCapture
        );
        if touched_device && !cleanup.contains(&RecordingEffect::AbortCapture) {
            cleanup.insert(0, RecordingEffect::AbortCapture);
        }
        for effect in cleanup {
            self.release(effect);
        }
        self.session.state = RecordingState::Idle;
        self.clear_session();
    }

    /// Drops per-session data but keeps terminal states such as `ShowingTip`.
    fn clear_session(&mut self) {
        let state = if self.session.state.is_resting() {
            self.session.state.clone()
        } else {
            RecordingState::Idle
        };
        self.telemetry = None;
        self.session = RecordingSession {
            state,
            ..RecordingSession::default()
        };
    }

    fn publish(&mut self) {
        self.snapshots
            .publish(RecordingSnapshot::of(&self.session, &self.settings));
    }
}

impl Drop for VoiceRecorder {
    fn drop(&mut self) {
        if self.session.state.is_active() {
            self.teardown();
        }
    }
}
