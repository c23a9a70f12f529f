//! Hold-to-record voice messages: a pure gesture state machine and the coordinator that
//! drives the audio subsystem from it.

mod recorder;
mod state;

pub use recorder::{
    FinishedRecording, RecordingError, RecordingResult, RecordingSession, RecordingSnapshot,
    VoiceRecorder,
};
pub use state::{
    GestureEvent, Point, RecordingEffect, RecordingRejection, RecordingState,
    RecordingTransition, RecordingTransitionResult, cancel_opacity, lock_indicator_offset,
};
