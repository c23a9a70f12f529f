use std::time::Duration;

use crate::settings::RecordingSettings;

/// Drag location relative to the initial press point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Self = Self::new(0.0, 0.0);

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Voice recording lifecycle for one composer.
///
/// `pressed_at` and every event timestamp are offsets on the caller's monotonic clock.
///
/// `Idle`, `ShowingTip` and `Cancelled` are resting states: no session exists and the
/// next press arms a new one. A release before the arm delay rests in `ShowingTip` so
/// the UI can show the hold-to-record hint; see [`RecordingState::is_resting`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    /// A press ended before the arm delay; the UI shows the hold-to-record hint.
    ShowingTip,
    Armed {
        pressed_at: Duration,
        location: Point,
    },
    Recording {
        pressed_at: Duration,
        location: Point,
    },
    Locked,
    Stopped {
        playing: bool,
    },
    Cancelled,
}

/// Input for the recording lifecycle, produced by the gesture layer and the composer.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureEvent {
    Press { at: Duration },
    Drag { at: Duration, location: Point },
    /// Arm timer check; the owner schedules one at `pressed_at + arm_delay`.
    Tick { at: Duration },
    Release { at: Duration },
    StopTap,
    Confirm,
    Discard,
    TogglePlayback,
    /// Conversation closed or view disappeared.
    Teardown,
    CaptureFailed { reason: String },
}

/// Work the coordinator performs against the audio subsystem after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingEffect {
    StartCapture,
    StopCapture,
    AbortCapture,
    DeleteAsset,
    HandOff,
    ShowTip,
    StartPlayback,
    PausePlayback,
}

/// Rejection reason for events that make no sense in the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingRejection {
    /// A locked or stopped recording must be confirmed or discarded first.
    SessionPending { state: RecordingState },
    NotLocked { state: RecordingState },
    NothingToConfirm { state: RecordingState },
    NothingToDiscard { state: RecordingState },
    PlaybackUnavailable { state: RecordingState },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingTransition {
    pub next: RecordingState,
    pub effects: Vec<RecordingEffect>,
}

impl RecordingTransition {
    fn to(next: RecordingState, effects: Vec<RecordingEffect>) -> Self {
        Self { next, effects }
    }

    fn stay(state: &RecordingState) -> Self {
        Self::to(state.clone(), Vec::new())
    }
}

pub type RecordingTransitionResult = Result<RecordingTransition, RecordingRejection>;

impl RecordingState {
    /// True while a session exists (anything between press and confirm/discard).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Armed { .. } | Self::Recording { .. } | Self::Locked | Self::Stopped { .. }
        )
    }

    /// True when no session exists and a press would start one.
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Idle | Self::ShowingTip | Self::Cancelled)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Recording { .. } | Self::Locked)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Stopped { playing: true })
    }

    /// Last drag location while the finger is still down, origin otherwise.
    pub fn location(&self) -> Point {
        match self {
            Self::Armed { location, .. } | Self::Recording { location, .. } => *location,
            Self::Idle
            | Self::ShowingTip
            | Self::Locked
            | Self::Stopped { .. }
            | Self::Cancelled => Point::ORIGIN,
        }
    }

    /// Applies one event deterministically.
    ///
    /// Finger events that do not apply to the current state are ignored; explicit
    /// commands (`StopTap`, `Confirm`, `Discard`, `TogglePlayback`) are rejected instead.
    pub fn apply(
        &self,
        event: &GestureEvent,
        settings: &RecordingSettings,
    ) -> RecordingTransitionResult {
        match event {
            GestureEvent::Press { at } => self.apply_press(*at),
            GestureEvent::Drag { at, location } => Ok(self.apply_drag(*at, *location, settings)),
            GestureEvent::Tick { at } => Ok(self.apply_tick(*at, settings)),
            GestureEvent::Release { at } => Ok(self.apply_release(*at, settings)),
            GestureEvent::StopTap => self.apply_stop_tap(),
            GestureEvent::Confirm => self.apply_confirm(),
            GestureEvent::Discard => self.apply_discard(),
            GestureEvent::TogglePlayback => self.apply_toggle_playback(),
            GestureEvent::Teardown => Ok(self.apply_teardown()),
            GestureEvent::CaptureFailed { .. } => Ok(self.apply_capture_failed()),
        }
    }

    fn apply_press(&self, at: Duration) -> RecordingTransitionResult {
        match self {
            Self::Idle | Self::ShowingTip | Self::Cancelled => Ok(RecordingTransition::to(
                Self::Armed {
                    pressed_at: at,
                    location: Point::ORIGIN,
                },
                Vec::new(),
            )),
            Self::Armed { .. } | Self::Recording { .. } => Ok(RecordingTransition::stay(self)),
            Self::Locked | Self::Stopped { .. } => Err(RecordingRejection::SessionPending {
                state: self.clone(),
            }),
        }
    }

    fn apply_drag(
        &self,
        at: Duration,
        location: Point,
        settings: &RecordingSettings,
    ) -> RecordingTransition {
        let past_lock = location.y < settings.lock_offset;
        match self {
            Self::Armed { .. } if past_lock => {
                RecordingTransition::to(Self::Locked, vec![RecordingEffect::StartCapture])
            }
            Self::Armed { pressed_at, .. } if armed_long_enough(*pressed_at, at, settings) => {
                RecordingTransition::to(
                    Self::Recording {
                        pressed_at: *pressed_at,
                        location,
                    },
                    vec![RecordingEffect::StartCapture],
                )
            }
            Self::Armed { pressed_at, .. } => RecordingTransition::to(
                Self::Armed {
                    pressed_at: *pressed_at,
                    location,
                },
                Vec::new(),
            ),
            Self::Recording { .. } if past_lock => {
                RecordingTransition::to(Self::Locked, Vec::new())
            }
            Self::Recording { pressed_at, .. } => RecordingTransition::to(
                Self::Recording {
                    pressed_at: *pressed_at,
                    location,
                },
                Vec::new(),
            ),
            // Locked stops following the finger.
            Self::Idle
            | Self::ShowingTip
            | Self::Locked
            | Self::Stopped { .. }
            | Self::Cancelled => RecordingTransition::stay(self),
        }
    }

    fn apply_tick(&self, at: Duration, settings: &RecordingSettings) -> RecordingTransition {
        match self {
            Self::Armed {
                pressed_at,
                location,
            } if armed_long_enough(*pressed_at, at, settings) => RecordingTransition::to(
                Self::Recording {
                    pressed_at: *pressed_at,
                    location: *location,
                },
                vec![RecordingEffect::StartCapture],
            ),
            _ => RecordingTransition::stay(self),
        }
    }

    fn apply_release(&self, at: Duration, settings: &RecordingSettings) -> RecordingTransition {
        match self {
            Self::Armed { pressed_at, .. } if !armed_long_enough(*pressed_at, at, settings) => {
                RecordingTransition::to(Self::ShowingTip, vec![RecordingEffect::ShowTip])
            }
            // The arm tick was missed; act as if it fired right before the release.
            Self::Armed {
                pressed_at,
                location,
            } => {
                let recording = Self::Recording {
                    pressed_at: *pressed_at,
                    location: *location,
                };
                let mut transition = recording.apply_release(at, settings);
                transition.effects.insert(0, RecordingEffect::StartCapture);
                transition
            }
            Self::Recording { pressed_at, .. } if !armed_long_enough(*pressed_at, at, settings) => {
                RecordingTransition::to(
                    Self::ShowingTip,
                    vec![RecordingEffect::AbortCapture, RecordingEffect::ShowTip],
                )
            }
            Self::Recording { location, .. } if location.x < settings.cancel_offset => {
                RecordingTransition::to(Self::Cancelled, vec![RecordingEffect::AbortCapture])
            }
            Self::Recording { .. } => RecordingTransition::to(
                Self::Stopped { playing: false },
                vec![RecordingEffect::StopCapture],
            ),
            Self::Idle
            | Self::ShowingTip
            | Self::Locked
            | Self::Stopped { .. }
            | Self::Cancelled => RecordingTransition::stay(self),
        }
    }

    fn apply_stop_tap(&self) -> RecordingTransitionResult {
        match self {
            Self::Locked => Ok(RecordingTransition::to(
                Self::Stopped { playing: false },
                vec![RecordingEffect::StopCapture],
            )),
            _ => Err(RecordingRejection::NotLocked {
                state: self.clone(),
            }),
        }
    }

    fn apply_confirm(&self) -> RecordingTransitionResult {
        match self {
            Self::Stopped { playing } => {
                let mut effects = Vec::new();
                if *playing {
                    effects.push(RecordingEffect::PausePlayback);
                }
                effects.push(RecordingEffect::HandOff);
                Ok(RecordingTransition::to(Self::Idle, effects))
            }
            _ => Err(RecordingRejection::NothingToConfirm {
                state: self.clone(),
            }),
        }
    }

    fn apply_discard(&self) -> RecordingTransitionResult {
        match self {
            Self::Locked => Ok(RecordingTransition::to(
                Self::Idle,
                vec![RecordingEffect::AbortCapture],
            )),
            Self::Stopped { .. } => Ok(RecordingTransition::to(Self::Idle, self.release_effects())),
            _ => Err(RecordingRejection::NothingToDiscard {
                state: self.clone(),
            }),
        }
    }

    fn apply_toggle_playback(&self) -> RecordingTransitionResult {
        match self {
            Self::Stopped { playing: true } => Ok(RecordingTransition::to(
                Self::Stopped { playing: false },
                vec![RecordingEffect::PausePlayback],
            )),
            Self::Stopped { playing: false } => Ok(RecordingTransition::to(
                Self::Stopped { playing: true },
                vec![RecordingEffect::StartPlayback],
            )),
            _ => Err(RecordingRejection::PlaybackUnavailable {
                state: self.clone(),
            }),
        }
    }

    fn apply_teardown(&self) -> RecordingTransition {
        RecordingTransition::to(Self::Idle, self.release_effects())
    }

    fn apply_capture_failed(&self) -> RecordingTransition {
        RecordingTransition::to(Self::Idle, self.release_effects())
    }

    /// Effects that free every resource the current state holds.
    fn release_effects(&self) -> Vec<RecordingEffect> {
        match self {
            Self::Recording { .. } | Self::Locked => vec![RecordingEffect::AbortCapture],
            Self::Stopped { playing: true } => {
                vec![RecordingEffect::PausePlayback, RecordingEffect::DeleteAsset]
            }
            Self::Stopped { playing: false } => vec![RecordingEffect::DeleteAsset],
            Self::Idle | Self::ShowingTip | Self::Armed { .. } | Self::Cancelled => Vec::new(),
        }
    }
}

fn armed_long_enough(pressed_at: Duration, at: Duration, settings: &RecordingSettings) -> bool {
    at.saturating_sub(pressed_at) >= settings.arm_delay()
}

/// Opacity of the recording row while the finger slides towards cancel.
pub fn cancel_opacity(location: Point, settings: &RecordingSettings) -> f32 {
    if location.x >= settings.cancel_fade_start {
        return 1.0;
    }
    (1.0 - location.x / settings.cancel_offset).clamp(0.0, 1.0)
}

/// Vertical offset of the lock indicator; it rises with the finger up to its maximum.
pub fn lock_indicator_offset(location: Point, settings: &RecordingSettings) -> f32 {
    if location.y > 0.0 {
        return settings.lock_indicator_initial_offset;
    }
    (settings.lock_indicator_initial_offset + location.y).max(settings.lock_indicator_max_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn run(events: &[GestureEvent]) -> (RecordingState, Vec<RecordingEffect>) {
        let settings = RecordingSettings::default();
        let mut state = RecordingState::Idle;
        let mut effects = Vec::new();
        for event in events {
            let transition = state.apply(event, &settings).expect("accepted event");
            effects.extend(transition.effects);
            state = transition.next;
        }
        (state, effects)
    }

    #[test]
    fn quick_tap_shows_tip_and_never_records() {
        let (state, effects) = run(&[
            GestureEvent::Press { at: ms(0) },
            GestureEvent::Tick { at: ms(200) },
            GestureEvent::Release { at: ms(300) },
        ]);

        assert_eq!(state, RecordingState::ShowingTip);
        assert_eq!(effects, vec![RecordingEffect::ShowTip]);
        assert!(state.is_resting());
        assert!(!state.is_active());

        let settings = RecordingSettings::default();
        let again = state
            .apply(&GestureEvent::Press { at: ms(1_000) }, &settings)
            .expect("tip accepts a new press");
        assert!(matches!(again.next, RecordingState::Armed { .. }));
    }

    #[test]
    fn held_press_records_and_lock_survives_returning_drag() {
        let (state, effects) = run(&[
            GestureEvent::Press { at: ms(0) },
            GestureEvent::Tick { at: ms(500) },
            GestureEvent::Drag {
                at: ms(700),
                location: Point::new(0.0, -80.0),
            },
            GestureEvent::Drag {
                at: ms(900),
                location: Point::ORIGIN,
            },
            GestureEvent::Release { at: ms(1_000) },
        ]);

        assert_eq!(state, RecordingState::Locked);
        assert_eq!(effects, vec![RecordingEffect::StartCapture]);
    }

    #[test]
    fn early_upward_drag_locks_immediately() {
        let (state, effects) = run(&[
            GestureEvent::Press { at: ms(0) },
            GestureEvent::Drag {
                at: ms(100),
                location: Point::new(0.0, -65.0),
            },
        ]);

        assert_eq!(state, RecordingState::Locked);
        assert_eq!(effects, vec![RecordingEffect::StartCapture]);
    }

    #[test]
    fn release_outcome_depends_on_horizontal_offset() {
        let recording = [
            GestureEvent::Press { at: ms(0) },
            GestureEvent::Tick { at: ms(600) },
        ];

        let mut cancelled = recording.to_vec();
        cancelled.push(GestureEvent::Drag {
            at: ms(700),
            location: Point::new(-130.0, 0.0),
        });
        cancelled.push(GestureEvent::Release { at: ms(800) });
        let (state, effects) = run(&cancelled);
        assert_eq!(state, RecordingState::Cancelled);
        assert_eq!(effects.last(), Some(&RecordingEffect::AbortCapture));

        let mut stopped = recording.to_vec();
        stopped.push(GestureEvent::Release { at: ms(800) });
        let (state, effects) = run(&stopped);
        assert_eq!(state, RecordingState::Stopped { playing: false });
        assert_eq!(effects.last(), Some(&RecordingEffect::StopCapture));
    }

    #[test]
    fn release_after_a_missed_tick_still_records() {
        let (state, effects) = run(&[
            GestureEvent::Press { at: ms(0) },
            GestureEvent::Release { at: ms(700) },
        ]);

        assert_eq!(state, RecordingState::Stopped { playing: false });
        assert_eq!(
            effects,
            vec![RecordingEffect::StartCapture, RecordingEffect::StopCapture]
        );
    }

    #[test]
    fn pending_session_blocks_a_new_press() {
        let settings = RecordingSettings::default();
        for state in [RecordingState::Locked, RecordingState::Stopped { playing: false }] {
            let rejection = state
                .apply(&GestureEvent::Press { at: ms(0) }, &settings)
                .expect_err("session pending");
            assert!(matches!(rejection, RecordingRejection::SessionPending { .. }));
        }
    }

    #[test]
    fn commands_outside_their_state_are_rejected() {
        let settings = RecordingSettings::default();
        let idle = RecordingState::Idle;

        assert!(idle.apply(&GestureEvent::StopTap, &settings).is_err());
        assert!(idle.apply(&GestureEvent::Confirm, &settings).is_err());
        assert!(idle.apply(&GestureEvent::Discard, &settings).is_err());
        assert!(idle.apply(&GestureEvent::TogglePlayback, &settings).is_err());
    }

    #[test]
    fn teardown_releases_whatever_is_held() {
        let settings = RecordingSettings::default();
        let cases = [
            (RecordingState::Locked, vec![RecordingEffect::AbortCapture]),
            (
                RecordingState::Stopped { playing: true },
                vec![RecordingEffect::PausePlayback, RecordingEffect::DeleteAsset],
            ),
            (RecordingState::Idle, Vec::new()),
        ];

        for (state, expected) in cases {
            let transition = state
                .apply(&GestureEvent::Teardown, &settings)
                .expect("teardown always applies");
            assert_eq!(transition.next, RecordingState::Idle);
            assert_eq!(transition.effects, expected);
        }
    }

    #[test]
    fn capture_failure_aborts_a_running_capture() {
        let settings = RecordingSettings::default();
        let failed = GestureEvent::CaptureFailed {
            reason: "device lost".to_string(),
        };

        for state in [
            RecordingState::Locked,
            RecordingState::Recording {
                pressed_at: ms(0),
                location: Point::ORIGIN,
            },
        ] {
            let transition = state.apply(&failed, &settings).expect("always applies");
            assert_eq!(transition.next, RecordingState::Idle);
            assert_eq!(transition.effects, vec![RecordingEffect::AbortCapture]);
        }
    }

    #[test]
    fn visual_feedback_follows_the_drag() {
        let settings = RecordingSettings::default();

        assert_eq!(cancel_opacity(Point::ORIGIN, &settings), 1.0);
        assert_eq!(cancel_opacity(Point::new(-60.0, 0.0), &settings), 0.5);
        assert_eq!(cancel_opacity(Point::new(-400.0, 0.0), &settings), 0.0);

        assert_eq!(lock_indicator_offset(Point::new(0.0, 20.0), &settings), -70.0);
        assert_eq!(lock_indicator_offset(Point::new(0.0, -20.0), &settings), -90.0);
        assert_eq!(lock_indicator_offset(Point::new(0.0, -90.0), &settings), -110.0);
    }
}
