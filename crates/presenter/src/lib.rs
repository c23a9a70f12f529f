#![deny(unsafe_code)]

//! Presentation core for a conversation's message stream.
//!
//! Everything here is UI-framework agnostic: controllers take snapshots from the chat
//! SDK, compute what a list view should draw and publish the result through
//! [`observe::Observable`].

pub mod grouping;
pub mod media;
pub mod message_list;
pub mod observe;
pub mod recording;
pub mod render_skip;
pub mod settings;
pub mod unread;

pub use grouping::{GroupTags, GroupingContext, GroupingInfo, group_messages};
pub use media::{
    FetchCompletion, FetchKind, FetchTicket, MediaAttachments, MediaItem, MediaPayload,
    MediaWindow, PendingFetch, flatten_hits,
};
pub use message_list::{ChannelSnapshot, MessageListPresenter, Presentation, ViewportState};
pub use observe::Observable;
pub use recording::{
    FinishedRecording, GestureEvent, Point, RecordingError, RecordingResult, RecordingSnapshot,
    RecordingState, VoiceRecorder,
};
pub use render_skip::{RenderCursor, RenderSkipFilter, SkipSet};
pub use settings::{
    GroupingSettings, MediaSettings, PresenterSettings, RecordingSettings, SettingsError,
    SettingsResult, SettingsStore, UnreadSettings,
};
pub use unread::{NewMessagesSeparator, UnreadMarker};
