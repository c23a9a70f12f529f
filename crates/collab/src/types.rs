use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AssetId, AttachmentId, ConversationId, MessageId, UserId};

/// Per-message flags reported by the chat SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageFlags {
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub sent_by_current_user: bool,
    #[serde(default)]
    pub bounced: bool,
}

/// Immutable chat message; updates arrive as whole replacements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: UserId,
    pub conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub flags: MessageFlags,
}

impl Message {
    pub fn new(
        id: impl Into<MessageId>,
        author: impl Into<UserId>,
        conversation_id: impl Into<ConversationId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            conversation_id: conversation_id.into(),
            created_at,
            flags: MessageFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn sent_by_current_user(mut self) -> Self {
        self.flags.sent_by_current_user = true;
        self
    }
}

/// Order in which the collaborator hands over a message collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// One full snapshot of a conversation's loaded messages.
///
/// The order is always explicit, so positional helpers come in two flavours:
/// counted from the newest end or walked chronologically.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageList {
    pub order: ListOrder,
    pub messages: Vec<Message>,
}

impl MessageList {
    pub fn new(order: ListOrder, messages: Vec<Message>) -> Self {
        Self { order, messages }
    }

    pub fn newest_first(messages: Vec<Message>) -> Self {
        Self::new(ListOrder::NewestFirst, messages)
    }

    pub fn oldest_first(messages: Vec<Message>) -> Self {
        Self::new(ListOrder::OldestFirst, messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.get_from_newest(0)
    }

    pub fn oldest(&self) -> Option<&Message> {
        self.get_chronological(0)
    }

    /// Returns the message `position` steps away from the newest end.
    pub fn get_from_newest(&self, position: usize) -> Option<&Message> {
        let index = match self.order {
            ListOrder::NewestFirst => position,
            ListOrder::OldestFirst => self.len().checked_sub(position + 1)?,
        };
        self.messages.get(index)
    }

    /// Returns the message `position` steps away from the oldest end.
    pub fn get_chronological(&self, position: usize) -> Option<&Message> {
        let index = match self.order {
            ListOrder::OldestFirst => position,
            ListOrder::NewestFirst => self.len().checked_sub(position + 1)?,
        };
        self.messages.get(index)
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Message> + '_ {
        (0..self.len()).filter_map(move |position| self.get_from_newest(position))
    }

    pub fn iter_chronological(&self) -> impl Iterator<Item = &Message> + '_ {
        (0..self.len()).filter_map(move |position| self.get_chronological(position))
    }

    /// Copies the list without the given ids, keeping order and the order tag.
    pub fn without(&self, excluded: &HashSet<MessageId>) -> Self {
        Self {
            order: self.order,
            messages: self
                .messages
                .iter()
                .filter(|message| !excluded.contains(&message.id))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub id: AttachmentId,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoAttachment {
    pub id: AttachmentId,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// A message returned by the search API, reduced to what media feeds need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub message_id: MessageId,
    pub author: UserId,
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub videos: Vec<VideoAttachment>,
}

impl SearchHit {
    pub fn has_kind(&self, kind: AttachmentKind) -> bool {
        match kind {
            AttachmentKind::Image => !self.images.is_empty(),
            AttachmentKind::Video => !self.videos.is_empty(),
            AttachmentKind::File | AttachmentKind::Audio => false,
        }
    }
}

/// Search filter: one conversation, messages carrying any of the listed kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub conversation_id: ConversationId,
    pub attachment_kinds: Vec<AttachmentKind>,
}

impl SearchQuery {
    /// Query used by the media gallery: images and videos of one conversation.
    pub fn media(conversation_id: impl Into<ConversationId>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            attachment_kinds: vec![AttachmentKind::Image, AttachmentKind::Video],
        }
    }

    pub fn matches(&self, hit: &SearchHit) -> bool {
        hit.conversation_id == self.conversation_id
            && (self.attachment_kinds.is_empty()
                || self.attachment_kinds.iter().any(|kind| hit.has_kind(*kind)))
    }
}

/// Finalized audio file produced by a stopped capture.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    pub id: AssetId,
    pub location: String,
    pub duration: Duration,
    pub waveform: Vec<f32>,
}

/// Live telemetry pushed by the audio subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Capture { duration: Duration, level: f32 },
    Playback { position: Duration, playing: bool },
}
