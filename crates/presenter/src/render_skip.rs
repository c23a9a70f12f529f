use std::collections::HashSet;

use parley_collab::{ConversationId, Message, MessageId, MessageList};

/// Newest message the list view last settled on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderCursor {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
}

impl RenderCursor {
    pub fn of(message: &Message) -> Self {
        Self {
            message_id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
        }
    }
}

/// Ids withheld from one render pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SkipSet {
    ids: HashSet<MessageId>,
}

impl SkipSet {
    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageId> {
        self.ids.iter()
    }
}

/// Holds back freshly arrived messages while the reader sits away from the newest end.
///
/// Each list view owns one filter; call [`RenderSkipFilter::reset`] when the view goes
/// away so a later channel never compares against a stale cursor.
#[derive(Debug, Clone, Default)]
pub struct RenderSkipFilter {
    cursor: Option<RenderCursor>,
}

impl RenderSkipFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> Option<&RenderCursor> {
        self.cursor.as_ref()
    }

    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn adopt(&mut self, top: Option<&Message>) {
        self.cursor = top.map(RenderCursor::of);
    }

    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// Computes which leading (newest) messages of `list` stay hidden.
    pub fn skip_set(&mut self, list: &MessageList) -> SkipSet {
        let new_top = list.newest();
        let cursor_id = self.cursor.as_ref().map(|cursor| &cursor.message_id);
        if new_top.map(|message| &message.id) == cursor_id {
            return SkipSet::default();
        }

        let cursor_conversation = self.cursor.as_ref().map(|cursor| &cursor.conversation_id);
        if new_top.map(|message| &message.conversation_id) != cursor_conversation {
            tracing::debug!(
                previous = ?cursor_conversation,
                next = ?new_top.map(|message| &message.conversation_id),
                "conversation changed; adopting new render cursor"
            );
            self.adopt(new_top);
            return SkipSet::default();
        }

        let Some(cursor_id) = cursor_id else {
            return SkipSet::default();
        };

        let mut ids = HashSet::new();
        for message in list.iter_newest_first() {
            if &message.id == cursor_id {
                tracing::debug!(
                    skipped = ids.len(),
                    cursor = %cursor_id,
                    "holding back new messages"
                );
                return SkipSet { ids };
            }
            ids.insert(message.id.clone());
        }

        // Cursor fell out of the loaded window; re-rendering beats hiding everything.
        tracing::debug!(cursor = %cursor_id, "render cursor not found in snapshot");
        SkipSet::default()
    }

    /// Returns `list` minus the messages this pass holds back.
    pub fn apply(&mut self, list: &MessageList) -> (MessageList, SkipSet) {
        let skip = self.skip_set(list);
        if skip.is_empty() {
            return (list.clone(), skip);
        }
        (list.without(&skip.ids), skip)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn message(id: &str, conversation: &str, seconds: i64) -> Message {
        let created_at = Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp");
        Message::new(id, "u1", conversation, created_at)
    }

    fn ids(skip: &SkipSet) -> Vec<&str> {
        let mut ids = skip.iter().map(MessageId::as_str).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn messages_above_the_cursor_are_skipped() {
        let mut filter = RenderSkipFilter::new();
        filter.adopt(Some(&message("B", "c1", 2)));

        let list = MessageList::newest_first(vec![
            message("A", "c1", 3),
            message("B", "c1", 2),
            message("C", "c1", 1),
        ]);
        let (filtered, skip) = filter.apply(&list);

        assert_eq!(ids(&skip), ["A"]);
        let remaining = filtered.messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>();
        assert_eq!(remaining, ["B", "C"]);
    }

    #[test]
    fn oldest_first_lists_are_scanned_from_the_newest_end() {
        let mut filter = RenderSkipFilter::new();
        filter.adopt(Some(&message("B", "c1", 2)));

        let list = MessageList::oldest_first(vec![
            message("C", "c1", 1),
            message("B", "c1", 2),
            message("A", "c1", 3),
            message("Z", "c1", 4),
        ]);

        assert_eq!(ids(&filter.skip_set(&list)), ["A", "Z"]);
    }

    #[test]
    fn unchanged_top_is_a_no_op() {
        let mut filter = RenderSkipFilter::new();
        filter.adopt(Some(&message("A", "c1", 3)));
        let list = MessageList::newest_first(vec![message("A", "c1", 3), message("B", "c1", 2)]);

        assert!(filter.skip_set(&list).is_empty());
        assert_eq!(filter.cursor().map(|c| c.message_id.as_str()), Some("A"));
    }

    #[test]
    fn missing_cursor_fails_open() {
        let mut filter = RenderSkipFilter::new();
        filter.adopt(Some(&message("gone", "c1", 1)));
        let list = MessageList::newest_first(vec![message("A", "c1", 3), message("B", "c1", 2)]);

        assert!(filter.skip_set(&list).is_empty());
    }

    #[test]
    fn conversation_change_resets_the_cursor() {
        let mut filter = RenderSkipFilter::new();
        filter.adopt(Some(&message("B", "c1", 2)));
        let list = MessageList::newest_first(vec![message("X", "c2", 9), message("B", "c2", 2)]);

        assert!(filter.skip_set(&list).is_empty());
        let cursor = filter.cursor().expect("cursor adopted");
        assert_eq!(cursor.message_id.as_str(), "X");
        assert_eq!(cursor.conversation_id.as_str(), "c2");
    }

    #[test]
    fn reset_forgets_the_cursor() {
        let mut filter = RenderSkipFilter::new();
        filter.adopt(Some(&message("B", "c1", 2)));
        filter.reset();

        let list = MessageList::newest_first(vec![message("A", "c1", 3), message("B", "c1", 2)]);
        assert!(filter.skip_set(&list).is_empty());
        assert_eq!(filter.cursor().map(|c| c.message_id.as_str()), Some("A"));
    }

    #[test]
    fn independent_filters_do_not_share_state() {
        let mut left = RenderSkipFilter::new();
        let mut right = RenderSkipFilter::new();
        left.adopt(Some(&message("B", "c1", 2)));

        let list = MessageList::newest_first(vec![message("A", "c1", 3), message("B", "c1", 2)]);
        assert_eq!(ids(&left.skip_set(&list)), ["A"]);
        assert!(right.skip_set(&list).is_empty());
    }
}
