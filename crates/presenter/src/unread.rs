use parley_collab::{MessageId, MessageList};

/// Anchor of the "N new messages" separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessagesSeparator {
    pub message_id: MessageId,
    /// Number shown on the banner: the anchor's 1-based position from the newest end.
    pub count: usize,
}

/// Tracks where the new-messages separator sits and whether the reader already saw it.
#[derive(Debug, Clone)]
pub struct UnreadMarker {
    show_separator: bool,
    unread_count: usize,
    separator: Option<NewMessagesSeparator>,
    dismissed_for: Option<usize>,
}

impl UnreadMarker {
    pub fn new(show_separator: bool) -> Self {
        Self {
            show_separator,
            unread_count: 0,
            separator: None,
            dismissed_for: None,
        }
    }

    pub fn separator(&self) -> Option<&NewMessagesSeparator> {
        self.separator.as_ref()
    }

    /// Number for the "N new messages" banner, if a separator is showing.
    pub fn separator_label_count(&self) -> Option<usize> {
        self.separator.as_ref().map(|separator| separator.count)
    }

    /// Re-anchors the separator for a fresh unread count.
    ///
    /// A count that differs from the previous one is a new unread event and revives a
    /// dismissed marker; the same count stays dismissed.
    pub fn update(
        &mut self,
        unread_count: usize,
        list: &MessageList,
    ) -> Option<&NewMessagesSeparator> {
        if unread_count != self.unread_count {
            self.dismissed_for = None;
            self.unread_count = unread_count;
        }

        self.separator = if !self.show_separator
            || unread_count == 0
            || self.dismissed_for == Some(unread_count)
        {
            None
        } else {
            list.get_from_newest(unread_count - 1)
                .map(|message| NewMessagesSeparator {
                    message_id: message.id.clone(),
                    count: unread_count,
                })
        };

        self.separator.as_ref()
    }

    /// Called once the separator scrolls out of view.
    pub fn dismiss(&mut self) -> bool {
        if self.separator.take().is_none() {
            return false;
        }
        self.dismissed_for = Some(self.unread_count);
        tracing::debug!(unread_count = self.unread_count, "new-messages separator dismissed");
        true
    }

    pub fn reset(&mut self) {
        self.unread_count = 0;
        self.separator = None;
        self.dismissed_for = None;
    }
}

impl Default for UnreadMarker {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use parley_collab::Message;

    use super::*;

    fn list(len: usize) -> MessageList {
        MessageList::newest_first(
            (0..len)
                .map(|index| {
                    let created_at = Utc
                        .timestamp_opt(10_000 - index as i64, 0)
                        .single()
                        .expect("valid timestamp");
                    Message::new(format!("m{index}"), "u1", "c1", created_at)
                })
                .collect(),
        )
    }

    #[test]
    fn separator_anchors_at_unread_count_minus_one_from_newest() {
        let mut marker = UnreadMarker::default();
        let separator = marker.update(3, &list(10)).cloned().expect("separator");

        assert_eq!(separator.message_id.as_str(), "m2");
        assert_eq!(separator.count, 3);
        assert_eq!(marker.separator_label_count(), Some(3));
    }

    #[test]
    fn oldest_first_lists_count_from_the_end() {
        let mut messages = list(10).messages;
        messages.reverse();
        let mut marker = UnreadMarker::default();
        let separator = marker
            .update(3, &MessageList::oldest_first(messages))
            .cloned()
            .expect("separator");

        assert_eq!(separator.message_id.as_str(), "m2");
    }

    #[test]
    fn zero_or_out_of_range_counts_show_nothing() {
        let mut marker = UnreadMarker::default();
        assert!(marker.update(0, &list(10)).is_none());
        assert!(marker.update(11, &list(10)).is_none());
        assert!(marker.update(1, &MessageList::default()).is_none());
    }

    #[test]
    fn dismissed_separator_stays_hidden_until_the_count_changes() {
        let mut marker = UnreadMarker::default();
        marker.update(3, &list(10));
        assert!(marker.dismiss());
        assert!(!marker.dismiss());

        assert!(marker.update(3, &list(10)).is_none());
        let revived = marker.update(4, &list(10)).cloned().expect("new unread event");
        assert_eq!(revived.message_id.as_str(), "m3");
    }

    #[test]
    fn disabled_separator_never_shows() {
        let mut marker = UnreadMarker::new(false);
        assert!(marker.update(3, &list(10)).is_none());
    }
}
