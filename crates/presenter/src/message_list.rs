use parley_collab::{MessageId, MessageList, UserId};

use crate::grouping::{GroupingContext, GroupingInfo, group_messages};
use crate::observe::Observable;
use crate::render_skip::{RenderSkipFilter, SkipSet};
use crate::settings::{GroupingSettings, PresenterSettings};
use crate::unread::{NewMessagesSeparator, UnreadMarker};

/// One push from the chat SDK: the full list plus channel counters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelSnapshot {
    pub list: MessageList,
    pub unread_count: usize,
    pub member_count: usize,
}

/// Where the reader currently is in the list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewportState {
    /// True while the newest messages are on screen (no "scroll to latest" button).
    pub showing_latest: bool,
    /// Set while the view is jumping to a specific message.
    pub jump_target: Option<MessageId>,
}

/// Everything the view layer needs to draw one pass of the list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Presentation {
    pub messages: MessageList,
    pub grouping: GroupingInfo,
    pub skipped: SkipSet,
    pub separator: Option<NewMessagesSeparator>,
}

/// Per-view coordinator for grouping, render skipping and the unread separator.
pub struct MessageListPresenter {
    current_user: UserId,
    grouping_settings: GroupingSettings,
    render_skip: RenderSkipFilter,
    unread: UnreadMarker,
    presentation: Observable<Presentation>,
}

impl MessageListPresenter {
    pub fn new(current_user: UserId, settings: &PresenterSettings) -> Self {
        Self {
            current_user,
            grouping_settings: settings.grouping.clone(),
            render_skip: RenderSkipFilter::new(),
            unread: UnreadMarker::new(settings.unread.show_separator),
            presentation: Observable::default(),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Presentation> {
        self.presentation.subscribe()
    }

    pub fn current(&self) -> Presentation {
        self.presentation.current()
    }

    pub fn render_skip(&self) -> &RenderSkipFilter {
        &self.render_skip
    }

    /// Turns one SDK snapshot into a presentation and publishes it.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &ChannelSnapshot,
        viewport: &ViewportState,
    ) -> Presentation {
        let newest = snapshot.list.newest();
        let newest_is_own = newest.is_some_and(|message| {
            message.flags.sent_by_current_user || message.author == self.current_user
        });

        // Settle on the new top unless the reader is parked further down the history.
        if !self.render_skip.has_cursor()
            || viewport.showing_latest
            || viewport.jump_target.is_some()
            || newest_is_own
        {
            self.render_skip.adopt(newest);
        }

        let context = GroupingContext::new(
            self.current_user.clone(),
            snapshot.member_count,
            &self.grouping_settings,
        );
        let grouping = group_messages(&snapshot.list, &context);
        let separator = self
            .unread
            .update(snapshot.unread_count, &snapshot.list)
            .cloned();
        let (messages, skipped) = self.render_skip.apply(&snapshot.list);

        tracing::debug!(
            message_count = snapshot.list.len(),
            skipped = skipped.len(),
            separator = ?separator.as_ref().map(|separator| &separator.message_id),
            "presented channel snapshot"
        );

        let presentation = Presentation {
            messages,
            grouping,
            skipped,
            separator,
        };
        self.presentation.publish(presentation.clone());
        presentation
    }

    /// The separator scrolled out of view.
    pub fn dismiss_separator(&mut self) {
        if self.unread.dismiss() {
            let mut presentation = self.presentation.current();
            presentation.separator = None;
            self.presentation.publish(presentation);
        }
    }

    /// The view went away; drop per-view state so the next channel starts clean.
    pub fn detach(&mut self) {
        self.render_skip.reset();
        self.unread.reset();
        self.presentation.publish(Presentation::default());
        tracing::debug!("message list presenter detached");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use parley_collab::Message;

    use super::*;

    fn message(id: &str, author: &str, seconds: i64) -> Message {
        let created_at = Utc
            .timestamp_opt(1_700_000_000 + seconds, 0)
            .single()
            .expect("valid timestamp");
        Message::new(id, author, "c1", created_at)
    }

    fn snapshot(messages: Vec<Message>, unread_count: usize) -> ChannelSnapshot {
        ChannelSnapshot {
            list: MessageList::newest_first(messages),
            unread_count,
            member_count: 3,
        }
    }

    fn presenter() -> MessageListPresenter {
        MessageListPresenter::new(UserId::new("me"), &PresenterSettings::default())
    }

    fn scrolled_away() -> ViewportState {
        ViewportState {
            showing_latest: false,
            jump_target: None,
        }
    }

    #[test]
    fn arrivals_are_held_back_while_scrolled_away() {
        let mut presenter = presenter();
        presenter.apply_snapshot(
            &snapshot(vec![message("B", "u1", 20), message("C", "u1", 10)], 0),
            &scrolled_away(),
        );

        let presentation = presenter.apply_snapshot(
            &snapshot(
                vec![message("A", "u2", 30), message("B", "u1", 20), message("C", "u1", 10)],
                1,
            ),
            &scrolled_away(),
        );

        assert!(presentation.skipped.contains(&MessageId::new("A")));
        assert_eq!(presentation.messages.len(), 2);
        assert_eq!(
            presentation.separator.map(|separator| separator.message_id),
            Some(MessageId::new("A"))
        );
        assert!(presentation.grouping.is_first_in_group(&MessageId::new("A")));
    }

    #[test]
    fn own_message_or_viewing_latest_moves_the_cursor() {
        let mut presenter = presenter();
        presenter.apply_snapshot(&snapshot(vec![message("B", "u1", 20)], 0), &scrolled_away());

        let own = presenter.apply_snapshot(
            &snapshot(
                vec![message("A", "me", 30).sent_by_current_user(), message("B", "u1", 20)],
                0,
            ),
            &scrolled_away(),
        );
        assert!(own.skipped.is_empty());

        let latest = presenter.apply_snapshot(
            &snapshot(
                vec![message("Z", "u2", 40), message("A", "me", 30), message("B", "u1", 20)],
                0,
            ),
            &ViewportState {
                showing_latest: true,
                jump_target: None,
            },
        );
        assert!(latest.skipped.is_empty());
        assert_eq!(
            presenter.render_skip().cursor().map(|cursor| cursor.message_id.as_str()),
            Some("Z")
        );
    }

    #[test]
    fn one_notification_per_snapshot_and_detach_clears_state() {
        let mut presenter = presenter();
        let mut receiver = presenter.subscribe();

        presenter.apply_snapshot(&snapshot(vec![message("A", "u1", 10)], 1), &scrolled_away());
        assert!(receiver.has_changed().expect("presenter alive"));
        assert!(receiver.borrow_and_update().separator.is_some());

        presenter.dismiss_separator();
        assert!(receiver.borrow_and_update().separator.is_none());

        presenter.detach();
        assert!(presenter.render_skip().cursor().is_none());
        assert!(presenter.current().messages.is_empty());
    }

    #[test]
    fn empty_snapshot_is_a_valid_degenerate_case() {
        let mut presenter = presenter();
        let presentation = presenter.apply_snapshot(&ChannelSnapshot::default(), &scrolled_away());

        assert!(presentation.messages.is_empty());
        assert!(presentation.grouping.is_empty());
        assert!(presentation.separator.is_none());
    }
}
