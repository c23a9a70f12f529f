use std::collections::HashMap;
use std::time::Duration;

use chrono::TimeDelta;
use parley_collab::{Message, MessageId, MessageList, UserId};

use crate::settings::GroupingSettings;

/// Position of one message inside its visual group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GroupTags {
    pub first_in_group: bool,
    pub last_in_group: bool,
    /// Sender banner shown under the last message of someone else's run in group chats.
    pub last_in_group_header: bool,
}

impl GroupTags {
    const SOLO: Self = Self {
        first_in_group: true,
        last_in_group: true,
        last_in_group_header: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupingInfo {
    tags: HashMap<MessageId, GroupTags>,
}

impl GroupingInfo {
    /// Tags for `id`; unknown ids carry no tags.
    pub fn get(&self, id: &MessageId) -> GroupTags {
        self.tags.get(id).copied().unwrap_or_default()
    }

    pub fn is_first_in_group(&self, id: &MessageId) -> bool {
        self.get(id).first_in_group
    }

    pub fn is_last_in_group(&self, id: &MessageId) -> bool {
        self.get(id).last_in_group
    }

    pub fn shows_last_in_group_header(&self, id: &MessageId) -> bool {
        self.get(id).last_in_group_header
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MessageId, &GroupTags)> {
        self.tags.iter()
    }
}

/// Inputs besides the list itself that decide group boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingContext {
    pub enabled: bool,
    pub threshold: Duration,
    pub current_user: UserId,
    pub member_count: usize,
}

impl GroupingContext {
    pub fn new(current_user: UserId, member_count: usize, settings: &GroupingSettings) -> Self {
        Self {
            enabled: settings.enabled,
            threshold: settings.threshold(),
            current_user,
            member_count,
        }
    }

    fn is_group_chat(&self) -> bool {
        self.member_count > 2
    }

    fn is_own(&self, message: &Message) -> bool {
        message.flags.sent_by_current_user || message.author == self.current_user
    }
}

/// Tags every message with its group boundaries in a single chronological pass.
pub fn group_messages(list: &MessageList, context: &GroupingContext) -> GroupingInfo {
    let chronological = list.iter_chronological().collect::<Vec<_>>();
    let threshold = TimeDelta::from_std(context.threshold).unwrap_or(TimeDelta::MAX);
    let mut tags = HashMap::with_capacity(chronological.len());

    for (position, message) in chronological.iter().enumerate() {
        if !context.enabled {
            tags.insert(message.id.clone(), GroupTags::SOLO);
            continue;
        }

        let previous = position
            .checked_sub(1)
            .and_then(|index| chronological.get(index));
        let next = chronological.get(position + 1);

        let first_in_group =
            previous.is_none_or(|previous| breaks_group(previous, message, threshold));
        let last_in_group = next.is_none_or(|next| breaks_group(message, next, threshold));
        let last_in_group_header =
            last_in_group && context.is_group_chat() && !context.is_own(message);

        tags.insert(
            message.id.clone(),
            GroupTags {
                first_in_group,
                last_in_group,
                last_in_group_header,
            },
        );
    }

    tracing::debug!(
        message_count = chronological.len(),
        member_count = context.member_count,
        "recomputed message grouping"
    );
    GroupingInfo { tags }
}

fn breaks_group(earlier: &Message, later: &Message, threshold: TimeDelta) -> bool {
    if earlier.author != later.author {
        return true;
    }
    if earlier.created_at.date_naive() != later.created_at.date_naive() {
        return true;
    }
    later
        .created_at
        .signed_duration_since(earlier.created_at)
        .abs()
        > threshold
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn message(id: &str, author: &str, seconds: i64) -> Message {
        let created_at = Utc
            .timestamp_opt(1_700_000_000 + seconds, 0)
            .single()
            .expect("valid timestamp");
        Message::new(id, author, "c1", created_at)
    }

    fn context(member_count: usize) -> GroupingContext {
        GroupingContext::new(UserId::new("me"), member_count, &GroupingSettings::default())
    }

    #[test]
    fn same_author_within_threshold_forms_one_group() {
        let list = MessageList::oldest_first(vec![
            message("m1", "u1", 0),
            message("m2", "u1", 30),
            message("m3", "u2", 35),
        ]);
        let info = group_messages(&list, &context(2));

        let m1 = info.get(&MessageId::new("m1"));
        let m2 = info.get(&MessageId::new("m2"));
        let m3 = info.get(&MessageId::new("m3"));
        assert!(m1.first_in_group && !m1.last_in_group);
        assert!(!m2.first_in_group && m2.last_in_group);
        assert!(m3.first_in_group && m3.last_in_group);
    }

    #[test]
    fn order_of_the_input_list_does_not_change_the_result() {
        let oldest_first = MessageList::oldest_first(vec![
            message("m1", "u1", 0),
            message("m2", "u1", 30),
            message("m3", "u2", 35),
        ]);
        let mut reversed = oldest_first.messages.clone();
        reversed.reverse();
        let newest_first = MessageList::newest_first(reversed);

        assert_eq!(
            group_messages(&oldest_first, &context(2)),
            group_messages(&newest_first, &context(2))
        );
    }

    #[test]
    fn time_gap_beyond_threshold_splits_the_group() {
        let list = MessageList::oldest_first(vec![message("m1", "u1", 0), message("m2", "u1", 61)]);
        let info = group_messages(&list, &context(2));

        assert!(info.is_last_in_group(&MessageId::new("m1")));
        assert!(info.is_first_in_group(&MessageId::new("m2")));
    }

    #[test]
    fn day_boundary_splits_the_group() {
        let before_midnight = Utc
            .with_ymd_and_hms(2024, 3, 1, 23, 59, 50)
            .single()
            .expect("valid timestamp");
        let after_midnight = Utc
            .with_ymd_and_hms(2024, 3, 2, 0, 0, 5)
            .single()
            .expect("valid timestamp");
        let list = MessageList::oldest_first(vec![
            Message::new("m1", "u1", "c1", before_midnight),
            Message::new("m2", "u1", "c1", after_midnight),
        ]);
        let info = group_messages(&list, &context(2));

        assert!(info.is_last_in_group(&MessageId::new("m1")));
        assert!(info.is_first_in_group(&MessageId::new("m2")));
    }

    #[test]
    fn newest_message_always_closes_its_group_and_recompute_is_stable() {
        let list = MessageList::newest_first(
            (0..20)
                .rev()
                .map(|index| message(&format!("m{index}"), "u1", index * 5))
                .collect(),
        );
        let info = group_messages(&list, &context(2));

        let last_flags = list
            .iter_newest_first()
            .filter(|message| info.is_last_in_group(&message.id))
            .collect::<Vec<_>>();
        assert_eq!(last_flags.len(), 1);
        assert_eq!(last_flags[0].id, MessageId::new("m19"));
        assert_eq!(info, group_messages(&list, &context(2)));
    }

    #[test]
    fn header_tag_only_for_others_in_group_chats() {
        let list = MessageList::oldest_first(vec![
            message("m1", "u1", 0),
            message("m2", "me", 10).sent_by_current_user(),
        ]);

        let direct = group_messages(&list, &context(2));
        assert!(!direct.shows_last_in_group_header(&MessageId::new("m1")));

        let group = group_messages(&list, &context(3));
        assert!(group.shows_last_in_group_header(&MessageId::new("m1")));
        assert!(group.is_last_in_group(&MessageId::new("m2")));
        assert!(!group.shows_last_in_group_header(&MessageId::new("m2")));
    }

    #[test]
    fn disabled_grouping_makes_every_message_its_own_group() {
        let settings = GroupingSettings {
            enabled: false,
            ..GroupingSettings::default()
        };
        let list = MessageList::oldest_first(vec![message("m1", "u1", 0), message("m2", "u1", 1)]);
        let info = group_messages(&list, &GroupingContext::new(UserId::new("me"), 2, &settings));

        assert!(info.is_first_in_group(&MessageId::new("m2")));
        assert!(info.is_last_in_group(&MessageId::new("m1")));
    }

    #[test]
    fn empty_list_yields_no_groups() {
        let info = group_messages(&MessageList::default(), &context(5));
        assert!(info.is_empty());
    }
}
