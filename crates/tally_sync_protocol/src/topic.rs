//! Notify-topic naming.
//!
//! Each account gets one notify topic per entity kind; every device of the
//! account subscribes to all of them. The broker must preserve publish
//! order within a topic.

use crate::types::EntityKind;

/// Default first segment of every notify topic.
pub const DEFAULT_TOPIC_PREFIX: &str = "tally/notify";

/// The notify topic for one entity kind of one account.
#[must_use]
pub fn notify_topic(prefix: &str, account_id: &str, entity: EntityKind) -> String {
    format!("{}/{}/{}", prefix, account_id, entity.topic_segment())
}

/// All notify topics a device of this account subscribes to.
#[must_use]
pub fn account_topics(prefix: &str, account_id: &str) -> Vec<String> {
    EntityKind::ALL
        .iter()
        .map(|entity| notify_topic(prefix, account_id, *entity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_shape() {
        assert_eq!(
            notify_topic(DEFAULT_TOPIC_PREFIX, "acct-1", EntityKind::Bill),
            "tally/notify/acct-1/bill"
        );
        assert_eq!(
            notify_topic("custom", "acct-1", EntityKind::Book),
            "custom/acct-1/book"
        );
    }

    #[test]
    fn one_topic_per_kind() {
        let topics = account_topics(DEFAULT_TOPIC_PREFIX, "acct-1");
        assert_eq!(
            topics,
            vec!["tally/notify/acct-1/bill", "tally/notify/acct-1/book"]
        );
    }
}
