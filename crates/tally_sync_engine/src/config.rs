//! Configuration for the sync session.

use tally_sync_protocol::DEFAULT_TOPIC_PREFIX;

/// Configuration for a sync session.
///
/// One session serves one account on one device. The account id selects the
/// notify topics; the device id is stamped on every outbound envelope so
/// broker echoes of our own publishes can be dropped on arrival.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Account whose devices this session synchronizes with.
    pub account_id: String,
    /// This device's id, unique within the account.
    pub device_id: String,
    /// First segment of every notify topic.
    pub topic_prefix: String,
}

impl SyncConfig {
    /// Creates a configuration with the default topic prefix.
    pub fn new(account_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            device_id: device_id.into(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
        }
    }

    /// Overrides the topic prefix.
    #[must_use]
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = SyncConfig::new("acct-1", "device-a");
        assert_eq!(config.account_id, "acct-1");
        assert_eq!(config.device_id, "device-a");
        assert_eq!(config.topic_prefix, DEFAULT_TOPIC_PREFIX);

        let config = config.with_topic_prefix("staging/notify");
        assert_eq!(config.topic_prefix, "staging/notify");
    }
}
