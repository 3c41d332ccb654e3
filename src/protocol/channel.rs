use serde::{Deserialize, Serialize};

use super::message::{Header, Location};

/// Caps how many messages a last-messages retrieval may return.
pub const HEADER_MAX_MSG_RETRIEVAL: &str = "MAX_MSG_RETRIEVAL";
/// Offset in seconds added to `published` to derive a message's relevance.
pub const HEADER_RELEVANCE_OFFSET: &str = "RELEVANCE_OFFSET";

pub const PRIORITY_MIN: u8 = 0;
pub const PRIORITY_MAX: u8 = 5;
pub const PRIORITY_DEFAULT: u8 = 1;

fn default_active() -> bool {
    true
}

fn default_priority() -> u8 {
    PRIORITY_DEFAULT
}

/// Channel document as persisted and cached by the registry.
///
/// `owner` is immutable after creation. `authorized_principals` is the set of
/// bare principals allowed to publish and counted as members; the opt-in
/// subscription relation lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub chid: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub authorized_principals: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            chid: None,
            owner: None,
            authorized_principals: Vec::new(),
            active: default_active(),
            priority: default_priority(),
            location: None,
            headers: Vec::new(),
            description: None,
        }
    }
}

impl Channel {
    pub fn header(&self, key: &str) -> Option<&serde_json::Value> {
        self.headers.iter().find(|h| h.key == key).map(|h| &h.value)
    }

    pub fn is_authorized(&self, bare_principal: &str) -> bool {
        self.authorized_principals
            .iter()
            .any(|p| p == bare_principal)
    }

    /// Retrieval cap from the MAX_MSG_RETRIEVAL header, when present and
    /// positive.
    pub fn max_msg_retrieval(&self) -> Option<usize> {
        let value = self.header(HEADER_MAX_MSG_RETRIEVAL)?;
        let count = value.as_u64().or_else(|| {
            value.as_str().and_then(|s| s.parse().ok())
        })?;
        (count > 0).then_some(count as usize)
    }

    /// Relevance offset in seconds from the RELEVANCE_OFFSET header.
    pub fn relevance_offset_secs(&self) -> Option<i64> {
        let value = self.header(HEADER_RELEVANCE_OFFSET)?;
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .filter(|secs| *secs > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let channel: Channel = serde_json::from_str("{}").unwrap();
        assert!(channel.active);
        assert_eq!(channel.priority, PRIORITY_DEFAULT);
        assert!(channel.authorized_principals.is_empty());
    }

    #[test]
    fn test_max_msg_retrieval_parses_numbers_and_strings() {
        let mut channel = Channel::default();
        channel.headers = vec![Header::new(HEADER_MAX_MSG_RETRIEVAL, json!(3))];
        assert_eq!(channel.max_msg_retrieval(), Some(3));

        channel.headers = vec![Header::new(HEADER_MAX_MSG_RETRIEVAL, json!("12"))];
        assert_eq!(channel.max_msg_retrieval(), Some(12));

        channel.headers = vec![Header::new(HEADER_MAX_MSG_RETRIEVAL, json!(0))];
        assert_eq!(channel.max_msg_retrieval(), None);
    }

    #[test]
    fn test_relevance_offset_ignores_nonpositive() {
        let mut channel = Channel::default();
        channel.headers = vec![Header::new(HEADER_RELEVANCE_OFFSET, json!(900))];
        assert_eq!(channel.relevance_offset_secs(), Some(900));

        channel.headers = vec![Header::new(HEADER_RELEVANCE_OFFSET, json!(-5))];
        assert_eq!(channel.relevance_offset_secs(), None);
    }

    #[test]
    fn test_membership() {
        let channel = Channel {
            authorized_principals: vec!["alice@example.org".into()],
            ..Default::default()
        };
        assert!(channel.is_authorized("alice@example.org"));
        assert!(!channel.is_authorized("bob@example.org"));
    }
}
