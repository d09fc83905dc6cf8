use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ProviderError;

/// Stand-in for text-less messages (images, system events).
pub const NO_TEXT: &str = "[No Text]";

/// Name and nickname reported for senders missing from the roster.
pub const UNKNOWN_MEMBER: &str = "Unknown";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A group member as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    pub user_id: String,
    /// The member's account name.
    pub name: String,
    /// The name the member goes by in this group.
    pub nickname: String,
}

/// Lookup of group members by user id, built once per run.
#[derive(Debug, Default)]
pub struct Roster {
    members: HashMap<String, Member>,
}

impl Roster {
    pub fn new(members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            members: members
                .into_iter()
                .map(|member| (member.user_id.clone(), member))
                .collect(),
        }
    }

    /// Resolve a user id to `(name, nickname)`, falling back to `("Unknown", "Unknown")`.
    pub fn resolve(&self, user_id: &str) -> (&str, &str) {
        match self.members.get(user_id) {
            Some(member) => (&member.name, &member.nickname),
            None => (UNKNOWN_MEMBER, UNKNOWN_MEMBER),
        }
    }
}

/// A message exactly as the provider returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub id: String,
    /// Unix seconds.
    pub created_at: i64,
    pub sender_id: String,
    pub text: Option<String>,
    #[serde(default)]
    pub favorited_by: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

/// A fetched message, normalized for aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub sender_id: String,
    pub text: String,
    pub like_count: u64,
    pub attachment_count: u64,
}

impl TryFrom<RawMessage> for Message {
    type Error = ProviderError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let created_at = DateTime::<Utc>::from_timestamp(raw.created_at, 0).ok_or_else(|| {
            ProviderError::InvalidTimestamp {
                id: raw.id.clone(),
                created_at: raw.created_at,
            }
        })?;

        let text = match raw.text {
            Some(text) if !text.is_empty() => text,
            _ => NO_TEXT.to_owned(),
        };

        // A like is a membership in favorited_by, so duplicates count once.
        let like_count = raw.favorited_by.iter().collect::<HashSet<_>>().len() as u64;

        Ok(Message {
            id: raw.id,
            created_at,
            sender_id: raw.sender_id,
            text,
            like_count,
            attachment_count: raw.attachments.len() as u64,
        })
    }
}

/// Render an instant the way both the CSV log and the spreadsheet show it.
pub fn render_timestamp(instant: &DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(text: Option<&str>, favorited_by: &[&str]) -> RawMessage {
        RawMessage {
            id: "m1".to_owned(),
            created_at: 1_700_000_000,
            sender_id: "u1".to_owned(),
            text: text.map(str::to_owned),
            favorited_by: favorited_by.iter().map(|id| id.to_string()).collect(),
            attachments: vec![serde_json::json!({"type": "image"})],
        }
    }

    #[test]
    fn test_missing_text_becomes_placeholder() {
        let message = Message::try_from(raw(None, &["u2", "u3"])).unwrap();

        assert_eq!(message.text, NO_TEXT);
        assert_eq!(message.like_count, 2);
        assert_eq!(message.attachment_count, 1);
    }

    #[test]
    fn test_empty_text_becomes_placeholder() {
        let message = Message::try_from(raw(Some(""), &[])).unwrap();

        assert_eq!(message.text, NO_TEXT);
        assert_eq!(message.like_count, 0);
    }

    #[test]
    fn test_duplicate_likes_count_once() {
        let message = Message::try_from(raw(Some("hi"), &["u2", "u2", "u3"])).unwrap();

        assert_eq!(message.text, "hi");
        assert_eq!(message.like_count, 2);
    }

    #[test]
    fn test_created_at_is_utc_instant() {
        let message = Message::try_from(raw(Some("hi"), &[])).unwrap();

        assert_eq!(
            message.created_at,
            Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
        );
        assert_eq!(render_timestamp(&message.created_at), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        let mut bad = raw(Some("hi"), &[]);
        bad.created_at = i64::MAX;

        assert!(matches!(
            Message::try_from(bad),
            Err(ProviderError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_roster_resolves_unknown_sender() {
        let roster = Roster::new(vec![Member {
            user_id: "u1".to_owned(),
            name: "Alice".to_owned(),
            nickname: "Al".to_owned(),
        }]);

        assert_eq!(roster.resolve("u1"), ("Alice", "Al"));
        assert_eq!(roster.resolve("system"), ("Unknown", "Unknown"));
    }
}
