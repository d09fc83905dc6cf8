use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::Message;

pub const DEFAULT_TOP_MESSAGES: usize = 15;

/// Running totals for one sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub total_likes: u64,
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub sender_id: String,
    pub total_likes: u64,
    pub message_count: u64,
}

impl LeaderboardEntry {
    /// Likes per message, rounded to 2 decimal places with ties going to the even cent.
    pub fn average_likes(&self) -> f64 {
        // Entries only exist for senders with at least one message.
        let average = self.total_likes as f64 / self.message_count as f64;
        (average * 100.0).round_ties_even() / 100.0
    }
}

/// The part of a message kept around for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMessage {
    pub created_at: DateTime<Utc>,
    pub sender_id: String,
    pub text: String,
    pub like_count: u64,
}

/// Everything derived from one pass over a group's history.
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Per-sender totals, in order of each sender's first message.
    pub user_stats: Vec<(String, UserStats)>,
    /// Senders by total likes, highest first. Ties keep first-appearance order.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// The most liked messages, highest first. Ties keep fetch order.
    pub top_messages: Vec<RankedMessage>,
    pub total_messages: usize,
}

impl Aggregation {
    pub fn stats_for(&self, sender_id: &str) -> Option<&UserStats> {
        self.user_stats
            .iter()
            .find(|(id, _)| id == sender_id)
            .map(|(_, stats)| stats)
    }
}

/// Folds a message stream into per-sender stats and a top-K ranking.
///
/// Feed every message through `ingest` exactly once, then call `finish`.
pub struct Aggregator {
    top_k: usize,
    /// Position of each sender in `stats`.
    positions: HashMap<String, usize>,
    stats: Vec<(String, UserStats)>,
    records: Vec<RankedMessage>,
}

impl Aggregator {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            positions: HashMap::new(),
            stats: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn ingest(&mut self, message: Message) {
        let position = match self.positions.get(&message.sender_id) {
            Some(position) => *position,
            None => {
                self.stats
                    .push((message.sender_id.clone(), UserStats::default()));
                self.positions
                    .insert(message.sender_id.clone(), self.stats.len() - 1);
                self.stats.len() - 1
            }
        };

        let stats = &mut self.stats[position].1;
        stats.total_likes += message.like_count;
        stats.message_count += 1;

        self.records.push(RankedMessage {
            created_at: message.created_at,
            sender_id: message.sender_id,
            text: message.text,
            like_count: message.like_count,
        });
    }

    pub fn finish(self) -> Aggregation {
        let total_messages = self.records.len();

        // Both sorts are stable, which is what keeps ties in arrival order.
        let mut top_messages = self.records;
        top_messages.sort_by(|a, b| b.like_count.cmp(&a.like_count));
        top_messages.truncate(self.top_k);

        let mut leaderboard: Vec<LeaderboardEntry> = self
            .stats
            .iter()
            .map(|(sender_id, stats)| LeaderboardEntry {
                sender_id: sender_id.clone(),
                total_likes: stats.total_likes,
                message_count: stats.message_count,
            })
            .collect();
        leaderboard.sort_by(|a, b| b.total_likes.cmp(&a.total_likes));

        Aggregation {
            user_stats: self.stats,
            leaderboard,
            top_messages,
            total_messages,
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_MESSAGES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: u32, sender_id: &str, like_count: u64) -> Message {
        Message {
            id: format!("m{id}"),
            created_at: Utc.timestamp_opt(1_700_000_000 + i64::from(id), 0).unwrap(),
            sender_id: sender_id.to_owned(),
            text: format!("text {id}"),
            like_count,
            attachment_count: 0,
        }
    }

    fn aggregate(messages: Vec<Message>) -> Aggregation {
        let mut aggregator = Aggregator::default();
        for message in messages {
            aggregator.ingest(message);
        }
        aggregator.finish()
    }

    #[test]
    fn test_two_member_scenario() {
        let aggregation = aggregate(vec![
            message(1, "u1", 2),
            message(2, "u2", 5),
            message(3, "u1", 1),
        ]);

        assert_eq!(
            aggregation.stats_for("u1"),
            Some(&UserStats {
                total_likes: 3,
                message_count: 2
            })
        );
        assert_eq!(
            aggregation.stats_for("u2"),
            Some(&UserStats {
                total_likes: 5,
                message_count: 1
            })
        );

        let board: Vec<(&str, u64, f64)> = aggregation
            .leaderboard
            .iter()
            .map(|entry| (entry.sender_id.as_str(), entry.total_likes, entry.average_likes()))
            .collect();
        assert_eq!(board, vec![("u2", 5, 5.0), ("u1", 3, 1.5)]);
    }

    #[test]
    fn test_totals_match_input() {
        let messages: Vec<Message> = (0..200)
            .map(|i| message(i, &format!("u{}", i % 7), u64::from(i * 31 % 11)))
            .collect();
        let expected_likes: u64 = messages.iter().map(|m| m.like_count).sum();

        let aggregation = aggregate(messages);

        let total_likes: u64 = aggregation
            .user_stats
            .iter()
            .map(|(_, stats)| stats.total_likes)
            .sum();
        let total_count: u64 = aggregation
            .user_stats
            .iter()
            .map(|(_, stats)| stats.message_count)
            .sum();
        assert_eq!(total_likes, expected_likes);
        assert_eq!(total_count, 200);
        assert_eq!(aggregation.total_messages, 200);
        assert!(aggregation
            .user_stats
            .iter()
            .all(|(_, stats)| stats.message_count >= 1));
    }

    #[test]
    fn test_leaderboard_ties_keep_first_appearance_order() {
        let aggregation = aggregate(vec![
            message(1, "carol", 1),
            message(2, "alice", 4),
            message(3, "bob", 2),
            message(4, "carol", 3),
            message(5, "bob", 2),
        ]);

        let order: Vec<&str> = aggregation
            .leaderboard
            .iter()
            .map(|entry| entry.sender_id.as_str())
            .collect();
        assert_eq!(order, vec!["carol", "alice", "bob"]);
        assert!(aggregation
            .leaderboard
            .windows(2)
            .all(|pair| pair[0].total_likes >= pair[1].total_likes));
    }

    #[test]
    fn test_top_messages_are_capped_and_sorted() {
        let messages: Vec<Message> = (0..40)
            .map(|i| message(i, "u1", u64::from(i % 5)))
            .collect();

        let aggregation = aggregate(messages);

        assert_eq!(aggregation.top_messages.len(), 15);
        assert!(aggregation
            .top_messages
            .windows(2)
            .all(|pair| pair[0].like_count >= pair[1].like_count));
        // Eight messages have 4 likes, so the first eight are those, in fetch order.
        let first_texts: Vec<&str> = aggregation.top_messages[..3]
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(first_texts, vec!["text 4", "text 9", "text 14"]);
    }

    #[test]
    fn test_short_history_keeps_every_message() {
        let aggregation = aggregate(vec![message(1, "u1", 0), message(2, "u2", 3)]);

        assert_eq!(aggregation.top_messages.len(), 2);
        assert_eq!(aggregation.top_messages[0].like_count, 3);
    }

    #[test]
    fn test_average_is_rounded_to_two_places() {
        let entry = LeaderboardEntry {
            sender_id: "u1".to_owned(),
            total_likes: 2,
            message_count: 3,
        };

        assert_eq!(entry.average_likes(), 0.67);
    }

    #[test]
    fn test_average_half_cent_rounds_to_even() {
        let average = |total_likes, message_count| {
            LeaderboardEntry {
                sender_id: "u1".to_owned(),
                total_likes,
                message_count,
            }
            .average_likes()
        };

        assert_eq!(average(1, 8), 0.12);
        assert_eq!(average(5, 8), 0.62);
        assert_eq!(average(3, 8), 0.38);
    }

    #[test]
    fn test_empty_history() {
        let aggregation = Aggregator::new(15).finish();

        assert!(aggregation.leaderboard.is_empty());
        assert!(aggregation.top_messages.is_empty());
        assert_eq!(aggregation.total_messages, 0);
    }
}
