use serde::Serialize;

use crate::engine::{LeaderboardEntry, RankedMessage};
use crate::models::{render_timestamp, Roster};

pub const LEADERBOARD_HEADER: [&str; 4] = ["Name", "Nickname", "Total Likes", "Average Likes"];
pub const TOP_MESSAGES_TITLE: &str = "Most Liked Messages";
pub const TOP_MESSAGES_HEADER: [&str; 5] = [
    "Created At",
    "Name",
    "Nickname",
    "Like Count",
    "Message Text",
];

/// A single spreadsheet cell. Serializes to the bare JSON value the Sheets API expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Integer(u64),
    Decimal(f64),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_owned())
    }
}

/// The rows written to the spreadsheet, top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReportTable {
    pub rows: Vec<Vec<Cell>>,
}

impl ReportTable {
    fn push<I, C>(&mut self, cells: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }
}

/// Lay out the leaderboard, a blank separator, then the most liked messages.
pub fn build(
    roster: &Roster,
    leaderboard: &[LeaderboardEntry],
    top_messages: &[RankedMessage],
) -> ReportTable {
    let mut table = ReportTable::default();

    table.push(LEADERBOARD_HEADER);
    for entry in leaderboard {
        let (name, nickname) = roster.resolve(&entry.sender_id);
        table.rows.push(vec![
            name.into(),
            nickname.into(),
            Cell::Integer(entry.total_likes),
            Cell::Decimal(entry.average_likes()),
        ]);
    }

    table.push(Vec::<Cell>::new());
    table.push([TOP_MESSAGES_TITLE]);
    table.push(TOP_MESSAGES_HEADER);
    for message in top_messages {
        let (name, nickname) = roster.resolve(&message.sender_id);
        table.rows.push(vec![
            Cell::Text(render_timestamp(&message.created_at)),
            name.into(),
            nickname.into(),
            Cell::Integer(message.like_count),
            Cell::Text(message.text.clone()),
        ]);
    }

    table
}
