use std::fs::File;
use std::path::Path;

use crate::error::SinkError;
use crate::models::{render_timestamp, Message};

pub const MESSAGE_LOG_HEADER: [&str; 5] = [
    "Created At",
    "Sender ID",
    "Message Text",
    "Like Count",
    "Attachment Count",
];

/// Flat CSV record of every fetched message, in fetch order.
///
/// Rows are buffered; call `flush` at points where a failure should leave them on disk.
pub struct MessageLog {
    writer: csv::Writer<File>,
}

impl MessageLog {
    /// Create (or truncate) the log at `path` and write the header row.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        writer.write_record(MESSAGE_LOG_HEADER)?;
        writer.flush()?;

        Ok(Self { writer })
    }

    pub fn append(&mut self, message: &Message) -> Result<(), SinkError> {
        self.writer.write_record([
            render_timestamp(&message.created_at),
            message.sender_id.clone(),
            message.text.clone(),
            message.like_count.to_string(),
            message.attachment_count.to_string(),
        ])?;

        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
