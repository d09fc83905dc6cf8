pub mod message_log;
pub mod sheets;

pub use message_log::MessageLog;
pub use sheets::{GoogleSheets, SpreadsheetSink};
