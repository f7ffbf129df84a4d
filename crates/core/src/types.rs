/// Feed identifiers are short stable strings such as `cam-001`.
pub type FeedId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
