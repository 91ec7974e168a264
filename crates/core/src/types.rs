/// Primary keys of platform entities (task instances, connected systems)
/// are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A JSON object used for parameter bags and system configuration.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
