/// Primary-key type of every vigil table (PostgreSQL BIGSERIAL).
pub type DbId = i64;

/// UTC wall-clock time, as stored in TIMESTAMPTZ columns.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
