use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct KeyValueRow {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
