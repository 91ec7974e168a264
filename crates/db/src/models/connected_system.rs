//! Connected system rows (read-only for the check workers).

use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `connected_systems` table.
///
/// `configuration` holds whatever the target needs: base URL, host,
/// credentials. Never log it.
#[derive(Clone, FromRow, Serialize)]
pub struct ConnectedSystem {
    pub id: DbId,
    pub name: String,
    pub system_type: String,
    pub configuration: Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl std::fmt::Debug for ConnectedSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedSystem")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("system_type", &self.system_type)
            .field("configuration", &"<redacted>")
            .finish()
    }
}
