//! Repository for the `connected_systems` table.

use sqlx::PgPool;
use vigil_core::types::DbId;

use crate::models::connected_system::ConnectedSystem;

/// Column list for `connected_systems` queries.
const COLUMNS: &str = "id, name, system_type, configuration, created_at, updated_at";

/// Read-only access to check targets.
pub struct ConnectedSystemRepo;

impl ConnectedSystemRepo {
    /// Find a connected system by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ConnectedSystem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM connected_systems WHERE id = $1");
        sqlx::query_as::<_, ConnectedSystem>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
