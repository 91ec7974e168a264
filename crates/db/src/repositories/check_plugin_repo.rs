//! Repository for `check_plugins` and `check_type_configurations`.

use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::check_plugin::{CheckPlugin, CheckTypeConfigurationRow, NewCheckPlugin};

/// Column list for `check_plugins` queries.
const PLUGIN_COLUMNS: &str = "id, name, is_active, created_at, updated_at";

/// Column list for `check_type_configurations` queries, prefixed for joins.
const CHECK_TYPE_COLUMNS: &str = "\
    ct.check_type, ct.plugin_id, ct.name, ct.description, ct.target_type, ct.parameters";

/// Persisted plugin registrations.
pub struct CheckPluginRepo;

impl CheckPluginRepo {
    /// Insert or refresh a plugin and its check types, marking it active.
    ///
    /// The plugin's previous check-type rows are replaced in the same
    /// transaction.
    pub async fn upsert(pool: &PgPool, input: &NewCheckPlugin) -> Result<CheckPlugin, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO check_plugins (id, name, is_active) VALUES ($1, $2, TRUE) \
             ON CONFLICT (id) DO UPDATE \
                 SET name = EXCLUDED.name, is_active = TRUE, updated_at = NOW() \
             RETURNING {PLUGIN_COLUMNS}"
        );
        let plugin = sqlx::query_as::<_, CheckPlugin>(&query)
            .bind(&input.id)
            .bind(&input.name)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM check_type_configurations WHERE plugin_id = $1")
            .bind(&input.id)
            .execute(&mut *tx)
            .await?;

        for config in &input.check_types {
            sqlx::query(
                "INSERT INTO check_type_configurations \
                     (check_type, plugin_id, name, description, target_type, parameters) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (check_type) DO UPDATE \
                     SET plugin_id = EXCLUDED.plugin_id, name = EXCLUDED.name, \
                         description = EXCLUDED.description, \
                         target_type = EXCLUDED.target_type, \
                         parameters = EXCLUDED.parameters, updated_at = NOW()",
            )
            .bind(&config.check_type)
            .bind(&input.id)
            .bind(&config.name)
            .bind(&config.description)
            .bind(&config.target_type)
            .bind(Json(&config.parameters))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(plugin)
    }

    /// Flip a plugin's active flag. Returns `false` if the plugin is unknown.
    pub async fn set_active(pool: &PgPool, id: &str, active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE check_plugins SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(active)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a plugin by its ID.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<CheckPlugin>, sqlx::Error> {
        let query = format!("SELECT {PLUGIN_COLUMNS} FROM check_plugins WHERE id = $1");
        sqlx::query_as::<_, CheckPlugin>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Check types whose owning plugin is active, ordered by key.
    pub async fn list_active_check_types(
        pool: &PgPool,
    ) -> Result<Vec<CheckTypeConfigurationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {CHECK_TYPE_COLUMNS} FROM check_type_configurations ct \
             JOIN check_plugins p ON p.id = ct.plugin_id \
             WHERE p.is_active \
             ORDER BY ct.check_type"
        );
        sqlx::query_as::<_, CheckTypeConfigurationRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// Whether `check_type` belongs to an active plugin.
    pub async fn is_check_type_active(pool: &PgPool, check_type: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS ( \
                 SELECT 1 FROM check_type_configurations ct \
                 JOIN check_plugins p ON p.id = ct.plugin_id \
                 WHERE ct.check_type = $1 AND p.is_active \
             )",
        )
        .bind(check_type)
        .fetch_one(pool)
        .await
    }
}
