//! Persisted plugin registrations.

use serde_json::json;
use sqlx::PgPool;
use vigil_db::models::check_plugin::{CheckTypeConfiguration, NewCheckPlugin, ParameterDefinition};
use vigil_db::repositories::CheckPluginRepo;

fn http_plugin(check_types: &[&str]) -> NewCheckPlugin {
    NewCheckPlugin {
        id: "http".to_string(),
        name: "HTTP checks".to_string(),
        check_types: check_types
            .iter()
            .map(|key| CheckTypeConfiguration {
                check_type: key.to_string(),
                name: key.to_string(),
                description: String::new(),
                target_type: "web_service".to_string(),
                parameters: vec![ParameterDefinition::optional(
                    "expected_status",
                    "integer",
                    Some(json!(200)),
                    "Expected HTTP status code",
                )],
            })
            .collect(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn upsert_marks_plugin_active_with_its_check_types(pool: PgPool) {
    let plugin = CheckPluginRepo::upsert(&pool, &http_plugin(&["http_get_check"]))
        .await
        .unwrap();
    assert!(plugin.is_active);

    let active = CheckPluginRepo::list_active_check_types(&pool).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].check_type, "http_get_check");
    assert_eq!(active[0].plugin_id, "http");
    assert_eq!(active[0].parameters.0[0].name, "expected_status");

    assert!(CheckPluginRepo::is_check_type_active(&pool, "http_get_check").await.unwrap());
    assert!(!CheckPluginRepo::is_check_type_active(&pool, "tcp_check").await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deactivated_plugin_hides_its_check_types(pool: PgPool) {
    CheckPluginRepo::upsert(&pool, &http_plugin(&["http_get_check"]))
        .await
        .unwrap();

    assert!(CheckPluginRepo::set_active(&pool, "http", false).await.unwrap());

    assert!(CheckPluginRepo::list_active_check_types(&pool).await.unwrap().is_empty());
    assert!(!CheckPluginRepo::is_check_type_active(&pool, "http_get_check").await.unwrap());
    let stored = CheckPluginRepo::find_by_id(&pool, "http").await.unwrap().unwrap();
    assert!(!stored.is_active);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn re_registration_replaces_check_types_and_reactivates(pool: PgPool) {
    CheckPluginRepo::upsert(&pool, &http_plugin(&["http_get_check", "http_legacy_check"]))
        .await
        .unwrap();
    CheckPluginRepo::set_active(&pool, "http", false).await.unwrap();

    CheckPluginRepo::upsert(&pool, &http_plugin(&["http_get_check"]))
        .await
        .unwrap();

    let keys: Vec<String> = CheckPluginRepo::list_active_check_types(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.check_type)
        .collect();
    assert_eq!(keys, vec!["http_get_check".to_string()]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn set_active_on_unknown_plugin_returns_false(pool: PgPool) {
    assert!(!CheckPluginRepo::set_active(&pool, "ghost", true).await.unwrap());
}
