//! Plugin registry.
//!
//! Two independent facts decide whether a check type can run:
//!
//! - **enabled**: the owning plugin is marked active in the persisted
//!   catalog. Survives restarts.
//! - **loaded**: a plugin instance serving the check type was registered in
//!   this process. Lost on restart until [`PluginRegistry::reconcile`] runs.
//!
//! [`PluginRegistry::get_plugin_for_check_type`] requires both. A check type
//! that is enabled but has no compiled plugin is a dead entry: it stays
//! unexecutable and is only reported.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vigil_core::error::CoreError;
use vigil_db::models::check_plugin::NewCheckPlugin;

use crate::plugin::{CheckPlugin, CheckTypeConfiguration};

/// Persisted plugin registrations.
#[async_trait]
pub trait PluginCatalog: Send + Sync {
    /// Store the plugin and its check types, marked active.
    async fn upsert_plugin(&self, plugin: &NewCheckPlugin) -> Result<(), CoreError>;

    /// Flip the plugin's active flag. Unknown ids are a `Validation` error.
    async fn set_plugin_active(&self, id: &str, active: bool) -> Result<(), CoreError>;

    /// Check types owned by active plugins.
    async fn active_check_types(&self) -> Result<Vec<CheckTypeConfiguration>, CoreError>;

    /// Whether the check type is owned by an active plugin.
    async fn is_check_type_active(&self, check_type: &str) -> Result<bool, CoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Plugin catalog error: {0}")]
    Catalog(#[from] CoreError),
}

/// What [`PluginRegistry::reconcile`] found at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Check types now both enabled and loaded.
    pub registered: Vec<String>,
    /// Check types enabled in the catalog with no compiled plugin.
    pub dead: Vec<String>,
}

#[derive(Default)]
struct Loaded {
    /// Plugin id -> instance.
    plugins: HashMap<String, Arc<dyn CheckPlugin>>,
    /// Check type -> plugin id.
    check_types: HashMap<String, String>,
}

/// Maps check types to plugin instances. Created once at startup and
/// shared as `Arc<PluginRegistry>`.
pub struct PluginRegistry {
    catalog: Arc<dyn PluginCatalog>,
    loaded: RwLock<Loaded>,
}

impl PluginRegistry {
    pub fn new(catalog: Arc<dyn PluginCatalog>) -> Self {
        Self {
            catalog,
            loaded: RwLock::new(Loaded::default()),
        }
    }

    /// Persist the plugin as active, then make it executable here.
    ///
    /// If persisting fails nothing is loaded.
    pub async fn register_plugin(&self, plugin: Arc<dyn CheckPlugin>) -> Result<(), RegistryError> {
        let check_types = plugin.check_types();
        let record = NewCheckPlugin {
            id: plugin.id().to_string(),
            name: plugin.name().to_string(),
            check_types: check_types.clone(),
        };
        self.catalog.upsert_plugin(&record).await?;

        let mut loaded = self.loaded.write().await;
        loaded.check_types.retain(|_, owner| owner != &record.id);
        for config in &check_types {
            loaded
                .check_types
                .insert(config.check_type.clone(), record.id.clone());
        }
        loaded.plugins.insert(record.id.clone(), plugin);

        tracing::info!(
            plugin_id = %record.id,
            check_types = check_types.len(),
            "Check plugin registered",
        );
        Ok(())
    }

    /// Mark the plugin inactive, then unload it.
    ///
    /// If persisting fails the plugin stays loaded.
    pub async fn unregister_plugin(&self, id: &str) -> Result<(), RegistryError> {
        self.catalog.set_plugin_active(id, false).await?;

        let mut loaded = self.loaded.write().await;
        loaded.plugins.remove(id);
        loaded.check_types.retain(|_, owner| owner != id);

        tracing::info!(plugin_id = %id, "Check plugin unregistered");
        Ok(())
    }

    /// Check types enabled in the catalog, whether or not loaded here.
    pub async fn get_check_type_configurations(
        &self,
    ) -> Result<Vec<CheckTypeConfiguration>, RegistryError> {
        Ok(self.catalog.active_check_types().await?)
    }

    /// The plugin serving `check_type`, if it is both loaded and enabled.
    pub async fn get_plugin_for_check_type(&self, check_type: &str) -> Option<Arc<dyn CheckPlugin>> {
        let plugin = {
            let loaded = self.loaded.read().await;
            loaded
                .check_types
                .get(check_type)
                .and_then(|id| loaded.plugins.get(id))
                .cloned()
        };
        let Some(plugin) = plugin else {
            tracing::debug!(check_type, "No loaded plugin serves check type");
            return None;
        };

        match self.catalog.is_check_type_active(check_type).await {
            Ok(true) => Some(plugin),
            Ok(false) => {
                tracing::warn!(
                    check_type,
                    plugin_id = %plugin.id(),
                    "Check type is loaded but disabled in the catalog",
                );
                None
            }
            Err(e) => {
                tracing::warn!(check_type, error = %e, "Catalog lookup failed");
                None
            }
        }
    }

    /// Startup reconciliation: read the enabled set, register every
    /// compiled-in plugin, and report enabled check types nobody serves.
    pub async fn reconcile(
        &self,
        plugins: Vec<Arc<dyn CheckPlugin>>,
    ) -> Result<ReconcileReport, RegistryError> {
        let enabled = self.catalog.active_check_types().await?;

        for plugin in plugins {
            self.register_plugin(plugin).await?;
        }

        let loaded = self.loaded.read().await;
        let registered: BTreeSet<String> = loaded.check_types.keys().cloned().collect();
        let dead: Vec<String> = enabled
            .into_iter()
            .map(|config| config.check_type)
            .filter(|key| !registered.contains(key))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for key in &dead {
            tracing::warn!(
                check_type = %key,
                "Check type is enabled but no compiled plugin serves it",
            );
        }

        Ok(ReconcileReport {
            registered: registered.into_iter().collect(),
            dead,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::plugin::{CheckOutcome, ExecutionContext};

    /// Catalog held in memory; `fail_writes` simulates a database outage.
    #[derive(Default)]
    struct MemoryCatalog {
        /// Plugin id -> (active, check types).
        plugins: Mutex<HashMap<String, (bool, Vec<CheckTypeConfiguration>)>>,
        fail_writes: Mutex<bool>,
    }

    impl MemoryCatalog {
        fn seed(&self, plugin_id: &str, active: bool, check_types: &[&str]) {
            self.plugins.lock().unwrap().insert(
                plugin_id.to_string(),
                (active, check_types.iter().map(|k| config(k)).collect()),
            );
        }

        fn set_fail_writes(&self, fail: bool) {
            *self.fail_writes.lock().unwrap() = fail;
        }

        fn write_guard(&self) -> Result<(), CoreError> {
            if *self.fail_writes.lock().unwrap() {
                return Err(CoreError::Internal("database unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PluginCatalog for MemoryCatalog {
        async fn upsert_plugin(&self, plugin: &NewCheckPlugin) -> Result<(), CoreError> {
            self.write_guard()?;
            self.plugins
                .lock()
                .unwrap()
                .insert(plugin.id.clone(), (true, plugin.check_types.clone()));
            Ok(())
        }

        async fn set_plugin_active(&self, id: &str, active: bool) -> Result<(), CoreError> {
            self.write_guard()?;
            match self.plugins.lock().unwrap().get_mut(id) {
                Some(entry) => {
                    entry.0 = active;
                    Ok(())
                }
                None => Err(CoreError::Validation(format!("unknown plugin {id}"))),
            }
        }

        async fn active_check_types(&self) -> Result<Vec<CheckTypeConfiguration>, CoreError> {
            Ok(self
                .plugins
                .lock()
                .unwrap()
                .values()
                .filter(|(active, _)| *active)
                .flat_map(|(_, types)| types.clone())
                .collect())
        }

        async fn is_check_type_active(&self, check_type: &str) -> Result<bool, CoreError> {
            Ok(self
                .active_check_types()
                .await?
                .iter()
                .any(|c| c.check_type == check_type))
        }
    }

    fn config(key: &str) -> CheckTypeConfiguration {
        CheckTypeConfiguration {
            check_type: key.to_string(),
            name: key.to_string(),
            description: String::new(),
            target_type: "any".to_string(),
            parameters: vec![],
        }
    }

    struct StubPlugin {
        id: &'static str,
        keys: &'static [&'static str],
    }

    #[async_trait]
    impl CheckPlugin for StubPlugin {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            "Stub"
        }

        fn check_types(&self) -> Vec<CheckTypeConfiguration> {
            self.keys.iter().map(|k| config(k)).collect()
        }

        async fn execute_check(&self, _ctx: &ExecutionContext, _check_type: &str) -> CheckOutcome {
            CheckOutcome::success(json!({}))
        }
    }

    fn stub(id: &'static str, keys: &'static [&'static str]) -> Arc<dyn CheckPlugin> {
        Arc::new(StubPlugin { id, keys })
    }

    fn registry() -> (Arc<MemoryCatalog>, PluginRegistry) {
        let catalog = Arc::new(MemoryCatalog::default());
        let registry = PluginRegistry::new(catalog.clone());
        (catalog, registry)
    }

    #[tokio::test]
    async fn registered_and_active_check_type_resolves() {
        let (_, registry) = registry();
        registry.register_plugin(stub("http", &["http_get_check"])).await.unwrap();

        let plugin = registry.get_plugin_for_check_type("http_get_check").await;
        assert_eq!(plugin.map(|p| p.id().to_string()), Some("http".to_string()));
    }

    #[tokio::test]
    async fn active_in_catalog_but_not_loaded_is_not_found() {
        // Simulates a restart: the catalog remembers, this process does not.
        let (catalog, registry) = registry();
        catalog.seed("http", true, &["http_get_check"]);

        assert!(registry.get_plugin_for_check_type("http_get_check").await.is_none());
        let enabled = registry.get_check_type_configurations().await.unwrap();
        assert_eq!(enabled.len(), 1);
    }

    #[tokio::test]
    async fn loaded_but_inactive_in_catalog_is_not_found() {
        let (catalog, registry) = registry();
        registry.register_plugin(stub("http", &["http_get_check"])).await.unwrap();
        catalog.seed("http", false, &["http_get_check"]);

        assert!(registry.get_plugin_for_check_type("http_get_check").await.is_none());
        assert!(registry.get_check_type_configurations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_persistence_leaves_memory_untouched() {
        let (catalog, registry) = registry();
        catalog.set_fail_writes(true);

        let err = registry
            .register_plugin(stub("http", &["http_get_check"]))
            .await
            .unwrap_err();
        assert_matches!(err, RegistryError::Catalog(CoreError::Internal(_)));

        // Even with the catalog claiming the type is active, nothing was loaded.
        catalog.seed("http", true, &["http_get_check"]);
        assert!(registry.get_plugin_for_check_type("http_get_check").await.is_none());
    }

    #[tokio::test]
    async fn unregister_disables_and_unloads() {
        let (catalog, registry) = registry();
        registry.register_plugin(stub("http", &["http_get_check"])).await.unwrap();

        registry.unregister_plugin("http").await.unwrap();

        assert!(registry.get_plugin_for_check_type("http_get_check").await.is_none());
        // Re-enabling in the catalog alone does not make it executable again.
        catalog.seed("http", true, &["http_get_check"]);
        assert!(registry.get_plugin_for_check_type("http_get_check").await.is_none());
    }

    #[tokio::test]
    async fn unregister_keeps_plugin_loaded_when_catalog_write_fails() {
        let (catalog, registry) = registry();
        registry.register_plugin(stub("http", &["http_get_check"])).await.unwrap();
        catalog.set_fail_writes(true);

        assert!(registry.unregister_plugin("http").await.is_err());
        assert!(registry.get_plugin_for_check_type("http_get_check").await.is_some());
    }

    #[tokio::test]
    async fn re_registration_drops_check_types_no_longer_served() {
        let (_, registry) = registry();
        registry
            .register_plugin(stub("net", &["tcp_check", "udp_check"]))
            .await
            .unwrap();
        registry.register_plugin(stub("net", &["tcp_check"])).await.unwrap();

        assert!(registry.get_plugin_for_check_type("tcp_check").await.is_some());
        assert!(registry.get_plugin_for_check_type("udp_check").await.is_none());
    }

    #[tokio::test]
    async fn reconcile_registers_plugins_and_reports_dead_entries() {
        let (catalog, registry) = registry();
        catalog.seed("legacy", true, &["ftp_banner_check"]);
        catalog.seed("http", true, &["http_get_check"]);

        let report = registry
            .reconcile(vec![
                stub("http", &["http_get_check"]),
                stub("tls", &["tls_certificate_expiry"]),
            ])
            .await
            .unwrap();

        assert_eq!(
            report.registered,
            vec!["http_get_check".to_string(), "tls_certificate_expiry".to_string()]
        );
        assert_eq!(report.dead, vec!["ftp_banner_check".to_string()]);
        assert!(registry.get_plugin_for_check_type("ftp_banner_check").await.is_none());
        assert!(registry.get_plugin_for_check_type("tls_certificate_expiry").await.is_some());
    }
}
