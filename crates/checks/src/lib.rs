//! Check plugins and the machinery that dispatches to them.
//!
//! - [`plugin`]: the [`CheckPlugin`](plugin::CheckPlugin) contract.
//! - [`store`]: the narrow [`Store`](store::Store) seam onto platform data.
//! - [`registry`]: persisted-vs-loaded plugin bookkeeping.
//! - [`plugins`]: the built-in check families.

use std::sync::Arc;

pub mod params;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

use plugin::CheckPlugin;

/// Every plugin compiled into this binary.
///
/// Registration is explicit: the worker passes this list to
/// [`PluginRegistry::reconcile`](registry::PluginRegistry::reconcile) at startup.
pub fn builtin_plugins() -> Vec<Arc<dyn CheckPlugin>> {
    let http = reqwest::Client::new();
    vec![
        Arc::new(plugins::network::NetworkPlugin),
        Arc::new(plugins::tls::TlsPlugin),
        Arc::new(plugins::http::HttpPlugin::new(http.clone())),
        Arc::new(plugins::webhook::WebhookPlugin::new(http)),
        Arc::new(plugins::script::ScriptPlugin),
        Arc::new(plugins::aws::AwsPlugin),
    ]
}
