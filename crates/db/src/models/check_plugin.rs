//! Plugin registration records and the check-type schema they publish.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use vigil_core::types::Timestamp;

/// One parameter a check type accepts. Used for form generation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    /// `string`, `integer`, `boolean`, `object` or `array`.
    pub param_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: String,
}

impl ParameterDefinition {
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            required: true,
            default: None,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, param_type: &str, default: Option<Value>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            required: false,
            default,
            description: description.to_string(),
        }
    }
}

/// Schema a plugin publishes for one check type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckTypeConfiguration {
    /// Check-type key, e.g. `http_get_check`.
    pub check_type: String,
    pub name: String,
    pub description: String,
    /// Kind of connected system the check expects, e.g. `web_service`.
    pub target_type: String,
    pub parameters: Vec<ParameterDefinition>,
}

/// A row from the `check_plugins` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CheckPlugin {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering (or re-registering) a plugin.
#[derive(Debug, Clone)]
pub struct NewCheckPlugin {
    pub id: String,
    pub name: String,
    pub check_types: Vec<CheckTypeConfiguration>,
}

/// A row from the `check_type_configurations` table.
#[derive(Debug, Clone, FromRow)]
pub struct CheckTypeConfigurationRow {
    pub check_type: String,
    pub plugin_id: String,
    pub name: String,
    pub description: String,
    pub target_type: String,
    pub parameters: Json<Vec<ParameterDefinition>>,
}

impl From<CheckTypeConfigurationRow> for CheckTypeConfiguration {
    fn from(row: CheckTypeConfigurationRow) -> Self {
        Self {
            check_type: row.check_type,
            name: row.name,
            description: row.description,
            target_type: row.target_type,
            parameters: row.parameters.0,
        }
    }
}
