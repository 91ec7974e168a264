//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod campaign_task_repo;
pub mod check_plugin_repo;
pub mod connected_system_repo;
pub mod task_execution_repo;
pub mod task_result_repo;

pub use campaign_task_repo::CampaignTaskRepo;
pub use check_plugin_repo::CheckPluginRepo;
pub use connected_system_repo::ConnectedSystemRepo;
pub use task_execution_repo::TaskExecutionRepo;
pub use task_result_repo::TaskResultRepo;
