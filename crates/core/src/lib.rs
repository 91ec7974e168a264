//! Pure domain logic for the check-execution subsystem.
//!
//! Nothing in this crate touches the database. Persistence lives in
//! `vigil-db`, the plugin contract in `vigil-checks`.

pub mod check_status;
pub mod envelope;
pub mod error;
pub mod probe;
pub mod types;
