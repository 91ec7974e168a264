//! Status helper enums mapping to SMALLSERIAL lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` table.

use vigil_core::envelope::ExecutionStatus;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle of a row in the `task_executions` queue.
    TaskExecutionStatus {
        Pending = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

impl TaskExecutionStatus {
    /// Completed and failed rows are never claimed again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<ExecutionStatus> for TaskExecutionStatus {
    fn from(value: ExecutionStatus) -> Self {
        match value {
            ExecutionStatus::Completed => Self::Completed,
            ExecutionStatus::Failed => Self::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_execution_status_ids_match_seed_data() {
        assert_eq!(TaskExecutionStatus::Pending.id(), 1);
        assert_eq!(TaskExecutionStatus::Processing.id(), 2);
        assert_eq!(TaskExecutionStatus::Completed.id(), 3);
        assert_eq!(TaskExecutionStatus::Failed.id(), 4);
    }

    #[test]
    fn from_id_round_trips_known_ids() {
        for id in 1..=4 {
            assert_eq!(TaskExecutionStatus::from_id(id).map(|s| s.id()), Some(id));
        }
        assert_eq!(TaskExecutionStatus::from_id(0), None);
        assert_eq!(TaskExecutionStatus::from_id(5), None);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = TaskExecutionStatus::Processing.into();
        assert_eq!(id, 2);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!TaskExecutionStatus::Pending.is_terminal());
        assert!(!TaskExecutionStatus::Processing.is_terminal());
        assert!(TaskExecutionStatus::Completed.is_terminal());
        assert!(TaskExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn execution_status_maps_to_terminal_rows() {
        assert_eq!(
            TaskExecutionStatus::from(ExecutionStatus::Completed),
            TaskExecutionStatus::Completed
        );
        assert_eq!(
            TaskExecutionStatus::from(ExecutionStatus::Failed),
            TaskExecutionStatus::Failed
        );
    }
}
