use crate::model::{ListId, TaskId};

pub type Result<T> = std::result::Result<T, Error>;

/// Why a structural target was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    /// A task cannot be placed relative to, or under, itself.
    #[error("task {task} cannot be moved onto itself")]
    SelfMove { task: TaskId },
    /// The new parent lies inside the moved task's subtree.
    #[error("task {parent} is inside the subtree of task {task}")]
    Cycle { task: TaskId, parent: TaskId },
    /// The new parent already sits at the deepest allowed level.
    #[error("task {parent} cannot take children (nesting is limited to {max_depth} level(s))")]
    DepthCap { parent: TaskId, max_depth: u32 },
    /// The task's own children would end up deeper than allowed.
    #[error("task {task} has children and cannot be nested further (limit {max_depth})")]
    HasChildren { task: TaskId, max_depth: u32 },
}

/// What a lookup failed to find.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Missing {
    #[error("task {id}{}", in_list(.list_id))]
    Task { id: TaskId, list_id: Option<ListId> },
    #[error("list {0}")]
    List(ListId),
    #[error("list '{0}'")]
    ListNamed(String),
}

fn in_list(list_id: &Option<ListId>) -> String {
    list_id.map_or_else(String::new, |id| format!(" in list {id}"))
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    #[error("{0} not found")]
    NotFound(Missing),

    #[error("parent task {parent} belongs to list {parent_list}, not list {list_id}")]
    OwnershipMismatch {
        parent: TaskId,
        parent_list: ListId,
        list_id: ListId,
    },

    #[error("list {list_id} is at revision {actual}, not {expected}; reload and retry")]
    ConcurrentMutationConflict {
        list_id: ListId,
        expected: i64,
        actual: i64,
    },

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("'{requester}' does not own list {list_id}")]
    Forbidden { requester: String, list_id: ListId },

    #[error("storage failure: {0}")]
    StorageFailure(#[from] rusqlite::Error),
}

impl Error {
    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTarget(_) => "invalid_target",
            Self::NotFound(_) => "not_found",
            Self::OwnershipMismatch { .. } => "ownership_mismatch",
            Self::ConcurrentMutationConflict { .. } => "concurrent_mutation_conflict",
            Self::InvalidContent(_) => "invalid_content",
            Self::Forbidden { .. } => "forbidden",
            Self::StorageFailure(_) => "storage_failure",
        }
    }

    /// Refusals detected before any write, as opposed to storage trouble.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::StorageFailure(_))
    }
}
