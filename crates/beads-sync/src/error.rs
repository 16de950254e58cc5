//! Error types for the synchronization core.

use beads_storage::error::StorageError;

/// Errors raised while validating, routing, or merging an import batch.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A rename was requested but no local prefix is configured.
    #[error("rename-on-import requires a configured local prefix")]
    NoLocalPrefix,

    /// A route pointed at a directory that does not resolve.
    #[error("route for prefix {prefix} does not resolve to a directory: {path}")]
    UnresolvedRoute {
        /// The prefix whose route could not be resolved.
        prefix: String,
        /// The path that was attempted.
        path: String,
    },

    /// The batch contains the same external reference on more than one
    /// record and `clearDuplicateExternalRefs` was not requested.
    #[error("duplicate external references: {0}")]
    DuplicateExternalRef(String),

    /// The batch contains IDs outside the allowed prefix set and no
    /// tolerant policy (`renameOnImport`, `skipPrefixValidation`) applies.
    #[error("prefix mismatch: {0}")]
    PrefixMismatch(String),

    /// `orphanHandling = strict` and a dotted ID's parent is missing.
    #[error("orphan record {id} has no parent {parent_id} (strict mode)")]
    OrphanParentMissing {
        /// The orphaned record's ID.
        id: String,
        /// The missing parent ID.
        parent_id: String,
    },

    /// A rename collided with a target that already has different content.
    #[error("rename of {old_id} to {new_id} conflicts with different content at target")]
    RenameConflict {
        /// The ID being renamed away from.
        old_id: String,
        /// The ID being renamed to.
        new_id: String,
    },

    /// A storage-level failure that is not attributable to a specific
    /// business rule above.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Returns `true` for errors that represent a batch-integrity failure
    /// (as opposed to a configuration or storage failure).
    pub fn is_batch_integrity(&self) -> bool {
        matches!(
            self,
            Self::DuplicateExternalRef(_) | Self::PrefixMismatch(_) | Self::OrphanParentMissing { .. }
        )
    }
}
