//! Error types for view compilation
//!
//! Covers:
//! - Inheritance chain resolution (missing views, cycles, depth)
//! - Definition validation at registration time
//! - Definition store failures

use weave_artifact::MarkupError;
use weave_composition::{ExtensionError, PatchError};

/// Errors from the definition store backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Backend could not be reached or returned garbage
    #[error("store backend error: {0}")]
    Backend(String),

    /// Stored record could not be decoded
    #[error("corrupt record for '{key}': {message}")]
    Corrupt { key: String, message: String },
}

/// Errors during view registration and compilation
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// Requested view has no active definition
    #[error("view not found: '{0}'")]
    ViewNotFound(String),

    /// A link in the chain names a parent with no active definition
    #[error("view '{view}' inherits from missing view '{parent}'")]
    MissingAncestor { view: String, parent: String },

    /// Inheritance pointers loop back on themselves
    #[error("cyclic inheritance: {}", .cycle.join(" -> "))]
    CyclicInheritance {
        /// Names along the loop, first name repeated at the end
        cycle: Vec<String>,
    },

    /// Chain longer than the configured limit
    #[error("inheritance chain of '{view}' exceeds {limit} views")]
    ChainTooDeep { view: String, limit: usize },

    /// Extension could not be built or is malformed
    #[error("invalid extension: {0}")]
    InvalidExtension(#[from] ExtensionError),

    /// Inheriting view's patch document is malformed
    #[error("invalid patch in view '{view}': {source}")]
    InvalidPatch {
        view: String,
        #[source]
        source: PatchError,
    },

    /// View content is not well-formed markup
    #[error("invalid markup in view '{view}': {source}")]
    InvalidMarkup {
        view: String,
        #[source]
        source: MarkupError,
    },

    /// Definition store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CompileError {
    /// Create missing ancestor error
    pub fn missing_ancestor(view: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::MissingAncestor {
            view: view.into(),
            parent: parent.into(),
        }
    }

    /// Create invalid patch error
    pub fn invalid_patch(view: impl Into<String>, source: PatchError) -> Self {
        Self::InvalidPatch {
            view: view.into(),
            source,
        }
    }

    /// Whether this error aborts compilation of a view that otherwise exists
    ///
    /// Fatal errors are the ones a previously compiled artifact may stand in
    /// for. A view that no longer exists, or a failing store, is not.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingAncestor { .. }
                | Self::CyclicInheritance { .. }
                | Self::ChainTooDeep { .. }
                | Self::InvalidExtension(_)
                | Self::InvalidPatch { .. }
                | Self::InvalidMarkup { .. }
        )
    }

    /// Whether this error is raised when a definition is written
    #[must_use]
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::CyclicInheritance { .. }
                | Self::InvalidExtension(_)
                | Self::InvalidPatch { .. }
                | Self::InvalidMarkup { .. }
        )
    }
}
