//! Weave Composition
//!
//! Applies ordered, conditional patches to view trees.
//!
//! # Core Concepts
//!
//! - [`ViewExtension`]: a path expression plus an [`Operation`]
//! - [`Condition`] / [`CompileContext`]: decide whether an extension applies
//! - [`ExtensionApplier`]: applies extensions in (priority, sequence, id)
//!   order, logging one [`Outcome`] per extension
//! - [`parse_patch`]: turns an inheriting view's patch document into
//!   extensions
//! - [`detect_ordering_conflicts`]: reports order keys decided by id alone
//!
//! # Example
//!
//! ```rust
//! use weave_artifact::parse_document;
//! use weave_composition::{CompileContext, ExtensionApplier, Operation, OperationKind, ViewExtension};
//!
//! let base = parse_document("<list><row/></list>").unwrap();
//! let footer = ViewExtension::new(
//!     "add_footer",
//!     "list",
//!     "//row",
//!     Operation::from_markup(OperationKind::InsertAfter, "<footer/>").unwrap(),
//! )
//! .unwrap();
//!
//! let out = ExtensionApplier::new().apply(&base, &[footer], &CompileContext::new());
//! assert_eq!(out.tree.to_markup(), "<list><row/><footer/></list>");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod applier;
mod condition;
mod conflict;
mod extension;
mod patch;

pub use applier::{
    apply_operation, Application, ApplicationLog, ApplyError, ExtensionApplier, LogEntry, Outcome,
    WRAP_SLOT,
};
pub use condition::{eligible, CompileContext, Condition, ConditionSet};
pub use conflict::{detect_ordering_conflicts, OrderingConflict};
pub use extension::{
    AttributeChanges, ExtensionError, ExtensionId, Operation, OperationKind, ViewExtension,
    DEFAULT_PRIORITY,
};
pub use patch::{parse_patch, DirectiveError, PatchError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
