//! Compiled view artifacts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use weave_artifact::{ContentHash, Element};
use weave_composition::{ApplicationLog, ExtensionId};

/// Output of compiling one view under one context
///
/// Valid for as long as [`content_hash`](Self::content_hash) matches the hash
/// recomputed from current definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledView {
    pub view: String,
    pub context_signature: ContentHash,
    /// Inheritance chain, root to leaf
    pub chain: Vec<String>,
    pub tree: Element,
    /// Digest of every input that can affect `tree`
    pub content_hash: ContentHash,
    /// Extensions that changed the tree, in application order
    pub applied: Vec<ExtensionId>,
    pub log: ApplicationLog,
    pub compiled_at: DateTime<Utc>,
    pub duration: Duration,
}

impl CompiledView {
    /// Compact markup of the compiled tree
    #[inline]
    #[must_use]
    pub fn to_markup(&self) -> String {
        self.tree.to_markup()
    }

    /// Indented markup of the compiled tree
    #[inline]
    #[must_use]
    pub fn to_pretty_markup(&self) -> String {
        self.tree.to_pretty_markup(2)
    }
}

/// How a compilation result was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CompileStatus {
    /// Compiled just now
    Fresh,
    /// Stored artifact still matched its inputs
    Cached,
    /// Compilation failed; this is the last artifact that succeeded
    Stale { reason: String },
}

/// Artifact plus provenance
#[derive(Debug, Clone)]
pub struct Compilation {
    pub artifact: Arc<CompiledView>,
    pub status: CompileStatus,
}

impl Compilation {
    /// Freshly compiled artifact
    #[inline]
    #[must_use]
    pub fn fresh(artifact: Arc<CompiledView>) -> Self {
        Self {
            artifact,
            status: CompileStatus::Fresh,
        }
    }

    /// Artifact served from the store
    #[inline]
    #[must_use]
    pub fn cached(artifact: Arc<CompiledView>) -> Self {
        Self {
            artifact,
            status: CompileStatus::Cached,
        }
    }

    /// Previous artifact standing in for a failed compilation
    #[inline]
    #[must_use]
    pub fn stale(artifact: Arc<CompiledView>, reason: impl Into<String>) -> Self {
        Self {
            artifact,
            status: CompileStatus::Stale {
                reason: reason.into(),
            },
        }
    }

    /// Whether this is a stand-in for a failed compilation
    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self.status, CompileStatus::Stale { .. })
    }
}
