//! View extensions
//!
//! A [`ViewExtension`] is one patch registered against a view: a path
//! expression selecting target nodes and an [`Operation`] to perform on each.

use crate::condition::{Condition, ConditionSet};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use weave_artifact::{fragment_to_markup, parse_fragment, Attributes, ContentHash, ContentHasher, MarkupError, Node};
use weave_xpath::{ExprError, PathExpr};

/// Priority given to extensions that do not declare one
pub const DEFAULT_PRIORITY: i32 = 16;

/// Stable extension identifier
///
/// Identifiers are the final tie-breaker when priority and sequence collide,
/// so their ordering is part of the compilation result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    /// Create identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ExtensionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ExtensionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Operation kinds, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    InsertBefore,
    InsertAfter,
    Replace,
    Remove,
    PrependIntoChildren,
    AppendIntoChildren,
    Wrap,
    AttributeEdit,
}

impl OperationKind {
    /// Canonical kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsertBefore => "insert-before",
            Self::InsertAfter => "insert-after",
            Self::Replace => "replace",
            Self::Remove => "remove",
            Self::PrependIntoChildren => "prepend-into-children",
            Self::AppendIntoChildren => "append-into-children",
            Self::Wrap => "wrap",
            Self::AttributeEdit => "attribute-edit",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ExtensionError;

    /// Accepts canonical names and the short patch-document positions
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "insert-before" | "before" => Self::InsertBefore,
            "insert-after" | "after" => Self::InsertAfter,
            "replace" => Self::Replace,
            "remove" => Self::Remove,
            "prepend-into-children" | "prepend" => Self::PrependIntoChildren,
            "append-into-children" | "append" | "inside" => Self::AppendIntoChildren,
            "wrap" => Self::Wrap,
            "attribute-edit" | "attributes" => Self::AttributeEdit,
            other => return Err(ExtensionError::UnknownOperation(other.to_string())),
        })
    }
}

/// Attribute change set
///
/// Applied as: every `remove`, then every `add`, then every `set`. `add` and
/// `set` have the same effect; both verbs are kept to record author intent.
/// Removing an absent attribute is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AttributeChanges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<(String, String)>,
}

impl AttributeChanges {
    /// Empty change set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an attribute
    #[must_use]
    pub fn add(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add.push((name.into(), value.into()));
        self
    }

    /// Builder: remove an attribute
    #[must_use]
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    /// Builder: set an attribute
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set.push((name.into(), value.into()));
        self
    }

    /// Whether the change set does nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.set.is_empty()
    }

    /// Apply to an attribute map
    pub fn apply_to(&self, attributes: &mut Attributes) {
        for name in &self.remove {
            attributes.remove(name);
        }
        for (name, value) in self.add.iter().chain(&self.set) {
            attributes.set(name.clone(), value.clone());
        }
    }
}

/// Patch operation with its payload
///
/// `Remove` carries nothing and `AttributeEdit` carries no content, so the
/// payload invariants hold by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Operation {
    /// Splice content before the target, keeping the target
    InsertBefore { content: Vec<Node> },
    /// Splice content after the target, keeping the target
    InsertAfter { content: Vec<Node> },
    /// Substitute the target with content
    Replace { content: Vec<Node> },
    /// Delete the target and its subtree
    Remove,
    /// Insert content at the start of the target's children
    PrependIntoChildren { content: Vec<Node> },
    /// Insert content at the end of the target's children
    AppendIntoChildren { content: Vec<Node> },
    /// Move the target inside a new parent element at its insertion point
    Wrap { content: Vec<Node> },
    /// Edit the target's attributes
    AttributeEdit { changes: AttributeChanges },
}

impl Operation {
    /// Build a content-carrying operation from its kind and payload
    ///
    /// # Errors
    /// `Remove` with content is rejected; `AttributeEdit` needs
    /// [`Operation::AttributeEdit`] directly.
    pub fn with_content(kind: OperationKind, content: Vec<Node>) -> Result<Self, ExtensionError> {
        Ok(match kind {
            OperationKind::InsertBefore => Self::InsertBefore { content },
            OperationKind::InsertAfter => Self::InsertAfter { content },
            OperationKind::Replace => Self::Replace { content },
            OperationKind::PrependIntoChildren => Self::PrependIntoChildren { content },
            OperationKind::AppendIntoChildren => Self::AppendIntoChildren { content },
            OperationKind::Wrap => Self::Wrap { content },
            OperationKind::Remove if content.is_empty() => Self::Remove,
            OperationKind::Remove | OperationKind::AttributeEdit => {
                return Err(ExtensionError::PayloadNotAllowed(kind))
            }
        })
    }

    /// Build a content-carrying operation from serialized markup
    ///
    /// # Errors
    /// Returns error if the markup is malformed or the kind takes no content.
    pub fn from_markup(kind: OperationKind, markup: &str) -> Result<Self, ExtensionError> {
        Self::with_content(kind, parse_fragment(markup)?)
    }

    /// Kind without payload
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::InsertBefore { .. } => OperationKind::InsertBefore,
            Self::InsertAfter { .. } => OperationKind::InsertAfter,
            Self::Replace { .. } => OperationKind::Replace,
            Self::Remove => OperationKind::Remove,
            Self::PrependIntoChildren { .. } => OperationKind::PrependIntoChildren,
            Self::AppendIntoChildren { .. } => OperationKind::AppendIntoChildren,
            Self::Wrap { .. } => OperationKind::Wrap,
            Self::AttributeEdit { .. } => OperationKind::AttributeEdit,
        }
    }

    /// Content payload, if the kind carries one
    #[must_use]
    pub fn content(&self) -> Option<&[Node]> {
        match self {
            Self::InsertBefore { content }
            | Self::InsertAfter { content }
            | Self::Replace { content }
            | Self::PrependIntoChildren { content }
            | Self::AppendIntoChildren { content }
            | Self::Wrap { content } => Some(content),
            Self::Remove | Self::AttributeEdit { .. } => None,
        }
    }

    fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher.update_str(self.kind().as_str());
        if let Some(content) = self.content() {
            hasher.update_str(&fragment_to_markup(content));
        }
        if let Self::AttributeEdit { changes } = self {
            for (verb, pairs) in [("add", &changes.add), ("set", &changes.set)] {
                hasher.update_str(verb).update_i64(pairs.len() as i64);
                for (name, value) in pairs {
                    hasher.update_str(name).update_str(value);
                }
            }
            hasher.update_str("remove").update_i64(changes.remove.len() as i64);
            for name in &changes.remove {
                hasher.update_str(name);
            }
        }
    }
}

/// One patch registered against a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewExtension {
    /// Unique identifier
    pub id: ExtensionId,
    /// Name of the view this extension targets
    pub view: String,
    /// Target selector, validated at construction
    pub xpath: PathExpr,
    /// What to do with each target
    pub operation: Operation,
    /// Coarse ordering (lower first)
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Fine ordering within a priority (lower first)
    #[serde(default)]
    pub sequence: i32,
    /// Applicability conditions (all must hold)
    #[serde(default, skip_serializing_if = "ConditionSet::is_unconditional")]
    pub conditions: ConditionSet,
    /// Owning module
    #[serde(default)]
    pub module: String,
    /// Whether the owning module currently enables this extension
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_active() -> bool {
    true
}

impl ViewExtension {
    /// Create an active extension with default ordering
    ///
    /// # Errors
    /// Returns [`ExtensionError::InvalidExpression`] if `xpath` is malformed,
    /// so broken patches are caught when they are registered.
    pub fn new(
        id: impl Into<ExtensionId>,
        view: impl Into<String>,
        xpath: &str,
        operation: Operation,
    ) -> Result<Self, ExtensionError> {
        Ok(Self {
            id: id.into(),
            view: view.into(),
            xpath: PathExpr::parse(xpath)?,
            operation,
            priority: DEFAULT_PRIORITY,
            sequence: 0,
            conditions: ConditionSet::default(),
            module: String::new(),
            active: true,
        })
    }

    /// Builder: set priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set sequence
    #[must_use]
    pub fn with_sequence(mut self, sequence: i32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Builder: set owning module
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Builder: add a condition
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Builder: set active flag
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Total application order: priority, then sequence, then id
    #[must_use]
    pub fn order_key(&self) -> (i32, i32, &ExtensionId) {
        (self.priority, self.sequence, &self.id)
    }

    /// Hash of everything that can influence compilation
    ///
    /// Covers the static portion only: conditions are hashed as declared, not
    /// as evaluated, so changing an extension whose condition is currently
    /// false still changes the hash.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        let mut hasher = ContentHasher::new();
        hasher
            .update_str(self.id.as_str())
            .update_str(&self.view)
            .update_str(self.xpath.source());
        self.operation.hash_into(&mut hasher);
        hasher
            .update_i64(i64::from(self.priority))
            .update_i64(i64::from(self.sequence));
        self.conditions.hash_into(&mut hasher);
        hasher.update_str(&self.module);
        hasher.finalize()
    }
}

/// Errors building or registering an extension
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// Path expression is malformed
    #[error("invalid expression: {0}")]
    InvalidExpression(#[from] ExprError),

    /// Payload markup is malformed
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] MarkupError),

    /// Unrecognised operation name
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Kind does not take content
    #[error("operation '{0}' does not take a content payload")]
    PayloadNotAllowed(OperationKind),
}
