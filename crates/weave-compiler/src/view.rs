//! View definitions

use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use weave_artifact::{parse_document, ContentHasher, Element};
use weave_composition::{parse_patch, ViewExtension, DEFAULT_PRIORITY};

/// Named template, optionally inheriting from a parent view
///
/// A root view's `arch` is its markup tree. An inheriting view's `arch` is a
/// patch document against its parent (see [`weave_composition::parse_patch`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    /// Name-resolution slot this definition competes for
    pub name: String,
    /// Content: a tree for root views, a patch document otherwise
    pub arch: Element,
    /// Parent view name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit_id: Option<String>,
    /// Lower wins the name slot and runs first among patches
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Deactivated definitions are kept but ignored
    #[serde(default = "default_active")]
    pub active: bool,
    /// Owning module
    #[serde(default)]
    pub module: String,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_active() -> bool {
    true
}

impl ViewDefinition {
    /// Create an active root view
    #[must_use]
    pub fn new(name: impl Into<String>, arch: Element) -> Self {
        Self {
            name: name.into(),
            arch,
            inherit_id: None,
            priority: DEFAULT_PRIORITY,
            active: true,
            module: String::new(),
        }
    }

    /// Create from serialized markup
    ///
    /// # Errors
    /// Returns [`CompileError::InvalidMarkup`] if `markup` is not a
    /// well-formed document.
    pub fn from_markup(name: impl Into<String>, markup: &str) -> Result<Self, CompileError> {
        let name = name.into();
        let arch = parse_document(markup).map_err(|source| CompileError::InvalidMarkup {
            view: name.clone(),
            source,
        })?;
        Ok(Self::new(name, arch))
    }

    /// Builder: set parent view
    #[must_use]
    pub fn inheriting(mut self, parent: impl Into<String>) -> Self {
        self.inherit_id = Some(parent.into());
        self
    }

    /// Builder: set priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: set owning module
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Builder: set active flag
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Whether this view patches a parent
    #[inline]
    #[must_use]
    pub fn is_inheriting(&self) -> bool {
        self.inherit_id.is_some()
    }

    /// Patch directives of an inheriting view, empty for root views
    ///
    /// # Errors
    /// Returns [`CompileError::InvalidPatch`] if the patch document is
    /// malformed.
    pub fn patch_extensions(&self) -> Result<Vec<ViewExtension>, CompileError> {
        if !self.is_inheriting() {
            return Ok(Vec::new());
        }
        parse_patch(&self.name, self.priority, &self.module, &self.arch)
            .map_err(|e| CompileError::invalid_patch(&self.name, e))
    }

    /// Feed every compilation-relevant field into `hasher`
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher
            .update_str(&self.name)
            .update_opt_str(self.inherit_id.as_deref())
            .update_i64(i64::from(self.priority))
            .update_str(&self.module)
            .update_hash(&self.arch.content_hash());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_view_has_no_patch() {
        let view = ViewDefinition::from_markup("list", "<div><row/></div>").unwrap();
        assert!(view.patch_extensions().unwrap().is_empty());
        assert!(!view.is_inheriting());
    }

    #[test]
    fn inheriting_view_parses_patch() {
        let view = ViewDefinition::from_markup(
            "list_ext",
            r#"<data><xpath expr="//row" position="after"><footer/></xpath></data>"#,
        )
        .unwrap()
        .inheriting("list")
        .with_priority(5);
        let exts = view.patch_extensions().unwrap();
        assert_eq!(exts.len(), 1);
        assert_eq!(exts[0].priority, 5);
    }

    #[test]
    fn malformed_inputs() {
        assert!(matches!(
            ViewDefinition::from_markup("x", "<div>"),
            Err(CompileError::InvalidMarkup { .. })
        ));
        let bad = ViewDefinition::from_markup("x", "<div/>").unwrap().inheriting("list");
        assert!(matches!(bad.patch_extensions(), Err(CompileError::InvalidPatch { .. })));
    }

    #[test]
    fn hash_covers_parent_and_priority() {
        let hash = |v: &ViewDefinition| {
            let mut h = ContentHasher::new();
            v.hash_into(&mut h);
            h.finalize()
        };
        let base = ViewDefinition::from_markup("v", "<data/>").unwrap();
        assert_ne!(hash(&base), hash(&base.clone().inheriting("p")));
        assert_ne!(hash(&base), hash(&base.clone().with_priority(1)));
        assert_eq!(hash(&base), hash(&base.clone()));
    }
}
