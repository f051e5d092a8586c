//! Definition store
//!
//! The compiler reads view definitions and extensions, and reads and writes
//! compiled artifacts, only through [`DefinitionStore`]. [`MemoryStore`] is
//! the concurrent in-process implementation.

use crate::artifact::CompiledView;
use crate::error::{CompileError, StoreError};
use crate::view::ViewDefinition;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use weave_artifact::ContentHash;
use weave_composition::{ExtensionId, ViewExtension};

/// Read/write access to definitions and compiled artifacts
///
/// Implementations must be safe to share between threads. Writes of compiled
/// artifacts are last-writer-wins.
pub trait DefinitionStore: Send + Sync {
    /// Active definition resolving `name`, if any
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend fails.
    fn get_view_definition(&self, name: &str) -> Result<Option<Arc<ViewDefinition>>, StoreError>;

    /// Active extensions registered against `view`, in application order
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend fails.
    fn list_active_extensions(&self, view: &str) -> Result<Vec<ViewExtension>, StoreError>;

    /// Names of views whose active definition inherits from `view`
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend fails.
    fn list_children(&self, view: &str) -> Result<Vec<String>, StoreError>;

    /// Stored artifact for (`view`, `signature`)
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend fails.
    fn get_compiled_view(&self, view: &str, signature: &ContentHash) -> Result<Option<Arc<CompiledView>>, StoreError>;

    /// Store an artifact, replacing any for the same view and signature
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend fails.
    fn put_compiled_view(&self, compiled: Arc<CompiledView>) -> Result<(), StoreError>;
}

/// In-memory store backed by [`DashMap`]
///
/// Several definitions may share a name (one per module). The active one with
/// the lowest priority resolves the name; ties go to the lowest module id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    views: DashMap<String, Vec<Arc<ViewDefinition>>>,
    extensions: DashMap<ExtensionId, ViewExtension>,
    compiled: DashMap<(String, ContentHash), Arc<CompiledView>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a view definition
    ///
    /// A definition from the same module under the same name is replaced.
    ///
    /// # Errors
    /// - [`CompileError::CyclicInheritance`] if the parent chain leads back
    ///   to this name
    /// - [`CompileError::InvalidPatch`] if an inheriting view's patch document
    ///   is malformed
    pub fn put_view(&self, definition: ViewDefinition) -> Result<(), CompileError> {
        definition.patch_extensions()?;
        if let Some(parent) = &definition.inherit_id {
            self.check_acyclic(&definition.name, parent)?;
        }

        tracing::debug!(view = %definition.name, module = %definition.module, "registered view");
        let definition = Arc::new(definition);
        let mut slot = self.views.entry(definition.name.clone()).or_default();
        match slot.iter().position(|d| d.module == definition.module) {
            Some(index) => slot[index] = definition,
            None => slot.push(definition),
        }
        Ok(())
    }

    /// Walk up from `parent`; reaching `name` again means a cycle
    fn check_acyclic(&self, name: &str, parent: &str) -> Result<(), CompileError> {
        let mut cycle = vec![name.to_string()];
        let mut current = Some(parent.to_string());
        while let Some(next) = current {
            cycle.push(next.clone());
            if next == name {
                return Err(CompileError::CyclicInheritance { cycle });
            }
            if cycle[..cycle.len() - 1].contains(&next) {
                // pre-existing loop not involving `name`; resolution reports it
                return Ok(());
            }
            current = self.resolve(&next).and_then(|d| d.inherit_id.clone());
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<Arc<ViewDefinition>> {
        let slot = self.views.get(name)?;
        slot.iter()
            .filter(|d| d.active)
            .min_by(|a, b| (a.priority, &a.module).cmp(&(b.priority, &b.module)))
            .cloned()
    }

    /// Toggle a definition; returns whether it exists
    pub fn set_view_active(&self, name: &str, module: &str, active: bool) -> bool {
        let Some(mut slot) = self.views.get_mut(name) else {
            return false;
        };
        match slot.iter_mut().find(|d| d.module == module) {
            Some(definition) => {
                Arc::make_mut(definition).active = active;
                true
            }
            None => false,
        }
    }

    /// Delete a definition; returns whether it existed
    pub fn remove_view(&self, name: &str, module: &str) -> bool {
        let Some(mut slot) = self.views.get_mut(name) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|d| d.module != module);
        before != slot.len()
    }

    /// Names with at least one definition, sorted
    #[must_use]
    pub fn view_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .views
            .iter()
            .filter(|slot| !slot.value().is_empty())
            .map(|slot| slot.key().clone())
            .collect();
        names.into_iter().collect()
    }

    /// Register or replace an extension by id
    ///
    /// Path expressions are validated when a [`ViewExtension`] is built or
    /// deserialized, so a stored extension always has a well-formed selector.
    pub fn put_extension(&self, extension: ViewExtension) {
        tracing::debug!(extension = %extension.id, view = %extension.view, "registered extension");
        self.extensions.insert(extension.id.clone(), extension);
    }

    /// Toggle an extension; returns whether it exists
    pub fn set_extension_active(&self, id: &ExtensionId, active: bool) -> bool {
        match self.extensions.get_mut(id) {
            Some(mut extension) => {
                extension.active = active;
                true
            }
            None => false,
        }
    }

    /// Delete an extension; returns it if it existed
    pub fn remove_extension(&self, id: &ExtensionId) -> Option<ViewExtension> {
        self.extensions.remove(id).map(|(_, e)| e)
    }

    /// Every extension, active or not, sorted by id
    #[must_use]
    pub fn all_extensions(&self) -> Vec<ViewExtension> {
        let mut all: Vec<ViewExtension> = self.extensions.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Number of stored compiled artifacts
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.compiled.len()
    }
}

impl DefinitionStore for MemoryStore {
    fn get_view_definition(&self, name: &str) -> Result<Option<Arc<ViewDefinition>>, StoreError> {
        Ok(self.resolve(name))
    }

    fn list_active_extensions(&self, view: &str) -> Result<Vec<ViewExtension>, StoreError> {
        let mut active: Vec<ViewExtension> = self
            .extensions
            .iter()
            .filter(|e| e.active && e.view == view)
            .map(|e| e.value().clone())
            .collect();
        active.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(active)
    }

    fn list_children(&self, view: &str) -> Result<Vec<String>, StoreError> {
        let names: Vec<String> = self.views.iter().map(|slot| slot.key().clone()).collect();
        let mut children: Vec<String> = names
            .into_iter()
            .filter(|name| {
                self.resolve(name)
                    .is_some_and(|d| d.inherit_id.as_deref() == Some(view))
            })
            .collect();
        children.sort();
        Ok(children)
    }

    fn get_compiled_view(&self, view: &str, signature: &ContentHash) -> Result<Option<Arc<CompiledView>>, StoreError> {
        Ok(self
            .compiled
            .get(&(view.to_string(), *signature))
            .map(|c| Arc::clone(c.value())))
    }

    fn put_compiled_view(&self, compiled: Arc<CompiledView>) -> Result<(), StoreError> {
        self.compiled
            .insert((compiled.view.clone(), compiled.context_signature), compiled);
        Ok(())
    }
}
