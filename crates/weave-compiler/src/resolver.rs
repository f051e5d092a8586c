//! Inheritance chain resolution

use crate::error::CompileError;
use crate::store::DefinitionStore;
use crate::view::ViewDefinition;
use std::sync::Arc;

/// Resolve `view`'s ancestor chain, root first, `view` last
///
/// Walks `inherit_id` pointers upward until a view without a parent.
///
/// # Errors
/// - [`CompileError::ViewNotFound`] if `view` itself has no active definition
/// - [`CompileError::MissingAncestor`] if a parent has no active definition
/// - [`CompileError::CyclicInheritance`] if a name repeats
/// - [`CompileError::ChainTooDeep`] past `max_depth` links
pub fn resolve_chain<S: DefinitionStore + ?Sized>(
    store: &S,
    view: &str,
    max_depth: usize,
) -> Result<Vec<Arc<ViewDefinition>>, CompileError> {
    let leaf = store
        .get_view_definition(view)?
        .ok_or_else(|| CompileError::ViewNotFound(view.to_string()))?;

    let mut chain = vec![leaf];
    loop {
        let Some(current) = chain.last() else {
            break;
        };
        let Some(parent) = current.inherit_id.clone() else {
            break;
        };

        if let Some(start) = chain.iter().position(|d| d.name == parent) {
            // chain is leaf-first here; report the loop in inheritance order
            let mut cycle: Vec<String> = chain[start..].iter().map(|d| d.name.clone()).collect();
            cycle.push(parent);
            return Err(CompileError::CyclicInheritance { cycle });
        }
        if chain.len() >= max_depth {
            return Err(CompileError::ChainTooDeep {
                view: view.to_string(),
                limit: max_depth,
            });
        }

        let definition = store
            .get_view_definition(&parent)?
            .ok_or_else(|| CompileError::missing_ancestor(&current.name, &parent))?;
        chain.push(definition);
    }

    chain.reverse();
    tracing::debug!(
        view,
        chain = ?chain.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
        "resolved inheritance chain"
    );
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use weave_artifact::Element;

    fn add(store: &MemoryStore, name: &str, parent: Option<&str>) {
        let mut view = ViewDefinition::new(name, Element::new(if parent.is_some() { "data" } else { "div" }));
        view.inherit_id = parent.map(str::to_string);
        store.put_view(view).unwrap();
    }

    fn names(chain: &[Arc<ViewDefinition>]) -> Vec<&str> {
        chain.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn root_to_leaf() {
        let store = MemoryStore::new();
        add(&store, "base", None);
        add(&store, "mid", Some("base"));
        add(&store, "leaf", Some("mid"));
        assert_eq!(names(&resolve_chain(&store, "leaf", 64).unwrap()), vec!["base", "mid", "leaf"]);
        assert_eq!(names(&resolve_chain(&store, "base", 64).unwrap()), vec!["base"]);
    }

    #[test]
    fn missing_view_and_ancestor() {
        let store = MemoryStore::new();
        add(&store, "orphan", Some("gone"));
        assert!(matches!(
            resolve_chain(&store, "nope", 64),
            Err(CompileError::ViewNotFound(name)) if name == "nope"
        ));
        match resolve_chain(&store, "orphan", 64) {
            Err(CompileError::MissingAncestor { view, parent }) => {
                assert_eq!((view.as_str(), parent.as_str()), ("orphan", "gone"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn inactive_parent_is_missing() {
        let store = MemoryStore::new();
        add(&store, "base", None);
        add(&store, "child", Some("base"));
        store.set_view_active("base", "", false);
        assert!(matches!(
            resolve_chain(&store, "child", 64),
            Err(CompileError::MissingAncestor { .. })
        ));
    }

    #[test]
    fn depth_limit() {
        let store = MemoryStore::new();
        add(&store, "v0", None);
        for i in 1..5 {
            add(&store, &format!("v{i}"), Some(&format!("v{}", i - 1)));
        }
        assert_eq!(resolve_chain(&store, "v4", 5).unwrap().len(), 5);
        assert!(matches!(
            resolve_chain(&store, "v4", 4),
            Err(CompileError::ChainTooDeep { limit: 4, .. })
        ));
    }

    #[test]
    fn cycle_detected_at_resolution() {
        // write-time checks only see active definitions; activation can still
        // close a loop
        let store = MemoryStore::new();
        add(&store, "a", None);
        let mut looped = ViewDefinition::new("a", Element::new("data")).with_module("other");
        looped.inherit_id = Some("b".to_string());
        looped.active = false;
        store.put_view(looped).unwrap();
        add(&store, "b", Some("a"));
        store.set_view_active("a", "", false);
        store.set_view_active("a", "other", true);

        match resolve_chain(&store, "b", 64) {
            Err(CompileError::CyclicInheritance { cycle }) => assert_eq!(cycle, vec!["b", "a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
