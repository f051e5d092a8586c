//! Ordering conflict diagnostics
//!
//! Extensions that share a view, priority and sequence are ordered only by
//! their ids. That is deterministic but rarely intended, so it is reported.

use crate::extension::{ExtensionId, ViewExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

/// Extensions whose relative order is decided by id alone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingConflict {
    pub view: String,
    pub priority: i32,
    pub sequence: i32,
    /// Involved extensions, in the order they will be applied
    pub extensions: Vec<ExtensionId>,
    /// Owning modules of the involved extensions
    pub modules: BTreeSet<String>,
}

impl OrderingConflict {
    /// Whether the tie spans more than one module
    #[inline]
    #[must_use]
    pub fn is_cross_module(&self) -> bool {
        self.modules.len() > 1
    }
}

impl Display for OrderingConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.extensions.iter().map(ExtensionId::as_str).collect();
        write!(
            f,
            "view '{}': extensions [{}] share priority {} and sequence {}; applied by id",
            self.view,
            ids.join(", "),
            self.priority,
            self.sequence
        )
    }
}

/// Find every (view, priority, sequence) shared by two or more extensions
///
/// Results are sorted by view, priority and sequence.
#[must_use]
pub fn detect_ordering_conflicts(extensions: &[ViewExtension]) -> Vec<OrderingConflict> {
    let mut groups: BTreeMap<(&str, i32, i32), Vec<&ViewExtension>> = BTreeMap::new();
    for extension in extensions {
        groups
            .entry((extension.view.as_str(), extension.priority, extension.sequence))
            .or_default()
            .push(extension);
    }

    groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|((view, priority, sequence), group)| {
            let mut ids: Vec<ExtensionId> = group.iter().map(|e| e.id.clone()).collect();
            ids.sort();
            OrderingConflict {
                view: view.to_string(),
                priority,
                sequence,
                extensions: ids,
                modules: group.iter().map(|e| e.module.clone()).collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Operation;

    fn ext(id: &str, view: &str, priority: i32, module: &str) -> ViewExtension {
        ViewExtension::new(id, view, "//a", Operation::Remove)
            .unwrap()
            .with_priority(priority)
            .with_module(module)
    }

    #[test]
    fn reports_shared_order_keys() {
        let conflicts = detect_ordering_conflicts(&[
            ext("z", "list", 10, "sales"),
            ext("a", "list", 10, "stock"),
            ext("m", "list", 20, "sales"),
            ext("q", "form", 10, "sales"),
        ]);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.view, "list");
        assert_eq!(conflict.extensions, vec![ExtensionId::new("a"), ExtensionId::new("z")]);
        assert!(conflict.is_cross_module());
        assert!(conflict.to_string().contains("[a, z]"));
    }

    #[test]
    fn distinct_sequences_do_not_conflict() {
        let conflicts = detect_ordering_conflicts(&[
            ext("a", "list", 10, "sales"),
            ext("b", "list", 10, "sales").with_sequence(1),
        ]);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn same_module_ties_are_reported() {
        let conflicts = detect_ordering_conflicts(&[ext("a", "list", 10, "sales"), ext("b", "list", 10, "sales")]);
        assert_eq!(conflicts.len(), 1);
        assert!(!conflicts[0].is_cross_module());
    }
}
