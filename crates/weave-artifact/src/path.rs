//! Positional node references
//!
//! Provides [`NodeRef`] for addressing a node inside an [`Element`](crate::Element)
//! tree by its child indices from the root.

use std::fmt::{self, Display, Formatter};

/// Position of a node within a tree
///
/// A sequence of child indices starting at the root element. The root itself
/// is the empty reference. References are positional: they stay meaningful
/// only until an upstream sibling is inserted or removed, after which the
/// target has to be re-resolved.
///
/// The derived ordering is lexicographic over indices, which is exactly
/// document (pre-order) order: an ancestor sorts before its descendants and
/// earlier siblings sort before later ones.
///
/// # Examples
/// - `[]` → `/` (root element)
/// - `[0, 2]` → `/0/2` (third child of the root's first child)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeRef(Vec<usize>);

impl NodeRef {
    /// Create reference from child indices
    #[inline]
    #[must_use]
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// Reference to the root element
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Child indices from the root
    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Whether this references the root element
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Reference to the parent (None for the root)
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, rest)| Self(rest.to_vec()))
    }

    /// Index among the parent's children (None for the root)
    #[inline]
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Reference to the `index`-th child
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Whether `self` is a strict ancestor of `other`
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for index in &self.0 {
            write!(f, "/{index}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent() {
        assert!(NodeRef::root().is_root());
        assert!(NodeRef::root().parent().is_none());
        assert!(NodeRef::root().index().is_none());
    }

    #[test]
    fn parent_and_index() {
        let r = NodeRef::new(vec![0, 3, 1]);
        assert_eq!(r.parent(), Some(NodeRef::new(vec![0, 3])));
        assert_eq!(r.index(), Some(1));
    }

    #[test]
    fn ordering_is_document_order() {
        let mut refs = vec![
            NodeRef::new(vec![1]),
            NodeRef::new(vec![0, 0]),
            NodeRef::root(),
            NodeRef::new(vec![0]),
        ];
        refs.sort();
        assert_eq!(
            refs,
            vec![
                NodeRef::root(),
                NodeRef::new(vec![0]),
                NodeRef::new(vec![0, 0]),
                NodeRef::new(vec![1]),
            ]
        );
    }

    #[test]
    fn ancestor_check() {
        let a = NodeRef::new(vec![0]);
        let b = NodeRef::new(vec![0, 2]);
        assert!(a.is_ancestor_of(&b));
        assert!(!b.is_ancestor_of(&a));
        assert!(!a.is_ancestor_of(&a));
        assert!(NodeRef::root().is_ancestor_of(&a));
    }

    #[test]
    fn display() {
        assert_eq!(NodeRef::new(vec![0, 2]).to_string(), "/0/2");
        assert_eq!(NodeRef::root().to_string(), "/");
    }
}
