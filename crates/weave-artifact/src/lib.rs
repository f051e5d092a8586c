//! Weave Artifact Model
//!
//! Structured markup trees with stable positional addressing and content
//! hashing.
//!
//! # Core Concepts
//!
//! - [`Element`] / [`Node`]: owned markup tree with ordered attributes
//! - [`NodeRef`]: position of a node as child indices from the root
//! - [`ContentHash`]: 32-byte Blake3 digest used for cache keys
//! - [`Value`]: tagged value for schema-less condition data
//!
//! # Example
//!
//! ```rust
//! use weave_artifact::{parse_document, NodeRef};
//!
//! let tree = parse_document("<div><row/></div>").unwrap();
//! assert_eq!(tree.element_at(&NodeRef::new(vec![0])).unwrap().name, "row");
//! assert_eq!(tree.to_markup(), "<div><row/></div>");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod hash;
mod markup;
mod node;
mod path;
mod value;

pub use hash::{ContentHash, ContentHasher, HashError};
pub use markup::{fragment_to_markup, parse_document, parse_fragment, MarkupError};
pub use node::{Attributes, Element, Node};
pub use path::NodeRef;
pub use value::Value;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_element() -> impl Strategy<Value = Element> {
        let leaf = ("[a-z]{1,6}", proptest::collection::vec(("[a-z]{1,4}", "[ -~]{0,6}"), 0..3))
            .prop_map(|(name, attrs)| {
                let mut e = Element::new(name);
                for (k, v) in attrs {
                    e.attributes.set(k, v);
                }
                e
            });
        leaf.prop_recursive(4, 32, 4, |inner| {
            ("[a-z]{1,6}", proptest::collection::vec(inner, 0..4)).prop_map(|(name, kids)| {
                let mut e = Element::new(name);
                for kid in kids {
                    e.children.push(Node::Element(kid));
                }
                e
            })
        })
    }

    proptest! {
        #[test]
        fn canonical_markup_reparses_to_same_tree(tree in arb_element()) {
            let markup = tree.to_markup();
            let back = parse_document(&markup).unwrap();
            prop_assert_eq!(&back, &tree);
            prop_assert_eq!(back.content_hash(), tree.content_hash());
        }

        #[test]
        fn walk_visits_refs_in_sorted_order(tree in arb_element()) {
            let mut refs = Vec::new();
            tree.walk(|at, _| refs.push(at.clone()));
            let mut sorted = refs.clone();
            sorted.sort();
            prop_assert_eq!(refs, sorted);
        }
    }
}
