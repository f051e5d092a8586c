//! Weave Path Expressions
//!
//! Locates nodes inside view trees with a restricted XPath subset: child and
//! descendant steps, tag names and `*`, attribute predicates and positional
//! predicates.
//!
//! Malformed expressions are rejected by [`PathExpr::parse`], which callers
//! run when an extension is registered. A well-formed expression that matches
//! nothing simply returns an empty selection.
//!
//! # Example
//!
//! ```rust
//! use weave_artifact::parse_document;
//! use weave_xpath::PathExpr;
//!
//! let tree = parse_document("<div><row/><row id='2'/></div>").unwrap();
//! let expr = PathExpr::parse("//row[@id='2']").unwrap();
//! assert_eq!(expr.select(&tree).len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod eval;
mod expr;

pub use expr::{ExprError, PathExpr};

use weave_artifact::{Element, NodeRef};

/// Parse `expression` and select its matches in `root`
///
/// # Errors
/// Returns [`ExprError`] if the expression is malformed.
pub fn select(root: &Element, expression: &str) -> Result<Vec<NodeRef>, ExprError> {
    Ok(PathExpr::parse(expression)?.select(root))
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use proptest::prelude::*;
    use weave_artifact::Node;

    fn arb_tree() -> impl Strategy<Value = Element> {
        let leaf = prop_oneof![Just("a"), Just("b"), Just("c")]
            .prop_map(|name| Element::new(name));
        leaf.prop_recursive(4, 40, 4, |inner| {
            (
                prop_oneof![Just("a"), Just("b"), Just("c")],
                proptest::collection::vec(inner, 0..4),
            )
                .prop_map(|(name, kids)| {
                    let mut e = Element::new(name);
                    e.children.extend(kids.into_iter().map(Node::Element));
                    e
                })
        })
    }

    proptest! {
        #[test]
        fn selections_are_sorted_unique_and_resolvable(
            tree in arb_tree(),
            expr in prop_oneof![
                Just("//a"), Just("//b/a"), Just("a//b"), Just("//*[1]"),
                Just("//c[last()]"), Just("/a/*"), Just("//a//a"),
            ],
        ) {
            let refs = select(&tree, expr).unwrap();
            let mut sorted = refs.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(&refs, &sorted);
            for r in &refs {
                prop_assert!(tree.element_at(r).is_some());
            }
        }

        #[test]
        fn descendant_name_step_matches_walk(tree in arb_tree()) {
            let mut expected = Vec::new();
            tree.walk(|at, e| if e.name == "b" { expected.push(at.clone()) });
            prop_assert_eq!(select(&tree, "//b").unwrap(), expected);
        }
    }

    #[test]
    fn select_rejects_bad_expression() {
        let tree = Element::new("a");
        assert!(select(&tree, "a[").is_err());
        assert!(select(&tree, "//zzz").unwrap().is_empty());
    }
}
