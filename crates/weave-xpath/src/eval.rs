//! Expression evaluation against element trees
//!
//! Evaluation starts from a virtual document node whose only child is the
//! root element. Each step maps the current context set to the elements it
//! selects; positional predicates count among the candidates sharing a parent,
//! as in XPath. The final set is returned de-duplicated in document order.

use crate::expr::{Axis, PathExpr, Predicate, Step};
use std::collections::BTreeSet;
use weave_artifact::{Element, NodeRef};

/// Evaluation context: the virtual document, or an element
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Context {
    Document,
    Element(NodeRef),
}

impl PathExpr {
    /// Select matching elements in document order
    ///
    /// An empty result is not an error: callers decide how to treat a
    /// target that no longer exists.
    #[must_use]
    pub fn select(&self, root: &Element) -> Vec<NodeRef> {
        let mut contexts = BTreeSet::from([Context::Document]);
        for step in &self.steps {
            contexts = apply_step(root, &contexts, step)
                .into_iter()
                .map(Context::Element)
                .collect();
            if contexts.is_empty() {
                break;
            }
        }
        contexts
            .into_iter()
            .filter_map(|c| match c {
                Context::Element(r) => Some(r),
                Context::Document => None,
            })
            .collect()
    }

    /// First match in document order
    #[must_use]
    pub fn select_first(&self, root: &Element) -> Option<NodeRef> {
        self.select(root).into_iter().next()
    }
}

fn apply_step(root: &Element, contexts: &BTreeSet<Context>, step: &Step) -> BTreeSet<NodeRef> {
    let parents: BTreeSet<Context> = match step.axis {
        Axis::Child => contexts.clone(),
        Axis::Descendant => contexts
            .iter()
            .flat_map(|c| descendants_or_self(root, c))
            .collect(),
    };

    let mut selected = BTreeSet::new();
    for parent in &parents {
        let mut candidates: Vec<(NodeRef, &Element)> = children(root, parent)
            .into_iter()
            .filter(|(_, e)| step.test.accepts(&e.name))
            .collect();
        for predicate in &step.predicates {
            candidates = filter(candidates, predicate);
        }
        selected.extend(candidates.into_iter().map(|(r, _)| r));
    }
    selected
}

fn filter<'a>(
    candidates: Vec<(NodeRef, &'a Element)>,
    predicate: &Predicate,
) -> Vec<(NodeRef, &'a Element)> {
    match predicate {
        Predicate::AttrEquals { name, value } => candidates
            .into_iter()
            .filter(|(_, e)| e.attr(name) == Some(value.as_str()))
            .collect(),
        Predicate::AttrExists(name) => candidates
            .into_iter()
            .filter(|(_, e)| e.attributes.contains(name))
            .collect(),
        Predicate::Position(n) => candidates.into_iter().nth(n - 1).into_iter().collect(),
        Predicate::Last => candidates.into_iter().last().into_iter().collect(),
    }
}

fn children<'a>(root: &'a Element, context: &Context) -> Vec<(NodeRef, &'a Element)> {
    match context {
        Context::Document => vec![(NodeRef::root(), root)],
        Context::Element(at) => root
            .element_at(at)
            .map(|parent| {
                parent
                    .child_elements()
                    .map(|(i, e)| (at.child(i), e))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn descendants_or_self(root: &Element, context: &Context) -> Vec<Context> {
    let mut out = vec![context.clone()];
    match context {
        Context::Document => root.walk(|at, _| out.push(Context::Element(at.clone()))),
        Context::Element(base) => {
            if let Some(element) = root.element_at(base) {
                element.walk(|at, _| {
                    if !at.is_root() {
                        let mut indices = base.indices().to_vec();
                        indices.extend_from_slice(at.indices());
                        out.push(Context::Element(NodeRef::new(indices)));
                    }
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_artifact::parse_document;

    fn tree() -> Element {
        parse_document(
            r#"<form>
                <group name="a">
                    <field name="x"/>
                    <field name="y" invisible="1"/>
                </group>
                <group name="b">
                    <field name="z"/>
                    <div><field name="w"/></div>
                </group>
            </form>"#,
        )
        .unwrap()
    }

    fn select(expr: &str) -> Vec<String> {
        let root = tree();
        PathExpr::parse(expr)
            .unwrap()
            .select(&root)
            .into_iter()
            .map(|r| r.to_string())
            .collect()
    }

    #[test]
    fn absolute_path() {
        assert_eq!(select("/form"), vec!["/"]);
        assert_eq!(select("/form/group"), vec!["/0", "/1"]);
        assert_eq!(select("/group"), Vec::<String>::new());
    }

    #[test]
    fn descendant_path_in_document_order() {
        assert_eq!(select("//field"), vec!["/0/0", "/0/1", "/1/0", "/1/1/0"]);
        assert_eq!(select("//group//field"), vec!["/0/0", "/0/1", "/1/0", "/1/1/0"]);
    }

    #[test]
    fn relative_matches_anywhere() {
        assert_eq!(select("field"), select("//field"));
        assert_eq!(select("div/field"), vec!["/1/1/0"]);
    }

    #[test]
    fn attribute_predicates() {
        assert_eq!(select("//field[@name='z']"), vec!["/1/0"]);
        assert_eq!(select("//field[@invisible]"), vec!["/0/1"]);
        assert_eq!(select("//group[@name='b']/field"), vec!["/1/0"]);
        assert_eq!(select("//field[@name='nope']"), Vec::<String>::new());
    }

    #[test]
    fn positional_predicates_count_per_parent() {
        // first field child of each parent
        assert_eq!(select("//field[1]"), vec!["/0/0", "/1/0", "/1/1/0"]);
        assert_eq!(select("//group[last()]"), vec!["/1"]);
        assert_eq!(select("/form/group[2]/field[first()]"), vec!["/1/0"]);
        assert_eq!(select("//group/*[2]"), vec!["/0/1", "/1/1"]);
        assert_eq!(select("//group[3]"), Vec::<String>::new());
    }

    #[test]
    fn predicates_apply_in_sequence() {
        // filter then index vs index then filter
        assert_eq!(select("/form/group/field[@name='y'][1]"), vec!["/0/1"]);
        assert_eq!(select("/form/group/field[1][@name='y']"), Vec::<String>::new());
    }

    #[test]
    fn text_nodes_are_skipped_in_positions() {
        let root = parse_document("<p>a<b/>c<b id=\"2\"/></p>").unwrap();
        let refs = PathExpr::parse("/p/b[2]").unwrap().select(&root);
        assert_eq!(refs, vec![NodeRef::new(vec![3])]);
    }

    #[test]
    fn select_first() {
        let root = tree();
        let expr = PathExpr::parse("//field").unwrap();
        assert_eq!(expr.select_first(&root), Some(NodeRef::new(vec![0, 0])));
    }
}
