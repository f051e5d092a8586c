//! Patch documents
//!
//! An inheriting view's content is not a tree of its own but a list of edits
//! against its parent:
//!
//! ```text
//! <data>
//!   <xpath expr="//row" position="after"><footer/></xpath>
//!   <xpath expr="//footer" position="attributes">
//!     <attribute name="class">highlighted</attribute>
//!     <attribute name="title" action="remove"/>
//!   </xpath>
//! </data>
//! ```
//!
//! A single `<xpath>` may also be the document root. Each directive becomes a
//! [`ViewExtension`] whose sequence is its position in the document, so
//! directives apply in the order written.

use crate::extension::{AttributeChanges, ExtensionError, Operation, OperationKind, ViewExtension};
use weave_artifact::{Element, Node};

const DIRECTIVE: &str = "xpath";
const CONTAINER: &str = "data";

/// Convert a patch document into extensions
///
/// Extensions are identified as `<view>#<index>` and carry the view's
/// `priority` and `module`. Their target view is `view` itself: they are
/// applied in that view's stage, on top of its parent's tree.
///
/// # Errors
/// Returns [`PatchError`] naming the first malformed directive.
pub fn parse_patch(
    view: &str,
    priority: i32,
    module: &str,
    document: &Element,
) -> Result<Vec<ViewExtension>, PatchError> {
    let directives: Vec<&Element> = match document.name.as_str() {
        DIRECTIVE => vec![document],
        CONTAINER => {
            let mut directives = Vec::new();
            for child in &document.children {
                match child {
                    Node::Element(e) if e.name == DIRECTIVE => directives.push(e),
                    Node::Element(e) => return Err(PatchError::UnexpectedElement(e.name.clone())),
                    Node::Text(t) => return Err(PatchError::UnexpectedText(t.trim().to_string())),
                }
            }
            directives
        }
        other => return Err(PatchError::UnexpectedElement(other.to_string())),
    };

    directives
        .into_iter()
        .enumerate()
        .map(|(index, directive)| {
            let at = |source| PatchError::Directive { index, source };
            let expr = directive
                .attr("expr")
                .ok_or_else(|| at(DirectiveError::MissingExpr))?;
            let kind: OperationKind = directive
                .attr("position")
                .unwrap_or("inside")
                .parse()
                .map_err(|e| at(DirectiveError::Extension(e)))?;
            let operation = operation(kind, directive).map_err(at)?;
            let sequence = i32::try_from(index).unwrap_or(i32::MAX);
            let extension = ViewExtension::new(format!("{view}#{index}"), view, expr, operation)
                .map_err(|e| at(DirectiveError::Extension(e)))?;
            Ok(extension
                .with_priority(priority)
                .with_sequence(sequence)
                .with_module(module))
        })
        .collect()
}

fn operation(kind: OperationKind, directive: &Element) -> Result<Operation, DirectiveError> {
    if kind != OperationKind::AttributeEdit {
        return Ok(Operation::with_content(kind, directive.children.clone())?);
    }

    let mut changes = AttributeChanges::new();
    for child in &directive.children {
        let spec = match child {
            Node::Element(e) if e.name == "attribute" => e,
            Node::Element(e) => return Err(DirectiveError::UnexpectedElement(e.name.clone())),
            Node::Text(t) => return Err(DirectiveError::UnexpectedText(t.trim().to_string())),
        };
        let name = spec.attr("name").ok_or(DirectiveError::MissingAttributeName)?;
        let value: String = spec
            .children
            .iter()
            .filter_map(Node::as_text)
            .collect();
        changes = match spec.attr("action").unwrap_or("set") {
            "set" => changes.set(name, value),
            "add" => changes.add(name, value),
            "remove" => changes.remove(name),
            other => return Err(DirectiveError::UnknownAction(other.to_string())),
        };
    }
    Ok(Operation::AttributeEdit { changes })
}

/// Malformed patch document
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Element other than a directive where one was expected
    #[error("unexpected <{0}> in patch document")]
    UnexpectedElement(String),

    /// Loose text between directives
    #[error("unexpected text {0:?} in patch document")]
    UnexpectedText(String),

    /// A directive is malformed
    #[error("directive {index}: {source}")]
    Directive {
        index: usize,
        #[source]
        source: DirectiveError,
    },
}

/// Malformed directive
#[derive(Debug, thiserror::Error)]
pub enum DirectiveError {
    #[error("missing 'expr' attribute")]
    MissingExpr,

    #[error("<attribute> without 'name'")]
    MissingAttributeName,

    #[error("unknown attribute action '{0}'")]
    UnknownAction(String),

    #[error("unexpected <{0}> in attribute directive")]
    UnexpectedElement(String),

    #[error("unexpected text {0:?} in attribute directive")]
    UnexpectedText(String),

    #[error(transparent)]
    Extension(#[from] ExtensionError),
}
