//! Testing utilities for the Weave workspace
//!
//! Shared fixtures, extension builders and assertions.

#![allow(missing_docs)]

use std::sync::Arc;
use weave_artifact::parse_document;
use weave_compiler::{MemoryStore, ViewDefinition};
use weave_composition::{AttributeChanges, Operation, OperationKind, ViewExtension};

/// Root view from markup
pub fn root_view(name: &str, markup: &str) -> ViewDefinition {
    ViewDefinition::from_markup(name, markup).unwrap()
}

/// Inheriting view from a patch document
pub fn child_view(name: &str, parent: &str, patch: &str) -> ViewDefinition {
    ViewDefinition::from_markup(name, patch).unwrap().inheriting(parent)
}

/// Store holding `list = <div><row/></div>`
pub fn list_store() -> Arc<MemoryStore> {
    store_with_views([root_view("list", "<div><row/></div>")])
}

pub fn store_with_views(views: impl IntoIterator<Item = ViewDefinition>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for view in views {
        store.put_view(view).unwrap();
    }
    store
}

/// Content-carrying extension with payload given as markup
pub fn extension(id: &str, view: &str, xpath: &str, kind: OperationKind, payload: &str) -> ViewExtension {
    ViewExtension::new(id, view, xpath, Operation::from_markup(kind, payload).unwrap()).unwrap()
}

pub fn insert_after(id: &str, view: &str, xpath: &str, payload: &str) -> ViewExtension {
    extension(id, view, xpath, OperationKind::InsertAfter, payload)
}

pub fn remove(id: &str, view: &str, xpath: &str) -> ViewExtension {
    ViewExtension::new(id, view, xpath, Operation::Remove).unwrap()
}

/// Attribute edit setting a single attribute
pub fn set_attribute(id: &str, view: &str, xpath: &str, name: &str, value: &str) -> ViewExtension {
    ViewExtension::new(
        id,
        view,
        xpath,
        Operation::AttributeEdit {
            changes: AttributeChanges::new().set(name, value),
        },
    )
    .unwrap()
}

/// Compare markup after canonicalizing both sides
pub fn assert_markup_eq(actual: &str, expected: &str) {
    let actual = parse_document(actual).unwrap().to_markup();
    let expected = parse_document(expected).unwrap().to_markup();
    pretty_assertions::assert_eq!(actual, expected);
}
