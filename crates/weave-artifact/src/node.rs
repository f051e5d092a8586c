//! Structured markup tree
//!
//! A view's content is an [`Element`] tree. Element children are [`Node`]s,
//! either nested elements or text. Attributes keep their insertion order.
//!
//! Trees are plain owned values: every transformation works on a clone, so a
//! failed or partial compilation can never corrupt the tree it started from.
//! Equality and [`Hash`] are structural.

use crate::hash::ContentHash;
use crate::path::NodeRef;
use serde::{Deserialize, Serialize};

/// Child of an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Nested element
    Element(Element),
    /// Character data
    Text(String),
}

impl Node {
    /// Element content, if this is an element
    #[inline]
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(e) => Some(e),
            Self::Text(_) => None,
        }
    }

    /// Mutable element content, if this is an element
    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(e) => Some(e),
            Self::Text(_) => None,
        }
    }

    /// Text content, if this is a text node
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Element(_) => None,
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

/// Ordered attribute map
///
/// Setting an existing attribute overwrites it in place, so the original
/// position is kept; new attributes are appended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// Empty attribute map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attribute value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the attribute is present
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set an attribute, returning the previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        if let Some((_, slot)) = self.0.iter_mut().find(|(k, _)| *k == name) {
            return Some(std::mem::replace(slot, value));
        }
        self.0.push((name, value));
        None
    }

    /// Remove an attribute, returning its value if it was present
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(pos).1)
    }

    /// Iterate `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of attributes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attributes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Self::new();
        for (k, v) in iter {
            attrs.set(k, v);
        }
        attrs
    }
}

/// Markup element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Element {
    /// Tag name
    pub name: String,
    /// Attributes in insertion order
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    /// Children in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Element {
    /// Childless element without attributes
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    /// Builder: add an attribute
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.set(name, value);
        self
    }

    /// Builder: append a child element
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder: append a text child
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Attribute lookup shorthand
    #[inline]
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }

    /// Iterate element children with their indices among all children
    pub fn child_elements(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_element().map(|e| (i, e)))
    }

    /// Resolve a reference to an element
    ///
    /// Returns `None` if the reference is out of range or lands on text.
    #[must_use]
    pub fn element_at(&self, at: &NodeRef) -> Option<&Element> {
        let mut current = self;
        for &index in at.indices() {
            current = current.children.get(index)?.as_element()?;
        }
        Some(current)
    }

    /// Resolve a reference to a mutable element
    pub fn element_at_mut(&mut self, at: &NodeRef) -> Option<&mut Element> {
        let mut current = self;
        for &index in at.indices() {
            current = current.children.get_mut(index)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Visit every element in document order with its reference
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&NodeRef, &'a Element)) {
        fn go<'a>(
            element: &'a Element,
            at: &NodeRef,
            visit: &mut impl FnMut(&NodeRef, &'a Element),
        ) {
            visit(at, element);
            for (i, child) in element.child_elements() {
                go(child, &at.child(i), visit);
            }
        }
        go(self, &NodeRef::root(), &mut visit);
    }

    /// Structural content hash over the canonical markup
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute(self.to_markup().as_bytes())
    }
}
