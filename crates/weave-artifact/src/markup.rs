//! Markup codec
//!
//! Parses serialized markup into [`Element`] trees and writes them back in a
//! canonical compact form. Only well-formedness is checked; there is no
//! schema.
//!
//! Whitespace-only text is dropped while parsing so that indentation in view
//! sources never affects structure or content hashes.

use crate::node::{Element, Node};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Write as _;

/// Parse a document with exactly one root element
///
/// # Errors
/// Returns error on malformed markup, on an empty document, on several root
/// elements, or on text outside the root.
pub fn parse_document(input: &str) -> Result<Element, MarkupError> {
    let nodes = parse_nodes(input)?;
    let mut root = None;
    for node in nodes {
        match node {
            Node::Element(e) if root.is_none() => root = Some(e),
            Node::Element(_) => return Err(MarkupError::MultipleRoots),
            Node::Text(t) => return Err(MarkupError::TextOutsideRoot(t)),
        }
    }
    root.ok_or(MarkupError::Empty)
}

/// Parse a fragment of zero or more sibling nodes
///
/// # Errors
/// Returns error on malformed markup.
pub fn parse_fragment(input: &str) -> Result<Vec<Node>, MarkupError> {
    parse_nodes(input)
}

fn parse_nodes(input: &str) -> Result<Vec<Node>, MarkupError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);

    let mut top: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| MarkupError::syntax(position, e))?;
        match event {
            Event::Start(start) => stack.push(open_element(&start, position)?),
            Event::Empty(start) => {
                let element = open_element(&start, position)?;
                push_node(&mut stack, &mut top, Node::Element(element));
            }
            Event::End(_) => {
                let element = stack.pop().ok_or(MarkupError::Syntax {
                    position,
                    message: "unexpected closing tag".to_string(),
                })?;
                push_node(&mut stack, &mut top, Node::Element(element));
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| MarkupError::syntax(position, e))?;
                if !text.trim().is_empty() {
                    push_node(&mut stack, &mut top, Node::Text(text.into_owned()));
                }
            }
            Event::CData(data) => {
                let text = std::str::from_utf8(&data)
                    .map_err(|e| MarkupError::syntax(position, e))?
                    .to_string();
                push_node(&mut stack, &mut top, Node::Text(text));
            }
            Event::Eof => break,
            // comments, declarations, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(MarkupError::Unclosed(open.name.clone()));
    }
    Ok(top)
}

fn open_element(start: &BytesStart<'_>, position: u64) -> Result<Element, MarkupError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| MarkupError::syntax(position, e))?
        .to_string();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MarkupError::syntax(position, e))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| MarkupError::syntax(position, e))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| MarkupError::syntax(position, e))?
            .into_owned();
        element.attributes.set(key, value);
    }
    Ok(element)
}

fn push_node(stack: &mut [Element], top: &mut Vec<Node>, node: Node) {
    let siblings = match stack.last_mut() {
        Some(parent) => &mut parent.children,
        None => top,
    };
    // adjacent text (e.g. text followed by CDATA) is merged
    if let (Node::Text(new), Some(Node::Text(prev))) = (&node, siblings.last_mut()) {
        prev.push_str(new);
        return;
    }
    siblings.push(node);
}

impl Element {
    /// Canonical compact markup
    ///
    /// Childless elements are self-closed; text and attribute values are
    /// escaped. Two structurally equal trees always produce identical output.
    #[must_use]
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        write_element(&mut out, self);
        out
    }

    /// Indented markup for human consumption
    ///
    /// Elements whose children include text are kept on one line so that
    /// mixed content is not altered.
    #[must_use]
    pub fn to_pretty_markup(&self, indent: usize) -> String {
        let mut out = String::new();
        write_pretty(&mut out, self, indent, 0);
        out
    }
}

/// Canonical markup for a fragment
#[must_use]
pub fn fragment_to_markup(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_open(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in element.attributes.iter() {
        let _ = write!(out, " {key}=\"{}\"", quick_xml::escape::escape(value));
    }
}

fn write_element(out: &mut String, element: &Element) {
    write_open(out, element);
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        write_node(out, child);
    }
    let _ = write!(out, "</{}>", element.name);
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Element(e) => write_element(out, e),
        Node::Text(t) => out.push_str(&quick_xml::escape::escape(t.as_str())),
    }
}

fn write_pretty(out: &mut String, element: &Element, indent: usize, depth: usize) {
    let pad = " ".repeat(indent * depth);
    out.push_str(&pad);
    let has_text = element.children.iter().any(|c| c.as_text().is_some());
    if element.children.is_empty() || has_text {
        write_element(out, element);
        out.push('\n');
        return;
    }
    write_open(out, element);
    out.push_str(">\n");
    for (_, child) in element.child_elements() {
        write_pretty(out, child, indent, depth + 1);
    }
    let _ = writeln!(out, "{pad}</{}>", element.name);
}

/// Errors from the markup codec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkupError {
    /// Malformed input
    #[error("malformed markup at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    /// Element opened but never closed
    #[error("unclosed element <{0}>")]
    Unclosed(String),

    /// Document without a root element
    #[error("document has no root element")]
    Empty,

    /// Document with more than one root element
    #[error("document has more than one root element")]
    MultipleRoots,

    /// Non-whitespace text outside the root element
    #[error("text outside root element: {0:?}")]
    TextOutsideRoot(String),
}

impl MarkupError {
    fn syntax(position: u64, err: impl std::fmt::Display) -> Self {
        Self::Syntax {
            position,
            message: err.to_string(),
        }
    }
}
