//! Ordered extension application
//!
//! Extensions are applied one at a time, in (priority, sequence, id) order,
//! each to the tree produced by the one before. A failing extension is logged
//! and skipped; it never aborts the run or leaves a half-applied edit behind.

use crate::condition::{eligible, CompileContext};
use crate::extension::{ExtensionId, Operation, OperationKind, ViewExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use weave_artifact::{Element, Node, NodeRef};

/// Element that marks where a wrapped target is placed inside a wrap payload
pub const WRAP_SLOT: &str = "wrap-slot";

/// What happened to one extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum Outcome {
    /// Edit performed on every match
    Applied,
    /// Inactive, or a condition evaluated false
    SkippedConditionFalse,
    /// Selector matched nothing in the current tree
    SkippedTargetNotFound,
    /// Edit could not be performed; the tree is unchanged
    Error(String),
}

impl Outcome {
    /// Whether the extension changed the tree
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Whether the extension was skipped for any reason
    #[inline]
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedConditionFalse | Self::SkippedTargetNotFound)
    }
}

/// One line of the application log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub extension: ExtensionId,
    pub view: String,
    pub module: String,
    pub operation: OperationKind,
    /// Number of nodes the selector matched
    pub matched: usize,
    pub outcome: Outcome,
}

/// Per-extension record of a compilation, in application order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationLog {
    entries: Vec<LogEntry>,
}

impl ApplicationLog {
    /// Empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Append every entry of another log
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Entries in application order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of applied extensions, in application order
    pub fn applied(&self) -> impl Iterator<Item = &ExtensionId> {
        self.entries
            .iter()
            .filter(|e| e.outcome.is_applied())
            .map(|e| &e.extension)
    }

    /// Entries that ended in an error
    pub fn failures(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Error(_)))
    }

    /// Entries grouped by owning module
    #[must_use]
    pub fn by_module(&self) -> BTreeMap<&str, Vec<&LogEntry>> {
        let mut grouped: BTreeMap<&str, Vec<&LogEntry>> = BTreeMap::new();
        for entry in &self.entries {
            grouped.entry(entry.module.as_str()).or_default().push(entry);
        }
        grouped
    }

    /// Entry for an extension
    #[must_use]
    pub fn get(&self, id: &ExtensionId) -> Option<&LogEntry> {
        self.entries.iter().find(|e| &e.extension == id)
    }
}

/// Result of applying a batch of extensions
#[derive(Debug, Clone)]
pub struct Application {
    pub tree: Element,
    pub log: ApplicationLog,
}

/// Why an operation could not be performed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// Kind requires content but none was given
    #[error("'{0}' needs a non-empty payload")]
    EmptyPayload(OperationKind),

    /// Attribute edit with nothing to change
    #[error("attribute edit has no changes")]
    EmptyAttributeChanges,

    /// Wrap payload is not a single element with one slot
    #[error("invalid wrap payload: {0}")]
    InvalidWrapper(String),

    /// Operation needs a parent the root does not have
    #[error("'{0}' cannot target the root element")]
    RootTarget(OperationKind),

    /// Root replacement must produce exactly one element
    #[error("replacing the root requires exactly one element, got {0} nodes")]
    RootReplacement(usize),

    /// Target disappeared while applying to an earlier match
    #[error("target {0} no longer exists")]
    TargetVanished(NodeRef),
}

/// Applies extensions in their total order
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionApplier;

impl ExtensionApplier {
    /// Create applier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Apply `extensions` to `base` under `ctx`
    ///
    /// The input slice may be in any order; it is sorted by
    /// [`ViewExtension::order_key`] first. Never fails: every extension gets a
    /// log entry describing its outcome.
    #[must_use]
    pub fn apply(&self, base: &Element, extensions: &[ViewExtension], ctx: &CompileContext) -> Application {
        let mut ordered: Vec<&ViewExtension> = extensions.iter().collect();
        ordered.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

        let mut tree = base.clone();
        let mut log = ApplicationLog::new();
        for extension in ordered {
            let (matched, outcome) = self.apply_one(&mut tree, extension, ctx);
            log.push(LogEntry {
                extension: extension.id.clone(),
                view: extension.view.clone(),
                module: extension.module.clone(),
                operation: extension.operation.kind(),
                matched,
                outcome,
            });
        }
        Application { tree, log }
    }

    fn apply_one(&self, tree: &mut Element, extension: &ViewExtension, ctx: &CompileContext) -> (usize, Outcome) {
        if !eligible(extension, ctx) {
            tracing::debug!(extension = %extension.id, "skipped: condition false");
            return (0, Outcome::SkippedConditionFalse);
        }

        let targets = extension.xpath.select(tree);
        if targets.is_empty() {
            tracing::debug!(extension = %extension.id, xpath = %extension.xpath, "skipped: no target");
            return (0, Outcome::SkippedTargetNotFound);
        }

        // Work on a copy so a failure on any match leaves the tree untouched
        let mut candidate = tree.clone();
        match apply_operation(&mut candidate, &targets, &extension.operation) {
            Ok(()) => {
                *tree = candidate;
                (targets.len(), Outcome::Applied)
            }
            Err(e) => {
                tracing::warn!(extension = %extension.id, view = %extension.view, "extension failed: {}", e);
                (targets.len(), Outcome::Error(e.to_string()))
            }
        }
    }
}

/// Perform `operation` on every target
///
/// Targets are visited in reverse document order so that edits never shift
/// the positions of targets still to be visited. The result is the same as
/// applying in document order. For `remove` and `replace`, targets nested
/// inside another target are dropped: the outer edit discards them.
///
/// # Errors
/// Returns the first [`ApplyError`]; `tree` may then be partially edited.
pub fn apply_operation(tree: &mut Element, targets: &[NodeRef], operation: &Operation) -> Result<(), ApplyError> {
    validate_payload(operation)?;
    let targets = match operation {
        Operation::Remove | Operation::Replace { .. } => outermost(targets),
        _ => targets.to_vec(),
    };
    for target in targets.iter().rev() {
        apply_at(tree, target, operation)?;
    }
    Ok(())
}

/// Targets not contained in an earlier target; input is in document order
fn outermost(targets: &[NodeRef]) -> Vec<NodeRef> {
    let mut kept: Vec<NodeRef> = Vec::with_capacity(targets.len());
    for target in targets {
        if !kept.last().is_some_and(|outer| outer.is_ancestor_of(target)) {
            kept.push(target.clone());
        }
    }
    kept
}

fn validate_payload(operation: &Operation) -> Result<(), ApplyError> {
    match operation {
        Operation::Remove => Ok(()),
        Operation::AttributeEdit { changes } if changes.is_empty() => Err(ApplyError::EmptyAttributeChanges),
        Operation::AttributeEdit { .. } => Ok(()),
        Operation::Wrap { content } => wrapper(content).map(|_| ()),
        Operation::InsertBefore { content }
        | Operation::InsertAfter { content }
        | Operation::Replace { content }
        | Operation::PrependIntoChildren { content }
        | Operation::AppendIntoChildren { content } => {
            if content.is_empty() {
                Err(ApplyError::EmptyPayload(operation.kind()))
            } else {
                Ok(())
            }
        }
    }
}

fn apply_at(tree: &mut Element, target: &NodeRef, operation: &Operation) -> Result<(), ApplyError> {
    let vanished = || ApplyError::TargetVanished(target.clone());
    match operation {
        Operation::AttributeEdit { changes } => {
            let element = tree.element_at_mut(target).ok_or_else(vanished)?;
            changes.apply_to(&mut element.attributes);
        }
        Operation::PrependIntoChildren { content } => {
            let element = tree.element_at_mut(target).ok_or_else(vanished)?;
            element.children.splice(0..0, content.iter().cloned());
        }
        Operation::AppendIntoChildren { content } => {
            let element = tree.element_at_mut(target).ok_or_else(vanished)?;
            element.children.extend(content.iter().cloned());
        }
        Operation::Wrap { content } => {
            let template = wrapper(content)?;
            if target.is_root() {
                let original = std::mem::replace(tree, template.clone());
                fill_slot(tree, &mut Some(Node::Element(original)));
            } else {
                let (siblings, index) = siblings_mut(tree, target)?;
                let mut outer = template.clone();
                let original = std::mem::replace(&mut siblings[index], Node::Text(String::new()));
                fill_slot(&mut outer, &mut Some(original));
                siblings[index] = Node::Element(outer);
            }
        }
        Operation::Replace { content } if target.is_root() => match content.as_slice() {
            [Node::Element(replacement)] => *tree = replacement.clone(),
            other => return Err(ApplyError::RootReplacement(other.len())),
        },
        Operation::InsertBefore { .. } | Operation::InsertAfter { .. } | Operation::Remove if target.is_root() => {
            return Err(ApplyError::RootTarget(operation.kind()));
        }
        Operation::InsertBefore { content } => {
            let (siblings, index) = siblings_mut(tree, target)?;
            siblings.splice(index..index, content.iter().cloned());
        }
        Operation::InsertAfter { content } => {
            let (siblings, index) = siblings_mut(tree, target)?;
            siblings.splice(index + 1..index + 1, content.iter().cloned());
        }
        Operation::Replace { content } => {
            let (siblings, index) = siblings_mut(tree, target)?;
            siblings.splice(index..=index, content.iter().cloned());
        }
        Operation::Remove => {
            let (siblings, index) = siblings_mut(tree, target)?;
            siblings.remove(index);
        }
    }
    Ok(())
}

fn siblings_mut<'a>(tree: &'a mut Element, target: &NodeRef) -> Result<(&'a mut Vec<Node>, usize), ApplyError> {
    let vanished = || ApplyError::TargetVanished(target.clone());
    let (parent, index) = target.parent().zip(target.index()).ok_or_else(vanished)?;
    let parent = tree.element_at_mut(&parent).ok_or_else(vanished)?;
    if index >= parent.children.len() {
        return Err(vanished());
    }
    Ok((&mut parent.children, index))
}

/// Validate a wrap payload and return its outer element
fn wrapper(content: &[Node]) -> Result<&Element, ApplyError> {
    let outer = match content {
        [Node::Element(outer)] => outer,
        [] => return Err(ApplyError::EmptyPayload(OperationKind::Wrap)),
        _ => return Err(ApplyError::InvalidWrapper("payload must be a single element".to_string())),
    };
    if outer.name == WRAP_SLOT {
        return Err(ApplyError::InvalidWrapper(format!("<{WRAP_SLOT}/> cannot be the outer element")));
    }
    let mut slots = 0;
    outer.walk(|_, e| {
        if e.name == WRAP_SLOT {
            slots += 1;
        }
    });
    match slots {
        1 => Ok(outer),
        0 => Err(ApplyError::InvalidWrapper(format!("missing <{WRAP_SLOT}/>"))),
        n => Err(ApplyError::InvalidWrapper(format!("{n} <{WRAP_SLOT}/> elements, expected one"))),
    }
}

/// Replace the first slot element with `node`
fn fill_slot(outer: &mut Element, node: &mut Option<Node>) {
    for child in &mut outer.children {
        let is_slot = matches!(child, Node::Element(e) if e.name == WRAP_SLOT);
        if is_slot {
            if let Some(node) = node.take() {
                *child = node;
            }
            return;
        }
        if let Node::Element(inner) = child {
            fill_slot(inner, node);
            if node.is_none() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::extension::AttributeChanges;
    use pretty_assertions::assert_eq;
    use weave_artifact::parse_document;

    fn ext(id: &str, xpath: &str, kind: OperationKind, markup: &str) -> ViewExtension {
        ViewExtension::new(id, "list", xpath, Operation::from_markup(kind, markup).unwrap()).unwrap()
    }

    fn run(base: &str, extensions: &[ViewExtension]) -> Application {
        ExtensionApplier::new().apply(&parse_document(base).unwrap(), extensions, &CompileContext::new())
    }

    #[test]
    fn list_with_footer() {
        let x1 = ext("x1", "//row", OperationKind::InsertAfter, "<footer/>").with_priority(10);
        let x2 = ViewExtension::new(
            "x2",
            "list",
            "//footer",
            Operation::AttributeEdit {
                changes: AttributeChanges::new().add("class", "highlighted"),
            },
        )
        .unwrap()
        .with_priority(20);

        // input order does not matter
        let out = run("<list><row/></list>", &[x2, x1]);
        assert_eq!(out.tree.to_markup(), r#"<list><row/><footer class="highlighted"/></list>"#);
        assert_eq!(out.log.applied().map(ExtensionId::as_str).collect::<Vec<_>>(), vec!["x1", "x2"]);
    }

    #[test]
    fn order_changes_result() {
        let x1 = ext("x1", "//row", OperationKind::InsertAfter, "<footer/>").with_priority(20);
        let x2 = ViewExtension::new(
            "x2",
            "list",
            "//footer",
            Operation::AttributeEdit {
                changes: AttributeChanges::new().add("class", "highlighted"),
            },
        )
        .unwrap()
        .with_priority(10);

        let out = run("<list><row/></list>", &[x1, x2]);
        assert_eq!(out.tree.to_markup(), "<list><row/><footer/></list>");
        assert_eq!(out.log.entries()[0].outcome, Outcome::SkippedTargetNotFound);
        assert_eq!(out.log.entries()[1].outcome, Outcome::Applied);
    }

    #[test]
    fn every_match_is_edited() {
        let x = ext("x", "//row", OperationKind::InsertBefore, "<sep/>");
        let out = run("<list><row id='1'/><row id='2'/><g><row id='3'/></g></list>", &[x]);
        assert_eq!(
            out.tree.to_markup(),
            r#"<list><sep/><row id="1"/><sep/><row id="2"/><g><sep/><row id="3"/></g></list>"#
        );
        assert_eq!(out.log.entries()[0].matched, 3);
    }

    #[test]
    fn nested_matches_survive_outer_edits() {
        let x = ext("x", "//g", OperationKind::AppendIntoChildren, "<end/>");
        let out = run("<r><g><g/></g></r>", &[x]);
        assert_eq!(out.tree.to_markup(), "<r><g><g><end/></g><end/></g></r>");
    }

    #[test]
    fn nested_targets_collapse_for_destructive_kinds() {
        let replace = ext("x", "//g", OperationKind::Replace, "<n/>");
        let out = run("<r><g><g/></g><g/></r>", &[replace]);
        assert_eq!(out.tree.to_markup(), "<r><n/><n/></r>");
        assert_eq!(out.log.entries()[0].matched, 3);

        let remove = ViewExtension::new("y", "list", "//g", Operation::Remove).unwrap();
        let out = run("<r><g><g><g/></g></g><a/></r>", &[remove]);
        assert_eq!(out.tree.to_markup(), "<r><a/></r>");
        assert_eq!(out.log.entries()[0].outcome, Outcome::Applied);
    }

    #[test]
    fn outermost_keeps_siblings_and_drops_descendants() {
        let refs = [
            NodeRef::new(vec![0]),
            NodeRef::new(vec![0, 1]),
            NodeRef::new(vec![0, 1, 0]),
            NodeRef::new(vec![1]),
            NodeRef::new(vec![1, 0]),
        ];
        assert_eq!(outermost(&refs), vec![NodeRef::new(vec![0]), NodeRef::new(vec![1])]);
    }

    #[test]
    fn sibling_and_child_kinds() {
        let base = "<r><a/><b><c/></b></r>";
        let cases = [
            (OperationKind::InsertAfter, "//a", "<r><a/><n/><b><c/></b></r>"),
            (OperationKind::Replace, "//a", "<r><n/><b><c/></b></r>"),
            (OperationKind::PrependIntoChildren, "//b", "<r><a/><b><n/><c/></b></r>"),
            (OperationKind::AppendIntoChildren, "//b", "<r><a/><b><c/><n/></b></r>"),
        ];
        for (kind, xpath, expected) in cases {
            let out = run(base, &[ext("x", xpath, kind, "<n/>")]);
            assert_eq!(out.tree.to_markup(), expected, "{kind}");
        }

        let remove = ViewExtension::new("x", "list", "//b", Operation::Remove).unwrap();
        assert_eq!(run(base, &[remove]).tree.to_markup(), "<r><a/></r>");
    }

    #[test]
    fn replace_with_multiple_nodes() {
        let x = ext("x", "//a", OperationKind::Replace, "<n1/>text<n2/>");
        assert_eq!(run("<r><a/></r>", &[x]).tree.to_markup(), "<r><n1/>text<n2/></r>");
    }

    #[test]
    fn wrap_places_target_at_slot() {
        let x = ext("x", "//a", OperationKind::Wrap, "<div class='w'><span/><wrap-slot/></div>");
        let out = run("<r><a id='1'/><b/></r>", &[x]);
        assert_eq!(out.tree.to_markup(), r#"<r><div class="w"><span/><a id="1"/></div><b/></r>"#);

        let root = ext("x", "/r", OperationKind::Wrap, "<outer><wrap-slot/></outer>");
        assert_eq!(run("<r/>", &[root]).tree.to_markup(), "<outer><r/></outer>");
    }

    #[test]
    fn wrap_payload_validated() {
        for payload in ["<div/>", "<div><wrap-slot/><wrap-slot/></div>", "<a/><b><wrap-slot/></b>", "<wrap-slot/>"] {
            let out = run("<r><a/></r>", &[ext("x", "//a", OperationKind::Wrap, payload)]);
            assert!(matches!(out.log.entries()[0].outcome, Outcome::Error(_)), "{payload}");
            assert_eq!(out.tree.to_markup(), "<r><a/></r>");
        }
    }

    #[test]
    fn root_targets() {
        let replace = ext("x", "/r", OperationKind::Replace, "<s/>");
        assert_eq!(run("<r/>", &[replace]).tree.to_markup(), "<s/>");

        for (kind, markup) in [
            (OperationKind::InsertBefore, "<n/>"),
            (OperationKind::Replace, "<a/><b/>"),
        ] {
            let out = run("<r/>", &[ext("x", "/r", kind, markup)]);
            assert!(matches!(out.log.entries()[0].outcome, Outcome::Error(_)));
            assert_eq!(out.tree.to_markup(), "<r/>");
        }
        let remove = ViewExtension::new("x", "list", "/r", Operation::Remove).unwrap();
        let out = run("<r/>", &[remove]);
        assert_eq!(out.log.failures().count(), 1);
    }

    #[test]
    fn failure_does_not_stop_later_extensions() {
        let bad = ext("a-bad", "//a", OperationKind::InsertAfter, "");
        let good = ext("b-good", "//a", OperationKind::InsertAfter, "<n/>");
        let out = run("<r><a/></r>", &[good, bad]);
        assert_eq!(out.tree.to_markup(), "<r><a/><n/></r>");
        assert_eq!(
            out.log.entries()[0].outcome,
            Outcome::Error("'insert-after' needs a non-empty payload".to_string())
        );
        assert_eq!(out.log.failures().count(), 1);
    }

    #[test]
    fn conditions_and_activity_gate_application() {
        let gated = ext("x", "//a", OperationKind::Remove, "").with_condition(Condition::Environment("prod".into()));
        let inactive = ext("y", "//a", OperationKind::Remove, "").with_active(false);
        let base = parse_document("<r><a/></r>").unwrap();
        let applier = ExtensionApplier::new();

        let dev = applier.apply(&base, &[gated.clone(), inactive.clone()], &CompileContext::new());
        assert_eq!(dev.tree, base);
        assert!(dev.log.entries().iter().all(|e| e.outcome == Outcome::SkippedConditionFalse));

        let prod = applier.apply(&base, &[gated, inactive], &CompileContext::new().with_environment("prod"));
        assert_eq!(prod.tree.to_markup(), "<r/>");
    }

    #[test]
    fn attribute_edit_is_idempotent() {
        let x = ViewExtension::new(
            "x",
            "list",
            "//a",
            Operation::AttributeEdit {
                changes: AttributeChanges::new().set("k", "v").remove("old"),
            },
        )
        .unwrap();
        let once = run("<r><a old='1'/></r>", &[x.clone()]);
        let twice = ExtensionApplier::new().apply(&once.tree, &[x], &CompileContext::new());
        assert_eq!(once.tree, twice.tree);
        assert_eq!(once.tree.to_markup(), r#"<r><a k="v"/></r>"#);
    }

    #[test]
    fn log_grouping() {
        let a = ext("a", "//a", OperationKind::AppendIntoChildren, "<n/>").with_module("sales");
        let b = ext("b", "//zz", OperationKind::AppendIntoChildren, "<n/>").with_module("stock");
        let c = ext("c", "//a", OperationKind::AppendIntoChildren, "<m/>").with_module("sales");
        let out = run("<r><a/></r>", &[a, b, c]);
        let grouped = out.log.by_module();
        assert_eq!(grouped["sales"].len(), 2);
        assert_eq!(grouped["stock"][0].outcome, Outcome::SkippedTargetNotFound);
        assert!(out.log.get(&ExtensionId::new("b")).is_some());
    }

    #[test]
    fn outcome_serialization() {
        let json = serde_json::to_value(Outcome::SkippedTargetNotFound).unwrap();
        assert_eq!(json["status"], "skipped-target-not-found");
        let json = serde_json::to_value(Outcome::Error("boom".into())).unwrap();
        assert_eq!(json["detail"], "boom");
    }
}
