//! TOML manifest describing views, extensions and compiler settings
//!
//! ```toml
//! [compiler]
//! max_chain_depth = 32
//!
//! [[views]]
//! name = "list"
//! module = "base"
//! arch = "<div><row/></div>"
//!
//! [[views]]
//! name = "list_footer"
//! inherit = "list"
//! arch_file = "views/list_footer.xml"
//!
//! [[extensions]]
//! id = "highlight"
//! view = "list"
//! xpath = "//footer"
//! operation = "attribute-edit"
//! attributes = { add = [["class", "highlighted"]] }
//! conditions = [{ environment = "prod" }]
//! ```

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use weave_compiler::{CompilerConfig, MemoryStore, ViewDefinition};
use weave_composition::{AttributeChanges, Condition, ConditionSet, Operation, OperationKind, ViewExtension, DEFAULT_PRIORITY};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Manifest {
    #[serde(default)]
    pub(crate) compiler: CompilerConfig,
    #[serde(default)]
    pub(crate) views: Vec<ViewEntry>,
    #[serde(default)]
    pub(crate) extensions: Vec<ExtensionEntry>,
    /// Directory `arch_file` paths are relative to
    #[serde(skip)]
    pub(crate) base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ViewEntry {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) inherit: Option<String>,
    #[serde(default)]
    pub(crate) arch: Option<String>,
    #[serde(default)]
    pub(crate) arch_file: Option<PathBuf>,
    #[serde(default = "default_priority")]
    pub(crate) priority: i32,
    #[serde(default)]
    pub(crate) module: String,
    #[serde(default = "default_active")]
    pub(crate) active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ExtensionEntry {
    pub(crate) id: String,
    pub(crate) view: String,
    pub(crate) xpath: String,
    pub(crate) operation: String,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) attributes: Option<AttributeChanges>,
    #[serde(default = "default_priority")]
    pub(crate) priority: i32,
    #[serde(default)]
    pub(crate) sequence: i32,
    #[serde(default)]
    pub(crate) conditions: Vec<Condition>,
    #[serde(default)]
    pub(crate) module: String,
    #[serde(default = "default_active")]
    pub(crate) active: bool,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_active() -> bool {
    true
}

impl Manifest {
    /// Read and parse a manifest file
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut manifest: Self = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        manifest.compiler.validate()?;
        manifest.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(manifest)
    }

    /// Register every entry, stopping at the first invalid one
    pub(crate) fn build_store(&self) -> Result<MemoryStore> {
        let (store, problems) = self.register();
        match problems.into_iter().next() {
            Some(problem) => Err(anyhow!(problem)),
            None => Ok(store),
        }
    }

    /// Register every valid entry and describe every invalid one
    pub(crate) fn register(&self) -> (MemoryStore, Vec<String>) {
        let store = MemoryStore::new();
        let mut problems = Vec::new();
        for entry in &self.views {
            let result = self
                .view_definition(entry)
                .and_then(|definition| Ok(store.put_view(definition)?));
            if let Err(e) = result {
                problems.push(format!("view '{}': {e:#}", entry.name));
            }
        }
        for entry in &self.extensions {
            match entry.to_extension() {
                Ok(extension) => store.put_extension(extension),
                Err(e) => problems.push(format!("extension '{}': {e:#}", entry.id)),
            }
        }
        (store, problems)
    }

    fn view_definition(&self, entry: &ViewEntry) -> Result<ViewDefinition> {
        let markup = match (&entry.arch, &entry.arch_file) {
            (Some(arch), None) => arch.clone(),
            (None, Some(file)) => {
                let path = self.base_dir.join(file);
                std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?
            }
            (Some(_), Some(_)) => bail!("set either 'arch' or 'arch_file', not both"),
            (None, None) => bail!("missing 'arch' or 'arch_file'"),
        };
        let mut definition = ViewDefinition::from_markup(&entry.name, &markup)?
            .with_priority(entry.priority)
            .with_module(&entry.module)
            .with_active(entry.active);
        if let Some(parent) = &entry.inherit {
            definition = definition.inheriting(parent);
        }
        Ok(definition)
    }
}

impl ExtensionEntry {
    fn to_extension(&self) -> Result<ViewExtension> {
        let kind: OperationKind = self.operation.parse()?;
        let operation = match (kind, &self.attributes) {
            (OperationKind::AttributeEdit, Some(changes)) => Operation::AttributeEdit {
                changes: changes.clone(),
            },
            (OperationKind::AttributeEdit, None) => bail!("attribute-edit needs an 'attributes' table"),
            (_, Some(_)) => bail!("'attributes' is only valid for attribute-edit"),
            (kind, None) => Operation::from_markup(kind, self.content.as_deref().unwrap_or_default())?,
        };
        let mut extension = ViewExtension::new(self.id.as_str(), &self.view, &self.xpath, operation)?
            .with_priority(self.priority)
            .with_sequence(self.sequence)
            .with_module(&self.module)
            .with_active(self.active);
        extension.conditions = ConditionSet::new(self.conditions.clone());
        Ok(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_compiler::DefinitionStore;

    const MANIFEST: &str = r#"
        [compiler]
        max_chain_depth = 8

        [[views]]
        name = "list"
        arch = "<div><row/></div>"

        [[views]]
        name = "list_footer"
        inherit = "list"
        arch_file = "footer.xml"

        [[extensions]]
        id = "highlight"
        view = "list_footer"
        xpath = "//footer"
        operation = "attribute-edit"
        attributes = { add = [["class", "highlighted"]] }
        conditions = [{ environment = "prod" }, { not = { feature = "plain" } }]
    "#;

    fn write_manifest(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("weave.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_views_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("footer.xml"),
            r#"<data><xpath expr="//row" position="after"><footer/></xpath></data>"#,
        )
        .unwrap();
        let manifest = Manifest::load(&write_manifest(dir.path(), MANIFEST)).unwrap();
        assert_eq!(manifest.compiler.max_chain_depth, 8);

        let store = manifest.build_store().unwrap();
        let child = store.get_view_definition("list_footer").unwrap().unwrap();
        assert_eq!(child.inherit_id.as_deref(), Some("list"));
        let extensions = store.list_active_extensions("list_footer").unwrap();
        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions[0].conditions.iter().count(), 2);
    }

    #[test]
    fn register_collects_every_problem() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&write_manifest(
            dir.path(),
            r#"
            [[views]]
            name = "broken"
            arch = "<div>"

            [[views]]
            name = "nowhere"

            [[extensions]]
            id = "bad_xpath"
            view = "x"
            xpath = "//row["
            operation = "remove"

            [[extensions]]
            id = "bad_op"
            view = "x"
            xpath = "//row"
            operation = "explode"
            "#,
        ))
        .unwrap();
        let (_, problems) = manifest.register();
        assert_eq!(problems.len(), 4, "{problems:#?}");
        assert!(manifest.build_store().is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), "[[views]]\nname = \"a\"\narch = \"<a/>\"\ncolour = \"red\"\n");
        assert!(Manifest::load(&path).is_err());
    }
}
