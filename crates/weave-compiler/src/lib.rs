//! Weave Compiler
//!
//! Resolves view inheritance chains, applies every eligible extension and
//! caches the compiled result per (view, context signature).
//!
//! # Core Concepts
//!
//! - [`ViewDefinition`]: named template; inheriting views carry a patch
//!   document against their parent
//! - [`DefinitionStore`]: where definitions and compiled artifacts live;
//!   [`MemoryStore`] is the in-process implementation
//! - [`resolve_chain`]: root-to-leaf ancestor chain with cycle detection
//! - [`ViewCompiler`]: `compile`, `invalidate` and parallel `compile_all`
//! - [`CompiledView`]: compiled tree, content hash and application log
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use weave_compiler::{MemoryStore, ViewCompiler, ViewDefinition};
//! use weave_composition::CompileContext;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.put_view(ViewDefinition::from_markup("list", "<div><row/></div>").unwrap()).unwrap();
//! store
//!     .put_view(
//!         ViewDefinition::from_markup(
//!             "list_footer",
//!             r#"<data><xpath expr="//row" position="after"><footer/></xpath></data>"#,
//!         )
//!         .unwrap()
//!         .inheriting("list"),
//!     )
//!     .unwrap();
//!
//! let compiler = ViewCompiler::new(store);
//! let out = compiler.compile("list_footer", &CompileContext::new()).unwrap();
//! assert_eq!(out.artifact.to_markup(), "<div><row/><footer/></div>");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod compiler;
mod config;
mod error;
mod resolver;
mod store;
mod view;

pub use artifact::{Compilation, CompileStatus, CompiledView};
pub use compiler::ViewCompiler;
pub use config::{CompilerConfig, ConfigError};
pub use error::{CompileError, StoreError};
pub use resolver::resolve_chain;
pub use store::{DefinitionStore, MemoryStore};
pub use view::ViewDefinition;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
