//! View compiler
//!
//! Orchestrates chain resolution, extension application and the compiled
//! artifact cache:
//!
//! 1. Resolve the inheritance chain, root to leaf
//! 2. Gather one stage per chain link: the link's own patch directives plus
//!    the module extensions registered against it
//! 3. Hash every input; return the stored artifact if its hash still matches
//! 4. Otherwise apply the stages in order and store the result

use crate::artifact::{Compilation, CompiledView};
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::resolver::resolve_chain;
use crate::store::DefinitionStore;
use crate::view::ViewDefinition;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use weave_artifact::{ContentHash, ContentHasher};
use weave_composition::{
    detect_ordering_conflicts, ApplicationLog, CompileContext, ExtensionApplier, OrderingConflict,
    ViewExtension,
};

type CacheKey = (String, ContentHash);

/// Extensions applied on top of one chain link
#[derive(Debug, Clone)]
struct Stage {
    view: Arc<ViewDefinition>,
    /// Directives from the view's own patch document
    patch: Vec<ViewExtension>,
    /// Extensions registered against the view by modules
    registered: Vec<ViewExtension>,
}

impl Stage {
    fn extensions(&self) -> Vec<ViewExtension> {
        self.patch.iter().chain(&self.registered).cloned().collect()
    }
}

/// Compiles views against a [`DefinitionStore`]
///
/// Safe to share between threads. Compilations of different keys run in
/// parallel; concurrent compilations of the same (view, context) key are
/// serialized when [`CompilerConfig::dedupe_inflight`] is set, so the second
/// caller gets the first caller's artifact from the cache.
#[derive(Debug)]
pub struct ViewCompiler<S: DefinitionStore> {
    store: Arc<S>,
    config: CompilerConfig,
    applier: ExtensionApplier,
    /// Bumped by every `invalidate`
    epoch: AtomicU64,
    /// View name -> epoch of its latest invalidation
    invalidated: DashMap<String, u64>,
    /// Cache key -> epoch at which this compiler last compiled it
    compiled_at_epoch: DashMap<CacheKey, u64>,
    inflight: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl<S: DefinitionStore> ViewCompiler<S> {
    /// Create compiler with default configuration
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CompilerConfig::default())
    }

    /// Create compiler with explicit configuration
    #[must_use]
    pub fn with_config(store: Arc<S>, config: CompilerConfig) -> Self {
        Self {
            store,
            config,
            applier: ExtensionApplier::new(),
            epoch: AtomicU64::new(0),
            invalidated: DashMap::new(),
            compiled_at_epoch: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `view` under `ctx`
    ///
    /// Returns the stored artifact when its inputs are unchanged. When
    /// compilation fails with a fatal error and a previous artifact exists,
    /// that artifact is returned marked stale (if
    /// [`CompilerConfig::fallback_to_stale`] is set).
    ///
    /// # Errors
    /// Returns [`CompileError`] when the view cannot be compiled and no stale
    /// artifact can stand in.
    pub fn compile(&self, view: &str, ctx: &CompileContext) -> Result<Compilation, CompileError> {
        let key: CacheKey = (view.to_string(), ctx.signature());

        let result = if self.config.dedupe_inflight {
            let lock = Arc::clone(self.inflight.entry(key.clone()).or_default().value());
            let result = {
                let _guard = lock.lock();
                self.compile_key(&key, ctx)
            };
            drop(lock);
            // last holder out removes the slot; waiters still hold a clone
            self.inflight.remove_if(&key, |_, slot| Arc::strong_count(slot) == 1);
            result
        } else {
            self.compile_key(&key, ctx)
        };

        match result {
            Ok(compilation) => Ok(compilation),
            Err(e) if e.is_fatal() && self.config.fallback_to_stale => {
                match self.store.get_compiled_view(view, &key.1) {
                    Ok(Some(previous)) => {
                        tracing::warn!(view, "compilation failed, serving stale artifact: {}", e);
                        Ok(Compilation::stale(previous, e.to_string()))
                    }
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn compile_key(&self, key: &CacheKey, ctx: &CompileContext) -> Result<Compilation, CompileError> {
        let (view, signature) = key;
        let epoch = self.epoch.load(Ordering::SeqCst);
        let stages = self.stages(view)?;
        let content_hash = hash_stages(&stages);

        if !self.bypass_cache(key) {
            if let Some(cached) = self.store.get_compiled_view(view, signature)? {
                if cached.content_hash == content_hash {
                    tracing::debug!(view = %view, hash = %content_hash.short(), "cache hit");
                    return Ok(Compilation::cached(cached));
                }
            }
        }

        let started = Instant::now();
        let mut tree = stages
            .first()
            .map(|s| s.view.arch.clone())
            .ok_or_else(|| CompileError::ViewNotFound(view.clone()))?;
        let mut log = ApplicationLog::new();
        for stage in &stages {
            let extensions = stage.extensions();
            if self.config.warn_on_ordering_conflicts {
                for conflict in detect_ordering_conflicts(&extensions) {
                    tracing::warn!(view = %view, "ordering conflict: {}", conflict);
                }
            }
            let application = self.applier.apply(&tree, &extensions, ctx);
            tree = application.tree;
            log.extend(application.log);
        }

        let artifact = Arc::new(CompiledView {
            view: view.clone(),
            context_signature: *signature,
            chain: stages.iter().map(|s| s.view.name.clone()).collect(),
            tree,
            content_hash,
            applied: log.applied().cloned().collect(),
            log,
            compiled_at: Utc::now(),
            duration: started.elapsed(),
        });
        self.store.put_compiled_view(Arc::clone(&artifact))?;
        // only consulted while the view carries an invalidation mark
        if self.invalidated.contains_key(view) {
            self.compiled_at_epoch.insert(key.clone(), epoch);
        }

        tracing::info!(
            view = %view,
            applied = artifact.applied.len(),
            failed = artifact.log.failures().count(),
            hash = %content_hash.short(),
            "compiled view in {:?}",
            artifact.duration
        );
        Ok(Compilation::fresh(artifact))
    }

    /// Digest of every input that can affect `view`'s compiled tree
    ///
    /// Covers each chain link's definition and every active extension
    /// registered against a chain link, whether or not its conditions hold.
    /// Independent of the compile context. Computed without applying
    /// anything.
    ///
    /// # Errors
    /// Returns [`CompileError`] if the chain cannot be resolved.
    pub fn content_hash(&self, view: &str) -> Result<ContentHash, CompileError> {
        Ok(hash_stages(&self.stages(view)?))
    }

    /// Ordering conflicts across `view`'s stages
    ///
    /// # Errors
    /// Returns [`CompileError`] if the chain cannot be resolved.
    pub fn ordering_conflicts(&self, view: &str) -> Result<Vec<OrderingConflict>, CompileError> {
        Ok(self
            .stages(view)?
            .iter()
            .flat_map(|s| detect_ordering_conflicts(&s.extensions()))
            .collect())
    }

    /// Force the next compilation of `view` and of every view inheriting from
    /// it, directly or transitively, to bypass the cache
    ///
    /// Returns the affected names, sorted.
    ///
    /// Also drops bookkeeping for views that no longer have an active
    /// definition; their stored artifacts stay guarded by the content hash.
    ///
    /// # Errors
    /// Returns [`CompileError::Store`] if descendants cannot be listed.
    pub fn invalidate(&self, view: &str) -> Result<Vec<String>, CompileError> {
        let mut affected = BTreeSet::new();
        let mut queue = VecDeque::from([view.to_string()]);
        while let Some(name) = queue.pop_front() {
            if affected.insert(name.clone()) {
                queue.extend(self.store.list_children(&name)?);
            }
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        for name in &affected {
            self.invalidated.insert(name.clone(), epoch);
        }
        self.invalidated
            .retain(|name, _| matches!(self.store.get_view_definition(name), Ok(Some(_))));
        // entries older than the new mark bypass the cache whether present or not
        self.compiled_at_epoch
            .retain(|(name, _), _| !affected.contains(name) && self.invalidated.contains_key(name));

        tracing::info!(view, affected = affected.len(), "invalidated views");
        Ok(affected.into_iter().collect())
    }

    /// Compile many views in parallel
    ///
    /// Results are returned in input order.
    pub fn compile_all<I, N>(&self, views: I, ctx: &CompileContext) -> Vec<(String, Result<Compilation, CompileError>)>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let names: Vec<String> = views.into_iter().map(Into::into).collect();
        names
            .into_par_iter()
            .map(|name| {
                let result = self.compile(&name, ctx);
                (name, result)
            })
            .collect()
    }

    fn bypass_cache(&self, key: &CacheKey) -> bool {
        let Some(mark) = self.invalidated.get(&key.0).map(|m| *m.value()) else {
            return false;
        };
        self.compiled_at_epoch
            .get(key)
            .map_or(true, |compiled| *compiled.value() < mark)
    }

    fn stages(&self, view: &str) -> Result<Vec<Stage>, CompileError> {
        resolve_chain(self.store.as_ref(), view, self.config.max_chain_depth)?
            .into_iter()
            .map(|definition| {
                Ok(Stage {
                    patch: definition.patch_extensions()?,
                    registered: self.store.list_active_extensions(&definition.name)?,
                    view: definition,
                })
            })
            .collect()
    }
}

fn hash_stages(stages: &[Stage]) -> ContentHash {
    let mut hasher = ContentHasher::new();
    for stage in stages {
        stage.view.hash_into(&mut hasher);
        let mut registered: Vec<&ViewExtension> = stage.registered.iter().collect();
        registered.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        hasher.update_i64(registered.len() as i64);
        for extension in registered {
            hasher
                .update_str(extension.id.as_str())
                .update_hash(&extension.content_hash());
        }
    }
    hasher.finalize()
}
