//! The entry point callers use to expand macro calls.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use expanse_common::ContentHash;
use expanse_config::EngineConfig;
use expanse_expand::{
    mix_hash, DeclMacroExpander, ExpansionLimits, ExpansionOk, GetMacroExpansionError,
    MacroCallBody, MacroCallData, MacroDefinition, MacroExpansionError, ProcMacroExpander,
};
use expanse_proc::{CancellationToken, ProcMacroApplicationService};

use crate::index::{IndexBuilder, IndexTree, ItemIndexBuilder};
use crate::policy::{DistrustTransientErrors, TrustAll};
use crate::shared::{ExpansionIndex, MacroExpansionSharedCache};

/// Expands declarative and procedural macros through the shared cache.
pub struct MacroExpansionService {
    cache: Arc<MacroExpansionSharedCache>,
    procs: Arc<ProcMacroApplicationService>,
    decl: DeclMacroExpander,
    proc: ProcMacroExpander,
    builder: Box<dyn IndexBuilder>,
    expansion_enabled: AtomicBool,
}

impl MacroExpansionService {
    /// Creates a service over an existing cache and worker service.
    pub fn new(
        config: &EngineConfig,
        cache: Arc<MacroExpansionSharedCache>,
        procs: Arc<ProcMacroApplicationService>,
    ) -> Self {
        Self {
            decl: DeclMacroExpander::new(ExpansionLimits::from(&config.expander)),
            proc: ProcMacroExpander::new(Arc::clone(&procs)),
            cache,
            procs,
            builder: Box::new(ItemIndexBuilder),
            expansion_enabled: AtomicBool::new(true),
        }
    }

    /// Creates the cache and the worker service from configuration.
    pub fn from_config(config: &EngineConfig, cache_dir: impl Into<PathBuf>) -> Self {
        let cache = Arc::new(MacroExpansionSharedCache::new(cache_dir, config.cache.enabled));
        let procs = Arc::new(ProcMacroApplicationService::new(config.proc_macro.clone()));
        Self::new(config, cache, procs)
    }

    /// Replaces the index builder.
    pub fn with_index_builder(mut self, builder: impl IndexBuilder + 'static) -> Self {
        self.builder = Box::new(builder);
        self
    }

    /// Procedural requests made from now on are abandoned once `token` is
    /// cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.proc = ProcMacroExpander::with_cancellation(Arc::clone(&self.procs), token);
        self
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<MacroExpansionSharedCache> {
        &self.cache
    }

    /// The procedural macro worker service.
    pub fn procs(&self) -> &Arc<ProcMacroApplicationService> {
        &self.procs
    }

    /// Switches macro expansion as a whole on or off.
    pub fn set_expansion_enabled(&self, enabled: bool) {
        self.expansion_enabled.store(enabled, Ordering::Release);
    }

    /// Returns `true` if the cache is enabled and open.
    pub fn is_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    /// Flushes the cache.
    pub fn flush(&self) {
        self.cache.flush();
    }

    /// The cache key of an expansion, if the inputs can be hashed.
    pub fn hash(&self, def: &MacroDefinition, call: &MacroCallData) -> Option<ContentHash> {
        mix_hash(def, call)
    }

    /// Expands `call` with `def` through the cache.
    ///
    /// Declarative results are always reused. Procedural errors that may not
    /// recur are recomputed on every call.
    pub fn expand_and_cache(
        &self,
        def: &MacroDefinition,
        call: &MacroCallData,
    ) -> Result<ExpansionOk, MacroExpansionError> {
        match def {
            MacroDefinition::Declarative(def) => {
                self.cache.cached_expand_with(&self.decl, def, call, &TrustAll)
            }
            MacroDefinition::Procedural(def) => {
                self.cache
                    .cached_expand_with(&self.proc, def, call, &DistrustTransientErrors)
            }
        }
    }

    /// Checks that `call` can be expanded with `def` at all.
    fn check(&self, def: &MacroDefinition, call: &MacroCallData) -> Result<(), GetMacroExpansionError> {
        if !self.expansion_enabled.load(Ordering::Acquire) {
            return Err(GetMacroExpansionError::MacroExpansionIsDisabled);
        }
        match def {
            MacroDefinition::Declarative(def) => {
                if !matches!(call.body, MacroCallBody::FunctionLike(_)) {
                    return Err(GetMacroExpansionError::MacroCallSyntax(format!(
                        "`{}` is a declarative macro and can only be called as `{}!(...)`",
                        def.name, def.name
                    )));
                }
            }
            MacroDefinition::Procedural(def) => {
                let call_kind = call.body.kind();
                if call_kind != def.kind {
                    return Err(GetMacroExpansionError::UnmatchedProcMacroKind {
                        call_kind,
                        def_kind: def.kind,
                    });
                }
                if def.artifact.is_none() {
                    return Err(GetMacroExpansionError::NoProcMacroArtifact(def.name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Expands `call` with `def`, reporting why no expansion is available.
    pub fn expand(
        &self,
        def: &MacroDefinition,
        call: &MacroCallData,
    ) -> Result<ExpansionOk, GetMacroExpansionError> {
        self.check(def, call)?;
        Ok(self.expand_and_cache(def, call)?)
    }

    /// Expands `call` and indexes the expansion text, both through the cache.
    pub fn expand_with_index(
        &self,
        def: &MacroDefinition,
        call: &MacroCallData,
    ) -> Option<ExpansionIndex> {
        self.check(def, call).ok()?;
        match def {
            MacroDefinition::Declarative(def) => {
                self.cache
                    .create_expansion_index(&self.decl, def, call, self.builder.as_ref())
            }
            MacroDefinition::Procedural(def) => {
                self.cache
                    .create_expansion_index(&self.proc, def, call, self.builder.as_ref())
            }
        }
    }

    /// The cached index tree for `hash`, without computing anything.
    pub fn get_index_for(&self, hash: ContentHash) -> Option<IndexTree> {
        self.cache.get_index_for(hash)
    }

    /// Flushes the cache and stops all worker processes.
    pub fn dispose(&self) {
        self.cache.dispose();
        self.procs.dispose();
    }
}
