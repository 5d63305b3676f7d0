//! Per-module loading contexts
//!
//! A [`LoadingContext`] is an ordered chain of symbol sources. A module's own
//! package comes first, the shared [`HostContext`] last, so a module can ship
//! its own code while still reaching entries the host links in.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use libloading::Library;

use crate::application::errors::{panic_message, ModuleError};
use crate::domain::traits::{Module, ModuleFactory};

/// Signature exported by shared-library modules under their `main` name.
///
/// The library hands over ownership of a boxed trait object through a thin
/// pointer, e.g. `Box::into_raw(Box::new(Box::new(MyModule) as Box<dyn Module>))`.
pub type ModuleInitFn = unsafe extern "C" fn() -> *mut Box<dyn Module>;

/// Entries linked into the host binary, shared by every module
#[derive(Default)]
pub struct HostContext {
    factories: RwLock<HashMap<String, ModuleFactory>>,
}

impl HostContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: impl Into<String>, factory: ModuleFactory) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.into(), factory);
    }

    pub fn with(self, entry: impl Into<String>, factory: ModuleFactory) -> Self {
        self.register(entry, factory);
        self
    }

    pub fn get(&self, entry: &str) -> Option<ModuleFactory> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entry)
            .copied()
    }

    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        entries.sort();
        entries
    }
}

/// A resolved entry point
#[derive(Clone, Copy)]
pub enum EntryPoint {
    Native(ModuleInitFn),
    Linked(ModuleFactory),
}

/// One link in a resolver chain
pub enum SymbolSource {
    /// The module's own shared library
    Package(Library),
    Host(Arc<HostContext>),
}

impl SymbolSource {
    fn resolve(&self, entry: &str) -> Option<EntryPoint> {
        match self {
            SymbolSource::Package(library) => {
                let symbol = unsafe { library.get::<ModuleInitFn>(entry.as_bytes()) }.ok()?;
                Some(EntryPoint::Native(*symbol))
            }
            SymbolSource::Host(host) => host.get(entry).map(EntryPoint::Linked),
        }
    }

    fn label(&self) -> &str {
        match self {
            SymbolSource::Package(_) => "package",
            SymbolSource::Host(_) => "host",
        }
    }
}

/// Resolver chain owned by a single module
pub struct LoadingContext {
    module: String,
    sources: Vec<SymbolSource>,
}

impl LoadingContext {
    /// Context that only sees host-linked entries
    pub fn host_only(module: impl Into<String>, host: Arc<HostContext>) -> Self {
        Self {
            module: module.into(),
            sources: vec![SymbolSource::Host(host)],
        }
    }

    /// Context that looks in the module's library before falling back to the host
    pub fn with_library(module: impl Into<String>, library: impl AsRef<Path>, host: Arc<HostContext>) -> Result<Self, ModuleError> {
        let module = module.into();
        let path = library.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|e| ModuleError::Instantiation {
            module: module.clone(),
            reason: format!("failed to load library {}: {}", path.display(), e),
        })?;

        Ok(Self {
            module,
            sources: vec![SymbolSource::Package(library), SymbolSource::Host(host)],
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// First source that provides `entry` wins
    pub fn resolve(&self, entry: &str) -> Option<EntryPoint> {
        self.sources.iter().find_map(|source| {
            let found = source.resolve(entry);
            if found.is_some() {
                tracing::debug!("Resolved '{}' for {} from {} source", entry, self.module, source.label());
            }
            found
        })
    }

    /// Resolve `entry` and build a module instance from it.
    ///
    /// A panicking factory or a null pointer from a library is reported as an
    /// instantiation failure.
    pub fn instantiate(&self, entry: &str) -> Result<Box<dyn Module>, ModuleError> {
        let fail = |reason: String| ModuleError::Instantiation {
            module: self.module.clone(),
            reason,
        };

        let entry_point = self
            .resolve(entry)
            .ok_or_else(|| fail(format!("entry '{}' not found", entry)))?;

        let result = catch_unwind(AssertUnwindSafe(|| match entry_point {
            EntryPoint::Linked(factory) => Some(factory()),
            EntryPoint::Native(init) => {
                let raw = unsafe { init() };
                if raw.is_null() {
                    None
                } else {
                    Some(*unsafe { Box::from_raw(raw) })
                }
            }
        }));

        match result {
            Ok(Some(module)) => Ok(module),
            Ok(None) => Err(fail("entry returned null".to_string())),
            Err(panic) => Err(fail(panic_message(panic.as_ref()))),
        }
    }
}

impl fmt::Debug for LoadingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.sources.iter().map(SymbolSource::label).collect();
        f.debug_struct("LoadingContext")
            .field("module", &self.module)
            .field("sources", &sources)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::ModuleResult;
    use crate::application::services::ModuleContext;

    struct Quiet;

    impl Module for Quiet {
        fn on_enable(&self, _ctx: &ModuleContext<'_>) -> ModuleResult<()> {
            Ok(())
        }
    }

    fn quiet() -> Box<dyn Module> {
        Box::new(Quiet)
    }

    fn exploding() -> Box<dyn Module> {
        panic!("constructor blew up")
    }

    #[test]
    fn test_resolves_from_host_fallback() {
        let host = Arc::new(HostContext::new().with("quiet", quiet));
        let context = LoadingContext::host_only("quiet", host);
        assert!(context.resolve("quiet").is_some());
        assert!(context.resolve("missing").is_none());
        assert!(context.instantiate("quiet").is_ok());
    }

    #[test]
    fn test_missing_entry_is_instantiation_error() {
        let context = LoadingContext::host_only("ghost", Arc::new(HostContext::new()));
        let err = context.instantiate("ghost_init").err().expect("unknown entry must fail");
        assert!(matches!(err, ModuleError::Instantiation { ref module, .. } if module == "ghost"));
    }

    #[test]
    fn test_panicking_factory_is_instantiation_error() {
        let host = Arc::new(HostContext::new().with("boom", exploding));
        let context = LoadingContext::host_only("boom", host);
        match context.instantiate("boom") {
            Err(ModuleError::Instantiation { reason, .. }) => assert!(reason.contains("constructor blew up")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_library_fails() {
        let result = LoadingContext::with_library(
            "nolib",
            "/nonexistent/libnolib.so",
            Arc::new(HostContext::new()),
        );
        assert!(matches!(result, Err(ModuleError::Instantiation { .. })));
    }
}
