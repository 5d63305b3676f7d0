use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Module metadata, parsed from a package manifest and never mutated afterwards
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleDescriptor {
    /// Unique module name
    pub name: String,

    pub version: String,

    /// Entry identifier resolved through the module's loading context
    pub main: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    /// Shared library bundled with the package, relative to the manifest
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// Required dependencies
    #[serde(default)]
    pub depend: Vec<String>,

    /// Optional dependencies, only used to order loading
    #[serde(default)]
    pub softdepend: Vec<String>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>, main: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            main: main.into(),
            description: None,
            authors: Vec::new(),
            library: None,
            depend: Vec::new(),
            softdepend: Vec::new(),
        }
    }

    pub fn with_depend(mut self, name: impl Into<String>) -> Self {
        self.depend.push(name.into());
        self
    }

    pub fn with_softdepend(mut self, name: impl Into<String>) -> Self {
        self.softdepend.push(name.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }
}

#[derive(Debug)]
struct ModuleState {
    name: String,
    enabled: AtomicBool,
}

/// Shared, cheap-to-clone view of a module's identity and enabled flag.
///
/// Root commands carry one of these as their owner so dispatch can check
/// the flag without going through the module handler.
#[derive(Clone)]
pub struct ModuleHandle(Arc<ModuleState>);

impl ModuleHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(ModuleState {
            name: name.into(),
            enabled: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_enabled(&self) -> bool {
        self.0.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.0.enabled.store(enabled, Ordering::Release);
    }

    pub fn same_module(&self, other: &ModuleHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
