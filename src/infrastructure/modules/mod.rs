//! Module packages
//!
//! Packages are YAML manifests placed in the modules directory. Each one names
//! an entry point that is resolved through the module's own loading context:
//! its bundled shared library first, then the entries linked into the host.

pub mod context;
pub mod loader;
pub mod manifest;

pub use context::{EntryPoint, HostContext, LoadingContext, ModuleInitFn};
pub use loader::{Discovery, LoadPlan, ModuleLoader};
pub use manifest::ModulePackage;
