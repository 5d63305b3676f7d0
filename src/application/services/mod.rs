//! Application services - Business logic orchestration

pub mod command_registry;
pub mod module_handler;
pub mod permission_service;

pub use command_registry::CommandRegistry;
pub use module_handler::{BatchReport, LoadedModule, ModuleContext, ModuleHandler};
pub use permission_service::{Caller, PermissionResolver};
