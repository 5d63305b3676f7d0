//! Domain traits - Abstractions for infrastructure implementations

pub mod gateway;
pub mod module;
pub mod store;

pub use gateway::{BotInfo, Gateway};
pub use module::{Module, ModuleFactory};
pub use store::PermissionStore;
