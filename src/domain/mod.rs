//! Domain layer - Core business logic
//!
//! This layer contains:
//! - Entities: Core business objects (Message, Command tree, Arguments, Alert)
//! - Traits: Abstractions for infrastructure (Gateway, PermissionStore, Module)

pub mod entities;
pub mod traits;
