//! Application layer - Use cases and business logic
//!
//! This layer contains:
//! - Services: Command registry, module lifecycle, permission resolution
//! - Errors: Domain-specific errors
//! - Messaging: Message parsing and command dispatch

pub mod errors;
pub mod services;
pub mod messaging;
