//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - Storage / Database: Permission override stores
//! - Adapters: Platform integrations
//! - Modules: Package discovery, dependency ordering and loading contexts
//! - Instance: Single-instance guard

pub mod config;
pub mod storage;
pub mod database;
pub mod adapters;
pub mod modules;
pub mod instance;
