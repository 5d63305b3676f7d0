//! Modules compiled into the host binary

pub mod base;

pub use base::BaseModule;
