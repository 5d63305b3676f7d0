//! Platform integrations

pub mod console;
