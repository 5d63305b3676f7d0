//! Application layer errors

use std::path::PathBuf;
use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Another instance is already running (lock file {0})")]
    AlreadyRunning(PathBuf),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Module discovery and lifecycle errors
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Malformed module manifest {path}: {reason}")]
    DescriptorParse { path: PathBuf, reason: String },

    #[error("Cyclic dependency involving module '{0}'")]
    CyclicDependency(String),

    #[error("Module '{module}' requires '{dependency}', which is not enabled")]
    MissingDependency { module: String, dependency: String },

    #[error("A module named '{0}' is already loaded")]
    DuplicateName(String),

    #[error("Failed to instantiate module '{module}': {reason}")]
    Instantiation { module: String, reason: String },

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Module '{module}' failed in {hook}: {reason}")]
    Hook {
        module: String,
        hook: &'static str,
        reason: String,
    },

    #[error("Command registration failed: {0}")]
    Command(#[from] CommandError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command tree and execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The arguments did not match what the command expects.
    #[error("Invalid syntax: {0}")]
    Syntax(String),

    #[error("Missing permission: {0}")]
    PermissionDenied(String),

    #[error("This command can only be used in a guild")]
    GuildOnly,

    #[error("Command name or alias '{0}' is already taken")]
    DuplicateName(String),

    #[error("Invalid command tree: {0}")]
    InvalidTree(String),

    #[error("Execution failed: {0}")]
    Execution(String),
}

impl CommandError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        CommandError::Syntax(msg.into())
    }

    pub fn execution(msg: impl std::fmt::Display) -> Self {
        CommandError::Execution(msg.to_string())
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type ModuleResult<T> = Result<T, ModuleError>;
pub type CommandResult<T> = Result<T, CommandError>;

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}
