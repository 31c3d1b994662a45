use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Middleware stack error: {0}")]
    Stack(#[from] StackError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

/// Errors raised by [`MiddlewareStack`](crate::middleware::MiddlewareStack)
/// operations. All of them are programmer errors surfaced immediately to the
/// caller; a failed operation leaves the stack unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("unable to find item with id \"{0}\"")]
    ItemNotFound(String),

    #[error("invalid pivot: {0}")]
    InvalidPivot(String),

    #[error("duplicate item id \"{0}\"")]
    DuplicateItem(String),
}

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("module \"{0}\" is already registered")]
    Duplicate(String),

    #[error("module \"{module}\" depends on unknown module \"{dependency}\"")]
    MissingDependency { module: String, dependency: String },

    #[error("circular dependency involving module \"{0}\"")]
    CircularDependency(String),

    #[error("invalid configuration for module \"{module}\": {reason}")]
    InvalidConfig { module: String, reason: String },

    #[error("setup failed for module \"{module}\": {reason}")]
    SetupFailed { module: String, reason: String },

    #[error("no service registered under \"{0}\"")]
    ServiceNotFound(String),

    #[error("service \"{0}\" has an unexpected type")]
    ServiceType(String),
}

pub type Result<T> = std::result::Result<T, WeftError>;

impl warp::reject::Reject for WeftError {}
