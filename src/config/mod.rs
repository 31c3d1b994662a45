//! Configuration loading and schema.
//!
//! Configuration layers TOML/JSON/YAML files with `WEFT_`-prefixed
//! environment variables via figment; `${VAR}` and `${VAR:-default}`
//! references are expanded recursively through module tables after
//! extraction.

pub mod loader;
pub mod schema;

pub use loader::{load_from_env_or_file, load_from_path, validate};
pub use schema::{Config, GatewayConfig, MiddlewareConfig};
