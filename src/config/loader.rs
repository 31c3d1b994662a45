use super::schema::Config;
use crate::error::{ConfigError, Result};
use figment::providers::{Env, Format, Json, Toml, Yaml};
use figment::Figment;
use std::path::Path;

pub async fn load_from_env_or_file() -> Result<Config> {
    let config: Config = Figment::new()
        // Try to load from various config files
        .merge(Toml::file("weft.toml"))
        .merge(Json::file("weft.json"))
        .merge(Yaml::file("weft.yaml"))
        .merge(Yaml::file("weft.yml"))
        // Override with environment variables (WEFT_ prefix)
        .merge(Env::prefixed("WEFT_").split("_"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;
    let config = apply_env_substitutions(config)?;

    Ok(config)
}

pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("WEFT_").split("_"))
            .extract(),
        Some("json") => Figment::new()
            .merge(Json::file(path))
            .merge(Env::prefixed("WEFT_").split("_"))
            .extract(),
        Some("yaml") | Some("yml") => Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("WEFT_").split("_"))
            .extract(),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    let config = config.map_err(|e: figment::Error| ConfigError::Parse(e.to_string()))?;
    validate(&config)?;
    let config = apply_env_substitutions(config)?;

    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.gateway.host.is_empty() {
        return Err(ConfigError::Validation("Gateway host must not be empty".into()).into());
    }

    if config.gateway.port == 0 {
        return Err(ConfigError::Validation("Gateway port must be non-zero".into()).into());
    }

    for (id, middleware) in &config.middlewares {
        if !(middleware.params.is_null() || middleware.params.is_object()) {
            return Err(ConfigError::Validation(format!(
                "Middleware '{}' params must be a table",
                id
            ))
            .into());
        }
    }

    Ok(())
}

/// Expands `${VAR}` / `${VAR:-default}` references in the gateway host and
/// recursively through every module configuration table.
fn apply_env_substitutions(mut config: Config) -> Result<Config> {
    config.gateway.host = substitute_env_vars(&config.gateway.host)?;

    for (_, table) in config.modules.iter_mut() {
        substitute_value(table)?;
    }

    Ok(config)
}

fn substitute_value(value: &mut serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::String(s) => {
            *s = substitute_env_vars(s)?;
        }
        serde_json::Value::Array(items) => {
            for item in items {
                substitute_value(item)?;
            }
        }
        serde_json::Value::Object(map) => {
            for (_, entry) in map.iter_mut() {
                substitute_value(entry)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                // Check if there's a default value (e.g., ${VAR:-default})
                if let Some((name, default)) = var_name.split_once(":-") {
                    match std::env::var(name) {
                        Ok(value) => result = result.replace(&cap[0], &value),
                        Err(_) => result = result.replace(&cap[0], default),
                    }
                } else {
                    return Err(ConfigError::EnvVar(format!(
                        "Environment variable '{}' not found",
                        var_name
                    ))
                    .into());
                }
            }
        }
    }

    Ok(result)
}
