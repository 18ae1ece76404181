use ::config::Config;

// Namespaced lookup: `{name}.{key}` first, then the bare `{key}`. Only a
// missing namespaced key falls back; a mistyped one is an error.
pub(crate) fn get_namespaced_value<T, F>(
    config: &Config,
    name: &str,
    key: &str,
    getter: F,
) -> Result<T, config::ConfigError>
where
    F: Fn(&Config, &str) -> Result<T, config::ConfigError>,
{
    if name.is_empty() {
        return getter(config, key);
    }
    match getter(config, &format!("{name}.{key}")) {
        Err(config::ConfigError::NotFound(_)) => getter(config, key),
        other => other,
    }
}

// Like `get_namespaced_value`, but a key that is absent everywhere yields
// `Ok(None)` so the caller can fall back to its default. Type errors are
// still reported.
pub(crate) fn get_namespaced_optional<T, F>(
    config: &Config,
    name: &str,
    key: &str,
    getter: F,
) -> Result<Option<T>, config::ConfigError>
where
    F: Fn(&Config, &str) -> Result<T, config::ConfigError>,
{
    match get_namespaced_value(config, name, key, getter) {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

pub(crate) fn get_namespaced_bool(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<Option<bool>, config::ConfigError> {
    get_namespaced_optional(config, name, key, Config::get_bool)
}

pub(crate) fn get_namespaced_u64(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<Option<u64>, config::ConfigError> {
    get_namespaced_optional(config, name, key, |cfg, key| cfg.get::<u64>(key))
}

pub(crate) fn get_namespaced_string(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<Option<String>, config::ConfigError> {
    get_namespaced_optional(config, name, key, Config::get_string)
}
