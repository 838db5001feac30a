//! Environment variable interpolation for config files.
//!
//! Supported syntax:
//! - `${VAR}` - substitute the variable's value, error if unset
//! - `${VAR:-default}` - substitute `default` when unset or empty
//! - `$$` - literal `$`
//!
//! Credentials like the delivery API key are expected to arrive this way
//! rather than being committed to config files.

use regex::Regex;
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("valid interpolation pattern")
});

/// Substitute environment variables in `input`.
///
/// All missing variables are accumulated so the operator sees every
/// problem at once instead of fixing them one by one.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut missing = Vec::new();

    let text = VAR_PATTERN.replace_all(input, |caps: &regex::Captures| {
        if &caps[0] == "$$" {
            return "$".to_string();
        }

        let name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str());

        match env::var(name) {
            Ok(value) if !value.is_empty() => value,
            Ok(_) | Err(_) => match default {
                Some(default) => default.to_string(),
                None => {
                    missing.push(format!("environment variable '{name}' is not set"));
                    caps[0].to_string()
                }
            },
        }
    });

    if missing.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(missing)
    }
}
