//! Environment variable lookups used for configuration overrides.

use crate::error::ConfigError;
use std::env;
use std::str::FromStr;

/// Get an environment variable, returning None if unset or blank.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse the raw value of an environment variable.
pub fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Env {
        var: name.to_string(),
        message: e.to_string(),
    })
}

/// Load `KEY=value` pairs from a `.env` file in the working directory.
///
/// Variables that are already set in the process environment win.
pub fn load_dotenv() -> std::io::Result<usize> {
    let path = std::path::Path::new(".env");
    if !path.exists() {
        return Ok(0);
    }

    let mut loaded = 0;
    for line in std::fs::read_to_string(path)?.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().trim_start_matches("export ").trim();
        let value = unquote(value.trim());
        if env::var_os(key).is_none() {
            env::set_var(key, value);
            loaded += 1;
        }
    }
    Ok(loaded)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("abc"), "abc");
        assert_eq!(unquote("\"abc"), "\"abc");
    }

    #[test]
    fn test_parse_value_reports_bad_values() {
        let err = parse_value::<f32>("OPENAI_TEMPERATURE", "warm").unwrap_err();
        assert!(err.to_string().contains("OPENAI_TEMPERATURE"));
        assert_eq!(parse_value::<f32>("OPENAI_TEMPERATURE", " 0.5 ").unwrap(), 0.5);
    }
}
