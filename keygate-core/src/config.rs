//! Environment-variable configuration helpers.
//!
//! Values missing in production are a startup error; in development they
//! fall back to the given default.

use crate::error::AppError;
use std::env;
use std::str::FromStr;

pub fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// `get_env` followed by a parse, for numeric settings.
pub fn get_env_parse<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?.parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(format!("invalid value for {}: {}", key, e)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_in_dev() {
        let val = get_env("KEYGATE_TEST_UNSET_VAR", Some("fallback"), false).unwrap();
        assert_eq!(val, "fallback");
    }

    #[test]
    fn missing_without_default_is_error() {
        assert!(get_env("KEYGATE_TEST_UNSET_VAR", None, false).is_err());
    }

    #[test]
    fn prod_refuses_default() {
        assert!(get_env("KEYGATE_TEST_UNSET_VAR", Some("fallback"), true).is_err());
    }

    #[test]
    fn parses_numeric_values() {
        let val: u64 = get_env_parse("KEYGATE_TEST_UNSET_VAR", Some("600"), false).unwrap();
        assert_eq!(val, 600);
    }
}
