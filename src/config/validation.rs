//! Option validators.
//!
//! # Responsibilities
//! - Coerce string values from arguments/environment into typed values
//! - Range-check numeric options
//! - Check filesystem preconditions (file exists, directory exists)
//!
//! # Design Decisions
//! - Each validator is a pure function `&Value -> Result<Value, String>`
//! - The error string is a reason only; the store adds section/key context
//! - Plugins compose these to declare their own option schema

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use toml::Value;

use crate::config::spec::Validator;

fn as_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("{:?} is not an integer", s)),
        other => Err(format!("expected an integer, got {}", other.type_str())),
    }
}

fn as_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(i.to_string()),
        other => Err(format!("expected a string, got {}", other.type_str())),
    }
}

/// Integer within `[min, max]`.
pub fn integer_range(min: i64, max: i64) -> Validator {
    Arc::new(move |value| {
        let i = as_integer(value)?;
        if i < min || i > max {
            return Err(format!("{} is out of range [{}, {}]", i, min, max));
        }
        Ok(Value::Integer(i))
    })
}

/// TCP port.
pub fn port() -> Validator {
    integer_range(1, 65535)
}

/// Strictly positive integer.
pub fn positive() -> Validator {
    integer_range(1, i64::MAX)
}

/// IP address to bind to.
pub fn address() -> Validator {
    Arc::new(|value| {
        let s = as_string(value)?;
        s.parse::<IpAddr>()
            .map_err(|_| format!("{:?} is not an IP address", s))?;
        Ok(Value::String(s))
    })
}

/// Socket address (`host:port`).
pub fn socket_address() -> Validator {
    Arc::new(|value| {
        let s = as_string(value)?;
        s.parse::<std::net::SocketAddr>()
            .map_err(|_| format!("{:?} is not a socket address", s))?;
        Ok(Value::String(s))
    })
}

/// Path to an existing regular file.
pub fn file() -> Validator {
    Arc::new(|value| {
        let s = as_string(value)?;
        if !Path::new(&s).is_file() {
            return Err(format!("{} is not a file", s));
        }
        Ok(Value::String(s))
    })
}

/// Path to an existing directory.
pub fn directory() -> Validator {
    Arc::new(|value| {
        let s = as_string(value)?;
        if !Path::new(&s).is_dir() {
            return Err(format!("{} is not a directory", s));
        }
        Ok(Value::String(s))
    })
}

/// Boolean, accepting the usual string spellings.
pub fn boolean() -> Validator {
    Arc::new(|value| match value {
        Value::Boolean(b) => Ok(Value::Boolean(*b)),
        Value::Integer(i) => Ok(Value::Boolean(*i != 0)),
        Value::String(s) => parse_bool(s)
            .map(Value::Boolean)
            .ok_or_else(|| format!("{:?} is not a boolean", s)),
        other => Err(format!("expected a boolean, got {}", other.type_str())),
    })
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "y" | "yes" | "t" | "true" | "on" => Some(true),
        "0" | "n" | "no" | "f" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// List of strings.
///
/// Accepts a TOML array, a JSON list in a string (`'["a", "b"]'`), or a
/// comma-separated string.
pub fn string_list() -> Validator {
    Arc::new(|value| {
        let items: Vec<String> = match value {
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("list item {} is not a string", v))
                })
                .collect::<Result<_, _>>()?,
            Value::String(s) if s.trim_start().starts_with('[') => {
                serde_json::from_str::<Vec<String>>(s)
                    .map_err(|e| format!("invalid JSON list: {}", e))?
            }
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            other => return Err(format!("expected a list, got {}", other.type_str())),
        };
        Ok(Value::Array(items.into_iter().map(Value::String).collect()))
    })
}

/// One of a fixed set of strings, compared case-insensitively and
/// normalized to the spelling in `choices`.
pub fn one_of(choices: &'static [&'static str]) -> Validator {
    Arc::new(move |value| {
        let s = as_string(value)?;
        choices
            .iter()
            .find(|c| c.eq_ignore_ascii_case(s.trim()))
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| format!("{:?} is not one of {}", s, choices.join(", ")))
    })
}

/// Log level name.
pub fn log_level() -> Validator {
    one_of(&["TRACE", "DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])
}

/// `logging.debug`: either a boolean or a comma-separated list of targets.
pub fn debug_targets() -> Validator {
    Arc::new(|value| match value {
        Value::Boolean(_) => Ok(value.clone()),
        Value::String(s) => match parse_bool(s) {
            Some(b) => Ok(Value::Boolean(b)),
            None => string_list()(value),
        },
        Value::Array(_) => string_list()(value),
        other => Err(format!("expected a boolean or a list, got {}", other.type_str())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn integer_range_coerces_strings() {
        let v = integer_range(1, 300);
        assert_eq!(v(&s("150")).unwrap(), Value::Integer(150));
        assert_eq!(v(&Value::Integer(1)).unwrap(), Value::Integer(1));
        assert!(v(&s("0")).is_err());
        assert!(v(&s("301")).is_err());
        assert!(v(&s("ten")).is_err());
    }

    #[test]
    fn address_rejects_hostnames() {
        let v = address();
        assert!(v(&s("127.0.0.1")).is_ok());
        assert!(v(&s("::1")).is_ok());
        assert!(v(&s("localhost")).is_err());
    }

    #[test]
    fn boolean_spellings() {
        let v = boolean();
        assert_eq!(v(&s("yes")).unwrap(), Value::Boolean(true));
        assert_eq!(v(&s("Off")).unwrap(), Value::Boolean(false));
        assert!(v(&s("maybe")).is_err());
    }

    #[test]
    fn string_list_accepts_json_and_csv() {
        let v = string_list();
        let expected = Value::Array(vec![s("dashboard"), s("pgconf")]);
        assert_eq!(v(&s(r#"["dashboard", "pgconf"]"#)).unwrap(), expected);
        assert_eq!(v(&s("dashboard, pgconf")).unwrap(), expected);
        assert_eq!(v(&expected).unwrap(), expected);
        assert!(v(&s(r#"["dashboard""#)).is_err());
    }

    #[test]
    fn one_of_normalizes_case() {
        let v = log_level();
        assert_eq!(v(&s("debug")).unwrap(), s("DEBUG"));
        assert!(v(&s("verbose")).is_err());
    }

    #[test]
    fn file_and_directory_check_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "").unwrap();

        assert!(file()(&s(path.to_str().unwrap())).is_ok());
        assert!(file()(&s(dir.path().to_str().unwrap())).is_err());
        assert!(directory()(&s(dir.path().to_str().unwrap())).is_ok());
    }

    #[test]
    fn debug_targets_bool_or_list() {
        let v = debug_targets();
        assert_eq!(v(&s("true")).unwrap(), Value::Boolean(true));
        assert_eq!(
            v(&s("pulse_agent::http,hyper")).unwrap(),
            Value::Array(vec![s("pulse_agent::http"), s("hyper")])
        );
    }
}
