//! Parameter type registry — coercion of raw argument text into typed
//! values, and binding of invocation tokens against a task's parameter
//! list.
//!
//! Coercion is pure and deterministic: the same raw text always produces
//! the same canonical value, which is what keeps argument fingerprints
//! stable across runs.

use crate::core::types::{ArgValue, Task, TypeTag};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    // scheme://host with optional port/userinfo, then anything
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://[^/?#\s]+([/?#]\S*)?$").unwrap()
});

/// Coerce raw argument text to a typed value.
///
/// `working_dir` is the base for `path` resolution. Errors are bare
/// messages; callers add parameter and task context.
pub fn coerce(tag: TypeTag, raw: &str, working_dir: &Path) -> std::result::Result<ArgValue, String> {
    match tag {
        TypeTag::Str => Ok(ArgValue::Str(raw.to_string())),
        TypeTag::Int => raw
            .trim()
            .parse::<i64>()
            .map(ArgValue::Int)
            .map_err(|_| format!("'{}' is not a valid integer", raw)),
        TypeTag::Float => raw
            .trim()
            .parse::<f64>()
            .map(ArgValue::Float)
            .map_err(|_| format!("'{}' is not a valid float", raw)),
        TypeTag::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(ArgValue::Bool(true)),
            "false" | "0" | "no" => Ok(ArgValue::Bool(false)),
            _ => Err(format!("'{}' is not a valid boolean", raw)),
        },
        TypeTag::Path => {
            let p = Path::new(raw);
            let abs = if p.is_absolute() {
                p.to_path_buf()
            } else {
                working_dir.join(p)
            };
            Ok(ArgValue::Path(abs))
        }
        TypeTag::Datetime => coerce_datetime(raw).map(ArgValue::Datetime),
        TypeTag::Url => {
            if URL_RE.is_match(raw) {
                Ok(ArgValue::Url(raw.to_string()))
            } else {
                Err(format!("'{}' is not a valid URL (scheme and host required)", raw))
            }
        }
        TypeTag::Hostname => {
            if is_valid_hostname(raw) {
                Ok(ArgValue::Hostname(raw.to_string()))
            } else {
                Err(format!("'{}' is not a valid hostname", raw))
            }
        }
        TypeTag::Email => {
            if EMAIL_RE.is_match(raw) {
                Ok(ArgValue::Email(raw.to_string()))
            } else {
                Err(format!("'{}' is not a valid email address", raw))
            }
        }
        TypeTag::Ip => raw
            .parse::<IpAddr>()
            .map(|ip| ArgValue::Ip(ip.to_string()))
            .map_err(|_| format!("'{}' is not a valid IP address", raw)),
        TypeTag::Ipv4 => raw
            .parse::<Ipv4Addr>()
            .map(|ip| ArgValue::Ip(ip.to_string()))
            .map_err(|_| format!("'{}' is not a valid IPv4 address", raw)),
        TypeTag::Ipv6 => raw
            .parse::<Ipv6Addr>()
            .map(|ip| ArgValue::Ip(ip.to_string()))
            .map_err(|_| format!("'{}' is not a valid IPv6 address", raw)),
    }
}

/// ISO-8601 with optional timezone. Zoned values canonicalise to UTC
/// RFC 3339; naive values keep the `%Y-%m-%dT%H:%M:%S` shape.
fn coerce_datetime(raw: &str) -> std::result::Result<String, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
        return Ok(midnight.format("%Y-%m-%dT%H:%M:%S").to_string());
    }
    Err(format!("'{}' is not a valid ISO-8601 datetime", raw))
}

/// RFC 1123: dot-separated labels, 1-63 chars each, alphanumeric or
/// hyphen, no leading/trailing hyphen, 253 chars total.
fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

/// Bind invocation tokens to a task's parameters, producing coerced values
/// in declared order.
///
/// A token `name=value` whose `name` matches a declared parameter binds by
/// name; every other token is positional and fills the remaining unbound
/// parameters in declaration order. Unfilled parameters take their
/// declared defaults.
pub fn bind(task: &Task, tokens: &[String]) -> Result<Vec<(String, ArgValue)>> {
    let mut named: BTreeMap<String, String> = BTreeMap::new();
    let mut positional: Vec<String> = Vec::new();

    for token in tokens {
        match token.split_once('=') {
            Some((name, value)) if task.parameters.iter().any(|p| p.name == name) => {
                if named.insert(name.to_string(), value.to_string()).is_some() {
                    return Err(Error::Arg(format!(
                        "argument '{}' given more than once for task '{}'",
                        name, task.qualified_name
                    )));
                }
            }
            _ => positional.push(token.clone()),
        }
    }

    let mut pos_iter = positional.into_iter();
    let mut values = Vec::with_capacity(task.parameters.len());

    for param in &task.parameters {
        let raw = named
            .remove(param.name.as_str())
            .or_else(|| pos_iter.next())
            .or_else(|| param.default.clone());

        let raw = raw.ok_or_else(|| {
            Error::Arg(format!(
                "missing required argument '{}' for task '{}'",
                param.name, task.qualified_name
            ))
        })?;

        let value = coerce(param.type_tag, &raw, &task.working_dir).map_err(|msg| {
            Error::Arg(format!(
                "argument '{}' for task '{}': {}",
                param.name, task.qualified_name, msg
            ))
        })?;
        values.push((param.name.clone(), value));
    }

    if let Some(extra) = pos_iter.next() {
        return Err(Error::Arg(format!(
            "unexpected extra argument '{}' for task '{}'",
            extra, task.qualified_name
        )));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Parameter;
    use std::path::PathBuf;

    fn wd() -> PathBuf {
        PathBuf::from("/project")
    }

    fn task_with_params(params: Vec<Parameter>) -> Task {
        Task {
            qualified_name: "deploy".into(),
            description: None,
            dependencies: vec![],
            explicit_inputs: vec![],
            outputs: vec![],
            working_dir: wd(),
            parameters: params,
            command: "echo".into(),
            source_file: PathBuf::from("/project/tasktree.yaml"),
        }
    }

    fn param(name: &str, tag: TypeTag, default: Option<&str>) -> Parameter {
        Parameter {
            name: name.into(),
            type_tag: tag,
            default: default.map(String::from),
        }
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce(TypeTag::Int, "42", &wd()).unwrap(), ArgValue::Int(42));
        assert_eq!(
            coerce(TypeTag::Int, "-7", &wd()).unwrap(),
            ArgValue::Int(-7)
        );
        // Canonical form normalises a leading plus
        assert_eq!(
            coerce(TypeTag::Int, "+42", &wd()).unwrap().canonical(),
            "42"
        );
        assert!(coerce(TypeTag::Int, "4.2", &wd()).is_err());
        assert!(coerce(TypeTag::Int, "abc", &wd()).is_err());
    }

    #[test]
    fn test_coerce_bool_spellings() {
        for raw in ["true", "TRUE", "1", "yes", "Yes"] {
            assert_eq!(
                coerce(TypeTag::Bool, raw, &wd()).unwrap(),
                ArgValue::Bool(true),
                "raw = {raw}"
            );
        }
        for raw in ["false", "0", "no", "NO"] {
            assert_eq!(
                coerce(TypeTag::Bool, raw, &wd()).unwrap(),
                ArgValue::Bool(false),
                "raw = {raw}"
            );
        }
        assert!(coerce(TypeTag::Bool, "on", &wd()).is_err());
    }

    #[test]
    fn test_coerce_path_resolves_against_working_dir() {
        assert_eq!(
            coerce(TypeTag::Path, "out/bin", &wd()).unwrap(),
            ArgValue::Path(PathBuf::from("/project/out/bin"))
        );
        assert_eq!(
            coerce(TypeTag::Path, "/etc/hosts", &wd()).unwrap(),
            ArgValue::Path(PathBuf::from("/etc/hosts"))
        );
    }

    #[test]
    fn test_coerce_datetime_zoned_to_utc() {
        let v = coerce(TypeTag::Datetime, "2026-03-01T12:00:00+02:00", &wd()).unwrap();
        assert_eq!(v.canonical(), "2026-03-01T10:00:00Z");
    }

    #[test]
    fn test_coerce_datetime_naive() {
        let v = coerce(TypeTag::Datetime, "2026-03-01T12:30:00", &wd()).unwrap();
        assert_eq!(v.canonical(), "2026-03-01T12:30:00");
        let v = coerce(TypeTag::Datetime, "2026-03-01 12:30:00", &wd()).unwrap();
        assert_eq!(v.canonical(), "2026-03-01T12:30:00");
        let v = coerce(TypeTag::Datetime, "2026-03-01", &wd()).unwrap();
        assert_eq!(v.canonical(), "2026-03-01T00:00:00");
        assert!(coerce(TypeTag::Datetime, "yesterday", &wd()).is_err());
    }

    #[test]
    fn test_coerce_url() {
        assert!(coerce(TypeTag::Url, "https://example.com/x?q=1", &wd()).is_ok());
        assert!(coerce(TypeTag::Url, "ssh://git@host:22/repo", &wd()).is_ok());
        assert!(coerce(TypeTag::Url, "example.com", &wd()).is_err());
        assert!(coerce(TypeTag::Url, "http://", &wd()).is_err());
    }

    #[test]
    fn test_coerce_hostname() {
        assert!(coerce(TypeTag::Hostname, "a.example.com", &wd()).is_ok());
        assert!(coerce(TypeTag::Hostname, "localhost", &wd()).is_ok());
        assert!(coerce(TypeTag::Hostname, "-bad.example.com", &wd()).is_err());
        assert!(coerce(TypeTag::Hostname, "bad-.example.com", &wd()).is_err());
        assert!(coerce(TypeTag::Hostname, "has space", &wd()).is_err());
        assert!(coerce(TypeTag::Hostname, &"x".repeat(254), &wd()).is_err());
    }

    #[test]
    fn test_coerce_email() {
        assert!(coerce(TypeTag::Email, "ops@example.com", &wd()).is_ok());
        assert!(coerce(TypeTag::Email, "first.last+tag@sub.example.org", &wd()).is_ok());
        assert!(coerce(TypeTag::Email, "no-at-sign", &wd()).is_err());
        assert!(coerce(TypeTag::Email, "x@nodot", &wd()).is_err());
    }

    #[test]
    fn test_coerce_ip_canonicalises() {
        // Zero-run compression and lowercasing
        let v = coerce(TypeTag::Ip, "2001:0DB8:0000:0000:0000:0000:0000:0001", &wd()).unwrap();
        assert_eq!(v.canonical(), "2001:db8::1");
        assert_eq!(
            coerce(TypeTag::Ipv4, "10.0.0.1", &wd()).unwrap().canonical(),
            "10.0.0.1"
        );
        assert!(coerce(TypeTag::Ipv4, "::1", &wd()).is_err());
        assert!(coerce(TypeTag::Ipv6, "10.0.0.1", &wd()).is_err());
        assert_eq!(
            coerce(TypeTag::Ipv6, "2001:DB8::1", &wd()).unwrap().canonical(),
            "2001:db8::1"
        );
    }

    #[test]
    fn test_bind_positional_in_declared_order() {
        let task = task_with_params(vec![
            param("env", TypeTag::Str, None),
            param("count", TypeTag::Int, None),
        ]);
        let values = bind(&task, &["prod".into(), "3".into()]).unwrap();
        assert_eq!(values[0], ("env".into(), ArgValue::Str("prod".into())));
        assert_eq!(values[1], ("count".into(), ArgValue::Int(3)));
    }

    #[test]
    fn test_bind_named_and_positional_mix() {
        let task = task_with_params(vec![
            param("env", TypeTag::Str, None),
            param("version", TypeTag::Str, None),
        ]);
        let values = bind(&task, &["env=prod".into(), "1.2".into()]).unwrap();
        assert_eq!(values[0].1, ArgValue::Str("prod".into()));
        assert_eq!(values[1].1, ArgValue::Str("1.2".into()));
    }

    #[test]
    fn test_bind_fills_defaults() {
        let task = task_with_params(vec![
            param("env", TypeTag::Str, Some("prod")),
            param("retries", TypeTag::Int, Some("3")),
        ]);
        let values = bind(&task, &[]).unwrap();
        assert_eq!(values[0].1, ArgValue::Str("prod".into()));
        assert_eq!(values[1].1, ArgValue::Int(3));
    }

    #[test]
    fn test_bind_missing_required() {
        let task = task_with_params(vec![param("host", TypeTag::Hostname, None)]);
        let err = bind(&task, &[]).unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_bind_extra_positional() {
        let task = task_with_params(vec![param("env", TypeTag::Str, None)]);
        let err = bind(&task, &["prod".into(), "extra".into()]).unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_bind_duplicate_named() {
        let task = task_with_params(vec![param("env", TypeTag::Str, None)]);
        let err = bind(&task, &["env=a".into(), "env=b".into()]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_bind_coercion_failure_names_parameter() {
        let task = task_with_params(vec![param("count", TypeTag::Int, None)]);
        let err = bind(&task, &["lots".into()]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("count"));
        assert!(msg.contains("integer"));
    }

    #[test]
    fn test_bind_equals_in_str_value_not_matching_param_is_positional() {
        // "K=V" where K is not a declared parameter binds positionally
        let task = task_with_params(vec![param("flags", TypeTag::Str, None)]);
        let values = bind(&task, &["DEBUG=1".into()]).unwrap();
        assert_eq!(values[0].1, ArgValue::Str("DEBUG=1".into()));
    }
}
