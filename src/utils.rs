use anyhow::{anyhow, Result};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use std::time::Duration;

/// Parses "30s", "1m", "250ms", "1h 30m" or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty duration"));
    }

    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    humantime::parse_duration(trimmed).map_err(|e| anyhow!("invalid duration '{}': {}", input, e))
}

/// Renders a duration at millisecond precision, e.g. "1m 30s 250ms".
pub fn format_duration(duration: Duration) -> String {
    let millis = Duration::from_millis(duration.as_millis() as u64);
    humantime::format_duration(millis).to_string()
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").expect("static pattern compiles")
    })
}

/// Substitutes `${VAR}` and `${VAR:default}` using `lookup`.
///
/// Returns the name of the first variable that is neither set nor defaulted.
pub fn substitute_env<F>(text: &str, lookup: F) -> std::result::Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = None;

    let substituted = env_pattern().replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => match caps.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            },
        }
    });

    match missing {
        Some(name) => Err(name),
        None => Ok(substituted.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10 parsecs").is_err());
    }

    #[test]
    fn test_format_duration_truncates_to_millis() {
        let d = Duration::from_micros(1_500_700);
        assert_eq!(format_duration(d), "1s 500ms");
    }

    #[test]
    fn test_substitute_env() {
        let vars: HashMap<&str, &str> = [("TARGET", "http://api:8080")].into_iter().collect();
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());

        assert_eq!(
            substitute_env("baseURL: ${TARGET}", lookup).unwrap(),
            "baseURL: http://api:8080"
        );
        assert_eq!(
            substitute_env("rate: ${RATE:50}", lookup).unwrap(),
            "rate: 50"
        );
        assert_eq!(substitute_env("plain text", lookup).unwrap(), "plain text");
    }

    #[test]
    fn test_substitute_env_missing_without_default() {
        let err = substitute_env("${NOPE} and ${ALSO_NOPE}", |_| None).unwrap_err();
        assert_eq!(err, "NOPE");
    }
}
