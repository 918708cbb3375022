use crate::error::ConfigError;
use crate::metrics::threshold::ThresholdSet;
use crate::utils::substitute_env;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";
pub const DEFAULT_RATE: u32 = 25_000;
pub const DEFAULT_PRE_ALLOCATED_VUS: u32 = 1_000;
pub const DEFAULT_MAX_VUS: u32 = 5_000;
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    #[default]
    ConstantArrivalRate,
    RampingArrivalRate,
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::ConstantArrivalRate => f.write_str("constant-arrival-rate"),
            ExecutorKind::RampingArrivalRate => f.write_str("ramping-arrival-rate"),
        }
    }
}

/// What happens to a tick when no VU can be leased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    /// Count the tick as a dropped iteration straight away.
    #[default]
    Drop,
    /// Park the tick for up to `gracePeriod` waiting for a VU.
    Queue,
}

impl std::str::FromStr for DropPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(DropPolicy::Drop),
            "queue" => Ok(DropPolicy::Queue),
            other => Err(format!("unknown drop policy '{}' (use drop|queue)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Arrival rate (per time unit) reached at the end of the stage.
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ScenarioConfig {
    #[serde(default)]
    pub executor: ExecutorKind,
    #[serde(default = "default_rate")]
    pub rate: u32,
    #[serde(default = "default_time_unit", with = "duration_serde")]
    pub time_unit: Duration,
    #[serde(default = "default_duration", with = "duration_serde")]
    pub duration: Duration,
    #[serde(rename = "preAllocatedVUs", default = "default_pre_allocated_vus")]
    pub pre_allocated_vus: u32,
    #[serde(rename = "maxVUs", default = "default_max_vus")]
    pub max_vus: u32,
    #[serde(default)]
    pub start_rate: u32,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub drop_policy: DropPolicy,
    #[serde(default = "default_grace_period", with = "duration_serde")]
    pub grace_period: Duration,
    #[serde(default = "default_graceful_stop", with = "duration_serde")]
    pub graceful_stop: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::default(),
            rate: DEFAULT_RATE,
            time_unit: DEFAULT_TIME_UNIT,
            duration: DEFAULT_DURATION,
            pre_allocated_vus: DEFAULT_PRE_ALLOCATED_VUS,
            max_vus: DEFAULT_MAX_VUS,
            start_rate: 0,
            stages: Vec::new(),
            drop_policy: DropPolicy::default(),
            grace_period: DEFAULT_GRACE_PERIOD,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }
}

impl ScenarioConfig {
    /// Wall-clock span during which ticks are emitted.
    pub fn total_duration(&self) -> Duration {
        match self.executor {
            ExecutorKind::ConstantArrivalRate => self.duration,
            ExecutorKind::RampingArrivalRate => self.stages.iter().map(|s| s.duration).sum(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_unit.is_zero() {
            return Err(ConfigError::invalid("timeUnit", "must be greater than zero"));
        }
        if self.max_vus == 0 {
            return Err(ConfigError::invalid("maxVUs", "must be greater than zero"));
        }
        if self.pre_allocated_vus > self.max_vus {
            return Err(ConfigError::invalid(
                "preAllocatedVUs",
                format!(
                    "{} exceeds maxVUs ({})",
                    self.pre_allocated_vus, self.max_vus
                ),
            ));
        }

        match self.executor {
            ExecutorKind::ConstantArrivalRate => {
                if self.rate == 0 {
                    return Err(ConfigError::invalid("rate", "must be greater than zero"));
                }
                if self.duration.is_zero() {
                    return Err(ConfigError::invalid("duration", "must be greater than zero"));
                }
                if !self.stages.is_empty() {
                    return Err(ConfigError::invalid(
                        "stages",
                        "only valid with the ramping-arrival-rate executor",
                    ));
                }
            }
            ExecutorKind::RampingArrivalRate => {
                if self.stages.is_empty() {
                    return Err(ConfigError::invalid(
                        "stages",
                        "ramping-arrival-rate needs at least one stage",
                    ));
                }
                if self.stages.iter().any(|s| s.duration.is_zero()) {
                    return Err(ConfigError::invalid("stages", "stage durations must be non-zero"));
                }
                let peak = self
                    .stages
                    .iter()
                    .map(|s| s.target)
                    .chain(std::iter::once(self.start_rate))
                    .max()
                    .unwrap_or(0);
                if peak == 0 {
                    return Err(ConfigError::invalid("stages", "every stage targets a zero rate"));
                }
            }
        }

        Ok(())
    }
}

/// A complete run description, usually loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RunConfig {
    #[serde(rename = "baseURL", default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub scenario: ScenarioConfig,
    /// Threshold expressions keyed by metric name, e.g. `http_req_failed: ["rate<0.01"]`.
    #[serde(default = "default_thresholds")]
    pub thresholds: IndexMap<String, Vec<String>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            insecure: false,
            scenario: ScenarioConfig::default(),
            thresholds: default_thresholds(),
        }
    }
}

impl RunConfig {
    /// Reads, interpolates, parses and validates a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, |name| std::env::var(name).ok())
    }

    pub fn from_yaml_str<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = substitute_env(content, lookup).map_err(ConfigError::MissingEnv)?;
        let config: RunConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("requestTimeout", "must be greater than zero"));
        }
        self.scenario.validate()?;
        ThresholdSet::from_config(&self.thresholds)?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::invalid("baseURL", format!("'{}': {}", self.base_url, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::invalid(
                    "baseURL",
                    format!("unsupported scheme '{}'", other),
                ))
            }
        }
        if url.cannot_be_a_base() || url.host().is_none() {
            return Err(ConfigError::invalid("baseURL", "must include a host"));
        }

        Ok(url)
    }

    /// Joins `path` onto the base URL, keeping any base path prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        let base = self.base_url()?;
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| ConfigError::invalid("baseURL", e.to_string()))
    }

    pub fn threshold_set(&self) -> Result<ThresholdSet, ConfigError> {
        ThresholdSet::from_config(&self.thresholds)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_rate() -> u32 {
    DEFAULT_RATE
}

fn default_time_unit() -> Duration {
    DEFAULT_TIME_UNIT
}

fn default_duration() -> Duration {
    DEFAULT_DURATION
}

fn default_pre_allocated_vus() -> u32 {
    DEFAULT_PRE_ALLOCATED_VUS
}

fn default_max_vus() -> u32 {
    DEFAULT_MAX_VUS
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_grace_period() -> Duration {
    DEFAULT_GRACE_PERIOD
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}

fn default_thresholds() -> IndexMap<String, Vec<String>> {
    let mut thresholds = IndexMap::new();
    thresholds.insert("http_req_failed".to_string(), vec!["rate<0.01".to_string()]);
    thresholds.insert(
        "http_req_duration".to_string(),
        vec!["p(95)<2000".to_string()],
    );
    thresholds
}

// Durations travel as humantime strings ("30s", "1m") in config files
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&crate::utils::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
            Raw::Text(text) => {
                crate::utils::parse_duration(&text).map_err(serde::de::Error::custom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_mirror_registration_script() {
        let config = RunConfig::default();
        assert_eq!(config.base_url, "http://localhost:4000");
        assert_eq!(config.scenario.executor, ExecutorKind::ConstantArrivalRate);
        assert_eq!(config.scenario.rate, 25_000);
        assert_eq!(config.scenario.time_unit, Duration::from_secs(1));
        assert_eq!(config.scenario.duration, Duration::from_secs(60));
        assert_eq!(config.scenario.pre_allocated_vus, 1_000);
        assert_eq!(config.scenario.max_vus, 5_000);
        assert_eq!(config.thresholds["http_req_failed"], vec!["rate<0.01"]);
        assert_eq!(config.thresholds["http_req_duration"], vec!["p(95)<2000"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_recognized_keys() {
        let yaml = r#"
baseURL: http://127.0.0.1:4000
requestTimeout: 5s
scenario:
  executor: constant-arrival-rate
  rate: 100
  timeUnit: 1s
  duration: 30s
  preAllocatedVUs: 10
  maxVUs: 50
  dropPolicy: queue
  gracePeriod: 500ms
  gracefulStop: 10s
thresholds:
  http_req_failed: ["rate<0.05"]
"#;
        let config = RunConfig::from_yaml_str(yaml, no_env).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:4000");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.scenario.rate, 100);
        assert_eq!(config.scenario.duration, Duration::from_secs(30));
        assert_eq!(config.scenario.pre_allocated_vus, 10);
        assert_eq!(config.scenario.max_vus, 50);
        assert_eq!(config.scenario.drop_policy, DropPolicy::Queue);
        assert_eq!(config.scenario.grace_period, Duration::from_millis(500));
        assert_eq!(config.thresholds.len(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "scenario:\n  rate: 10\n  vus: 5\n";
        let err = RunConfig::from_yaml_str(yaml, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("vus"));
    }

    #[test]
    fn test_pre_allocated_above_max_rejected() {
        let yaml = "scenario:\n  preAllocatedVUs: 20\n  maxVUs: 10\n";
        let err = RunConfig::from_yaml_str(yaml, no_env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "preAllocatedVUs",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_rate_and_duration_rejected() {
        let mut config = RunConfig::default();
        config.scenario.rate = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.scenario.duration = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        for bad in ["not a url", "ftp://example.com", "mailto:someone@example.com"] {
            let config = RunConfig {
                base_url: bad.to_string(),
                ..RunConfig::default()
            };
            assert!(config.validate().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = RunConfig {
            base_url: "http://localhost:4000/api/".to_string(),
            ..RunConfig::default()
        };
        assert_eq!(
            config.endpoint("/auth/register").unwrap().as_str(),
            "http://localhost:4000/api/auth/register"
        );

        let config = RunConfig::default();
        assert_eq!(
            config.endpoint("/auth/register").unwrap().as_str(),
            "http://localhost:4000/auth/register"
        );
    }

    #[test]
    fn test_ramping_requires_stages() {
        let yaml = "scenario:\n  executor: ramping-arrival-rate\n";
        assert!(RunConfig::from_yaml_str(yaml, no_env).is_err());

        let yaml = r#"
scenario:
  executor: ramping-arrival-rate
  startRate: 10
  stages:
    - duration: 10s
      target: 100
    - duration: 20s
      target: 0
"#;
        let config = RunConfig::from_yaml_str(yaml, no_env).unwrap();
        assert_eq!(config.scenario.total_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_interpolation() {
        let vars: HashMap<&str, &str> = [("TARGET_URL", "http://svc:9000")].into_iter().collect();
        let yaml = "baseURL: ${TARGET_URL}\nscenario:\n  rate: ${RATE:42}\n";
        let config =
            RunConfig::from_yaml_str(yaml, |name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url, "http://svc:9000");
        assert_eq!(config.scenario.rate, 42);

        let err = RunConfig::from_yaml_str("baseURL: ${UNSET_URL}\n", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(name) if name == "UNSET_URL"));
    }

    #[test]
    fn test_invalid_threshold_rejected_at_load() {
        let yaml = "thresholds:\n  http_req_duration: [\"p(95)<<2000\"]\n";
        let err = RunConfig::from_yaml_str(yaml, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Threshold { .. }));

        let yaml = "thresholds:\n  http_req_latency: [\"p(95)<2000\"]\n";
        let err = RunConfig::from_yaml_str(yaml, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMetric(_)));
    }

    #[test]
    fn test_duration_roundtrip_as_text() {
        let config = RunConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("duration: 1m"));
        let parsed = RunConfig::from_yaml_str(&yaml, no_env).unwrap();
        assert_eq!(parsed, config);
    }
}
