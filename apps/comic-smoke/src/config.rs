//! Environment-backed configuration for `comic-smoke`.

use std::{env, error::Error, fmt, time::Duration};

use comic_backend::{ComicBackendConfig, MediaConfig};
use comic_core::{BackendTuning, RetryPolicy};

const DEFAULT_SMOKE_STATUS: &str = "to-read";

/// Inputs for the optional description-generation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionSmoke {
    pub title: String,
    pub status: String,
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeConfig {
    pub backend: ComicBackendConfig,
    /// Set when `COMICS_SMOKE_TITLE` is present.
    pub description: Option<DescriptionSmoke>,
}

impl SmokeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let endpoint =
            optional_trimmed_env("COMICS_APPWRITE_ENDPOINT", &mut lookup).unwrap_or_default();
        let project_id = required_env("COMICS_APPWRITE_PROJECT_ID", &mut lookup)?;
        let database_id = required_env("COMICS_APPWRITE_DATABASE_ID", &mut lookup)?;
        let collection_id = required_env("COMICS_APPWRITE_COLLECTION_ID", &mut lookup)?;

        let defaults = BackendTuning::default();
        let record_timeout =
            parse_timeout("COMICS_RECORD_TIMEOUT_MS", defaults.record_timeout, &mut lookup)?;
        let execution_timeout = parse_timeout(
            "COMICS_EXECUTION_TIMEOUT_MS",
            defaults.execution_timeout,
            &mut lookup,
        )?;
        let probe_timeout =
            parse_timeout("COMICS_PROBE_TIMEOUT_MS", defaults.probe_timeout, &mut lookup)?;
        let upload_timeout =
            parse_timeout("COMICS_UPLOAD_TIMEOUT_MS", defaults.upload_timeout, &mut lookup)?;
        let skip_probe = parse_flag("COMICS_SKIP_PROBE", &mut lookup)?;
        let execution_retry =
            match parse_optional::<u32, _>("COMICS_EXECUTION_RETRIES", &mut lookup)? {
                Some(retries) => RetryPolicy::default().with_max_retries(retries),
                None => defaults.execution_retry,
            };
        let tuning = BackendTuning {
            record_timeout,
            execution_timeout,
            probe_timeout,
            upload_timeout,
            probe_before_execute: !skip_probe,
            execution_retry,
        };

        let media = MediaConfig::new(
            optional_trimmed_env("COMICS_CLOUDINARY_CLOUD_NAME", &mut lookup).unwrap_or_default(),
            optional_trimmed_env("COMICS_CLOUDINARY_UPLOAD_PRESET", &mut lookup).unwrap_or_default(),
        );
        let mut backend = ComicBackendConfig::new(endpoint, project_id, database_id, collection_id)
            .with_media(media)
            .with_tuning(tuning);
        if let Some(function_id) = optional_trimmed_env("COMICS_FUNCTION_ID", &mut lookup) {
            backend = backend.with_function_id(function_id);
        }

        let description = match optional_trimmed_env("COMICS_SMOKE_TITLE", &mut lookup) {
            Some(title) => Some(DescriptionSmoke {
                title,
                status: optional_trimmed_env("COMICS_SMOKE_STATUS", &mut lookup)
                    .unwrap_or_else(|| DEFAULT_SMOKE_STATUS.to_owned()),
                rating: parse_optional("COMICS_SMOKE_RATING", &mut lookup)?,
            }),
            None => None,
        };

        Ok(Self {
            backend,
            description,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    Missing { key: &'static str },
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "{key} must be set"),
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_env<F>(key: &'static str, lookup: &mut F) -> Result<String, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    optional_trimmed_env(key, lookup).ok_or(ConfigError::Missing { key })
}

fn parse_optional<T, F>(key: &'static str, lookup: &mut F) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<T>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_timeout<F>(
    key: &'static str,
    default: Duration,
    lookup: &mut F,
) -> Result<Duration, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    match parse_optional::<u64, _>(key, lookup)? {
        None => Ok(default),
        Some(0) => Err(ConfigError::InvalidValue {
            key,
            value: "0".to_owned(),
            reason: "must be at least 1".to_owned(),
        }),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}

fn parse_flag<F>(key: &'static str, lookup: &mut F) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use comic_backend::{DEFAULT_FUNCTION_ID, FALLBACK_ENDPOINT};

    use super::*;

    const REQUIRED: [(&str, &str); 3] = [
        ("COMICS_APPWRITE_PROJECT_ID", "comics-project"),
        ("COMICS_APPWRITE_DATABASE_ID", "db"),
        ("COMICS_APPWRITE_COLLECTION_ID", "comics"),
    ];

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Result<SmokeConfig, ConfigError> {
        let map = REQUIRED
            .iter()
            .chain(pairs)
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        SmokeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn parses_required_ids_and_defaults() {
        let cfg = config_from_pairs(&[]).expect("config should parse");

        assert_eq!(cfg.backend.endpoint, FALLBACK_ENDPOINT);
        assert_eq!(cfg.backend.project_id, "comics-project");
        assert_eq!(cfg.backend.database_id, "db");
        assert_eq!(cfg.backend.collection_id, "comics");
        assert_eq!(cfg.backend.function_id, DEFAULT_FUNCTION_ID);
        assert_eq!(cfg.backend.media, MediaConfig::default());
        assert_eq!(cfg.backend.tuning, BackendTuning::default());
        assert_eq!(cfg.description, None);
    }

    #[test]
    fn reports_missing_required_ids() {
        let err = SmokeConfig::from_lookup(|_| None).expect_err("project id is required");
        assert_eq!(
            err,
            ConfigError::Missing {
                key: "COMICS_APPWRITE_PROJECT_ID"
            }
        );

        let err = SmokeConfig::from_lookup(|key| {
            (key == "COMICS_APPWRITE_PROJECT_ID").then(|| "p".to_owned())
        })
        .expect_err("database id is required");
        assert_eq!(err.to_string(), "COMICS_APPWRITE_DATABASE_ID must be set");
    }

    #[test]
    fn parses_tuning_overrides() {
        let cfg = config_from_pairs(&[
            ("COMICS_APPWRITE_ENDPOINT", "https://cloud.example.org/v1/"),
            ("COMICS_FUNCTION_ID", "describe"),
            ("COMICS_RECORD_TIMEOUT_MS", "2000"),
            ("COMICS_EXECUTION_TIMEOUT_MS", "90000"),
            ("COMICS_PROBE_TIMEOUT_MS", "1000"),
            ("COMICS_UPLOAD_TIMEOUT_MS", "30000"),
            ("COMICS_EXECUTION_RETRIES", "4"),
            ("COMICS_SKIP_PROBE", "true"),
            ("COMICS_CLOUDINARY_CLOUD_NAME", "demo"),
            ("COMICS_CLOUDINARY_UPLOAD_PRESET", "comics_unsigned"),
        ])
        .expect("config should parse");

        let backend = cfg.backend;
        assert_eq!(backend.endpoint, "https://cloud.example.org/v1");
        assert_eq!(backend.function_id, "describe");
        assert_eq!(backend.media, MediaConfig::new("demo", "comics_unsigned"));
        assert_eq!(backend.tuning.record_timeout, Duration::from_secs(2));
        assert_eq!(backend.tuning.execution_timeout, Duration::from_secs(90));
        assert_eq!(backend.tuning.probe_timeout, Duration::from_secs(1));
        assert_eq!(backend.tuning.upload_timeout, Duration::from_secs(30));
        assert_eq!(backend.tuning.execution_retry.max_retries(), 4);
        assert!(!backend.tuning.probe_before_execute);
    }

    #[test]
    fn rejects_zero_and_unparseable_values() {
        let err = config_from_pairs(&[("COMICS_RECORD_TIMEOUT_MS", "0")])
            .expect_err("zero timeout must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "COMICS_RECORD_TIMEOUT_MS",
                ..
            }
        ));

        let err = config_from_pairs(&[("COMICS_EXECUTION_RETRIES", "many")])
            .expect_err("non-numeric retries must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "COMICS_EXECUTION_RETRIES",
                ..
            }
        ));

        let err = config_from_pairs(&[("COMICS_SKIP_PROBE", "maybe")])
            .expect_err("non-boolean flag must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "COMICS_SKIP_PROBE",
                ..
            }
        ));
    }

    #[test]
    fn description_step_is_enabled_by_title() {
        let cfg = config_from_pairs(&[
            ("COMICS_SMOKE_TITLE", " Saga "),
            ("COMICS_SMOKE_STATUS", "read"),
            ("COMICS_SMOKE_RATING", "5"),
        ])
        .expect("config should parse");
        assert_eq!(
            cfg.description,
            Some(DescriptionSmoke {
                title: "Saga".into(),
                status: "read".into(),
                rating: Some(5),
            })
        );

        let cfg = config_from_pairs(&[("COMICS_SMOKE_TITLE", "Bone")]).expect("config");
        let smoke = cfg.description.expect("description step");
        assert_eq!(smoke.status, DEFAULT_SMOKE_STATUS);
        assert_eq!(smoke.rating, None);
    }
}
