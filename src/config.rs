use std::{path::PathBuf, time::Duration};

use crate::naming::identity::CaseFolding;

const PREFIX: &str = "SONGFETCH_";

pub const DEFAULT_FORMAT: &str = ":name/:singer - :songName.:ext";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SONGFETCH_{0} must be set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for SONGFETCH_{key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub manifest: PathBuf,
    pub format: String,
    pub concurrency: usize,
    pub retry_timeout: Duration,
    pub retry_times: u32,
    pub retry_delay: Duration,
    pub skip_exists: bool,
    pub skip_trial: bool,
    pub case_folding: CaseFolding,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(format!("{PREFIX}{key}")).ok())
    }

    /// Build the config from a lookup of un-prefixed variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let manifest = get("MANIFEST")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("MANIFEST"))?;

        Ok(Self {
            manifest,
            format: get("FORMAT").unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            concurrency: parse_number::<usize, _>(&get, "CONCURRENCY", 5)?.max(1),
            retry_timeout: Duration::from_secs(parse_number(&get, "RETRY_TIMEOUT_SECS", 180)?),
            retry_times: parse_number::<u32, _>(&get, "RETRY_TIMES", 3)?.max(1),
            retry_delay: Duration::from_millis(parse_number(&get, "RETRY_DELAY_MS", 500)?),
            skip_exists: parse_bool(&get, "SKIP_EXISTS", true)?,
            skip_trial: parse_bool(&get, "SKIP_TRIAL", false)?,
            case_folding: if parse_bool(&get, "CASE_SENSITIVE", false)? {
                CaseFolding::Exact
            } else {
                CaseFolding::Fold
            },
        })
    }
}

fn parse_number<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&'static str) -> Option<String>,
{
    get(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value })
    })
}

fn parse_bool<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&'static str) -> Option<String>,
{
    let Some(value) = get(key) else {
        return Ok(default);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[("MANIFEST", "batch.json")]).unwrap();

        assert_eq!(c.manifest, PathBuf::from("batch.json"));
        assert_eq!(c.format, DEFAULT_FORMAT);
        assert_eq!(c.concurrency, 5);
        assert_eq!(c.retry_timeout, Duration::from_secs(180));
        assert_eq!(c.retry_times, 3);
        assert!(c.skip_exists);
        assert!(!c.skip_trial);
        assert_eq!(c.case_folding, CaseFolding::Fold);
    }

    #[test]
    fn overrides_and_clamping() {
        let c = config(&[
            ("MANIFEST", "m.json"),
            ("FORMAT", ":songName.:ext"),
            ("CONCURRENCY", "0"),
            ("RETRY_TIMES", "0"),
            ("SKIP_TRIAL", "Yes"),
            ("CASE_SENSITIVE", "1"),
        ])
        .unwrap();

        assert_eq!(c.format, ":songName.:ext");
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.retry_times, 1);
        assert!(c.skip_trial);
        assert_eq!(c.case_folding, CaseFolding::Exact);
    }

    #[test]
    fn errors() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("MANIFEST"))));
        assert!(matches!(
            config(&[("MANIFEST", "m"), ("SKIP_EXISTS", "maybe")]),
            Err(ConfigError::Invalid { key: "SKIP_EXISTS", .. })
        ));
        assert!(matches!(
            config(&[("MANIFEST", "m"), ("CONCURRENCY", "-2")]),
            Err(ConfigError::Invalid { key: "CONCURRENCY", .. })
        ));
    }
}
