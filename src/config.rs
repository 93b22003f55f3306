use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Dosekeep";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 30;
const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const MAX_UPLOAD_BYTES_LIMIT: usize = 256 * 1024 * 1024;
const DEFAULT_VISION_URL: &str = "http://localhost:11434";
const DEFAULT_VISION_MODEL: &str = "medgemma:4b";
const DEFAULT_VISION_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DRUG_LOOKUP_URL: &str = "https://rxnav.nlm.nih.gov/REST";
const DEFAULT_DRUG_LOOKUP_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Get the default application data directory (~/Dosekeep/).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "dosekeep_lib=info,dosekeep=info,tower_http=warn"
}

/// Vision extraction backend (Ollama-compatible chat API).
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// Third-party drug lookup (RxNav REST API).
#[derive(Debug, Clone)]
pub struct DrugLookupConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub session_ttl_hours: i64,
    pub max_upload_bytes: usize,
    pub vision: VisionConfig,
    pub drug_lookup: DrugLookupConfig,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    /// Load configuration from `DOSEKEEP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (environment, tests).
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("DOSEKEEP_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr: SocketAddr = bind_raw.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                key: "DOSEKEEP_BIND",
                value: bind_raw.clone(),
                reason: e.to_string(),
            }
        })?;

        let data_dir = get("DOSEKEEP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(app_data_dir);

        let session_ttl_hours = parse_number(
            "DOSEKEEP_SESSION_TTL_HOURS",
            get("DOSEKEEP_SESSION_TTL_HOURS"),
            DEFAULT_SESSION_TTL_HOURS,
        )?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours)
            || chrono::Duration::try_hours(session_ttl_hours).is_none()
        {
            return Err(ConfigError::Invalid {
                key: "DOSEKEEP_SESSION_TTL_HOURS",
                value: session_ttl_hours.to_string(),
                reason: format!("must be between 1 and {MAX_SESSION_TTL_HOURS}"),
            });
        }

        let max_upload_bytes = parse_number(
            "DOSEKEEP_MAX_UPLOAD_BYTES",
            get("DOSEKEEP_MAX_UPLOAD_BYTES"),
            DEFAULT_MAX_UPLOAD_BYTES,
        )?;
        if !(1..=MAX_UPLOAD_BYTES_LIMIT).contains(&max_upload_bytes) {
            return Err(ConfigError::Invalid {
                key: "DOSEKEEP_MAX_UPLOAD_BYTES",
                value: max_upload_bytes.to_string(),
                reason: format!("must be between 1 and {MAX_UPLOAD_BYTES_LIMIT}"),
            });
        }

        let vision = VisionConfig {
            base_url: get("DOSEKEEP_VISION_URL")
                .unwrap_or_else(|| DEFAULT_VISION_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: get("DOSEKEEP_VISION_MODEL").unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            timeout_secs: parse_number(
                "DOSEKEEP_VISION_TIMEOUT_SECS",
                get("DOSEKEEP_VISION_TIMEOUT_SECS"),
                DEFAULT_VISION_TIMEOUT_SECS,
            )?,
        };

        let drug_lookup = DrugLookupConfig {
            enabled: parse_bool(
                "DOSEKEEP_DRUG_LOOKUP_ENABLED",
                get("DOSEKEEP_DRUG_LOOKUP_ENABLED"),
                true,
            )?,
            base_url: get("DOSEKEEP_DRUG_LOOKUP_URL")
                .unwrap_or_else(|| DEFAULT_DRUG_LOOKUP_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: DEFAULT_DRUG_LOOKUP_TIMEOUT_SECS,
        };

        Ok(Self {
            bind_addr,
            data_dir,
            session_ttl_hours,
            max_upload_bytes,
            vision,
            drug_lookup,
            cors_origin: get("DOSEKEEP_CORS_ORIGIN"),
        })
    }

    /// SQLite database file inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("dosekeep.db")
    }

    /// Root directory for scanned document uploads.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

fn parse_number<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value: v,
                reason: "expected true or false".into(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.session_ttl_hours, 720);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.vision.model, "medgemma:4b");
        assert!(config.drug_lookup.enabled);
        assert!(config.cors_origin.is_none());
        assert!(config.data_dir.ends_with("Dosekeep"));
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("DOSEKEEP_BIND", "0.0.0.0:9000"),
            ("DOSEKEEP_DATA_DIR", "/tmp/dk"),
            ("DOSEKEEP_VISION_URL", "http://vision:11434/"),
            ("DOSEKEEP_DRUG_LOOKUP_ENABLED", "false"),
            ("DOSEKEEP_CORS_ORIGIN", "http://localhost:5173"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/dk/dosekeep.db"));
        assert_eq!(config.uploads_dir(), PathBuf::from("/tmp/dk/uploads"));
        assert_eq!(config.vision.base_url, "http://vision:11434");
        assert!(!config.drug_lookup.enabled);
        assert_eq!(config.cors_origin.as_deref(), Some("http://localhost:5173"));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let err = config_from(&[("DOSEKEEP_MAX_UPLOAD_BYTES", "lots")]).unwrap_err();
        assert!(err.to_string().contains("DOSEKEEP_MAX_UPLOAD_BYTES"));
    }

    #[test]
    fn invalid_bool_is_rejected() {
        assert!(config_from(&[("DOSEKEEP_DRUG_LOOKUP_ENABLED", "maybe")]).is_err());
    }

    #[test]
    fn session_ttl_out_of_range_is_rejected() {
        assert!(config_from(&[("DOSEKEEP_SESSION_TTL_HOURS", "0")]).is_err());
        assert!(config_from(&[("DOSEKEEP_SESSION_TTL_HOURS", "9999999999999")]).is_err());
        let config = config_from(&[("DOSEKEEP_SESSION_TTL_HOURS", "8784")]).unwrap();
        assert_eq!(config.session_ttl_hours, 8784);
    }

    #[test]
    fn upload_limit_out_of_range_is_rejected() {
        assert!(config_from(&[("DOSEKEEP_MAX_UPLOAD_BYTES", "0")]).is_err());
        let huge = usize::MAX.to_string();
        let err = config_from(&[("DOSEKEEP_MAX_UPLOAD_BYTES", huge.as_str())]).unwrap_err();
        assert!(err.to_string().contains("DOSEKEEP_MAX_UPLOAD_BYTES"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("DOSEKEEP_BIND", "  ")]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
    }
}
