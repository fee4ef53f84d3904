//! Runtime configuration.
//!
//! Read from an optional JSON file, then overridden by `LABGROUPS_*`
//! environment variables. Every field has a default so an empty file (or no
//! file at all) yields a working local setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::store::RetryPolicy;

/// Config file consulted when `LABGROUPS_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "labgroups.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// Sender mailbox, e.g. `Group Formation <groups@uni.edu>`
    pub from: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        SmtpSettings {
            host: String::new(),
            port: 465,
            username: String::new(),
            password: String::new(),
            from: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,

    /// Workbook file inside `data_dir`
    pub workbook: String,

    /// Upload directory inside `data_dir`
    pub uploads: String,

    pub bind: String,

    /// Base URL file links are built from
    pub public_url: String,

    pub session_hours: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,

    /// Without SMTP settings notifications are only logged
    pub smtp: Option<SmtpSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("database"),
            workbook: "labgroups.bin.gz".to_string(),
            uploads: "uploads".to_string(),
            bind: "127.0.0.1:3000".to_string(),
            public_url: "http://127.0.0.1:3000".to_string(),
            session_hours: 24,
            retry_attempts: 3,
            retry_backoff_ms: 200,
            smtp: None,
        }
    }
}

impl Config {
    /// Read `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load the file named by `LABGROUPS_CONFIG` and apply env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("LABGROUPS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let mut config = Config::load(Path::new(&path))?;
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LABGROUPS_*` overrides looked up through `var`.
    pub fn apply_env_from(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(dir) = var("LABGROUPS_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(bind) = var("LABGROUPS_BIND") {
            self.bind = bind;
        }
        if let Some(url) = var("LABGROUPS_PUBLIC_URL") {
            self.public_url = url;
        }

        if let Some(host) = var("LABGROUPS_SMTP_HOST") {
            self.smtp.get_or_insert_with(SmtpSettings::default).host = host;
        }
        if let Some(smtp) = self.smtp.as_mut() {
            if let Some(port) = var("LABGROUPS_SMTP_PORT") {
                smtp.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    key: "LABGROUPS_SMTP_PORT".into(),
                    value: port.clone(),
                })?;
            }
            if let Some(user) = var("LABGROUPS_SMTP_USER") {
                smtp.username = user;
            }
            if let Some(password) = var("LABGROUPS_SMTP_PASSWORD") {
                smtp.password = password;
            }
            if let Some(from) = var("LABGROUPS_SMTP_FROM") {
                smtp.from = from;
            }
        }
        Ok(())
    }

    pub fn workbook_path(&self) -> PathBuf {
        self.data_dir.join(&self.workbook)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join(&self.uploads)
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_hours * 60 * 60)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// SMTP settings, if a host is configured.
    pub fn smtp(&self) -> Option<&SmtpSettings> {
        self.smtp.as_ref().filter(|s| !s.host.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.session_lifetime(), Duration::from_secs(86_400));
        assert!(config.smtp().is_none());
    }

    #[test]
    fn partial_files_keep_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bind": "0.0.0.0:8080", "smtp": {{"host": "mail.uni.edu"}}}}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.session_hours, 24);
        assert_eq!(config.smtp().map(|s| s.port), Some(465));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("LABGROUPS_DATA_DIR", "/srv/labgroups"),
            ("LABGROUPS_SMTP_HOST", "smtp.uni.edu"),
            ("LABGROUPS_SMTP_PORT", "587"),
            ("LABGROUPS_SMTP_FROM", "groups@uni.edu"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(
            config.workbook_path(),
            PathBuf::from("/srv/labgroups/labgroups.bin.gz")
        );
        let smtp = config.smtp().unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from, "groups@uni.edu");
    }

    #[test]
    fn bad_port_is_reported() {
        let mut config = Config::default();
        let err = config
            .apply_env_from(|k| match k {
                "LABGROUPS_SMTP_HOST" => Some("smtp.uni.edu".into()),
                "LABGROUPS_SMTP_PORT" => Some("many".into()),
                _ => None,
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
