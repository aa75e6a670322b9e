use crate::session::LifecycleConfig;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const SETTINGS_FILE: &str = "Settings.toml";
const CONFIG_DIR_VAR: &str = "TRADELOG_CONFIG_DIR";

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: basic_toml::Error,
    },
    #[error("invalid API base URL '{value}': {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub session: SessionSettings,
    pub credentials: CredentialSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    /// Root of the session API; `session/info` etc. are resolved beneath it
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    pub poll_interval_secs: u64,
    /// Warnings with less than this many seconds left are critical
    pub critical_threshold_secs: u64,
    pub display_tick_ms: u64,
    /// Extra refresh attempts after a network failure (0 disables retry)
    pub refresh_retry_attempts: u32,
    pub refresh_retry_delay_ms: u64,
    /// Monitor only: extend automatically when the first warning arrives
    pub auto_extend: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CredentialSettings {
    /// Credential file; empty keeps credentials in memory only
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            critical_threshold_secs: 60,
            display_tick_ms: 1000,
            refresh_retry_attempts: 1,
            refresh_retry_delay_ms: 2000,
            auto_extend: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    ///
    /// Priority, highest first:
    /// 1. Environment variables
    /// 2. `Settings.toml` in `TRADELOG_CONFIG_DIR` (if set and present)
    /// 3. `Settings.toml` in the current directory (if present)
    /// 4. Defaults
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A settings file exists but cannot be read or parsed
    /// - The resulting settings fail validation
    pub fn load() -> Result<Self, SettingsError> {
        Self::initialize_environment();

        let config_dir = std::env::var(CONFIG_DIR_VAR).ok().map(PathBuf::from);
        let mut settings = Self::load_files(Path::new(SETTINGS_FILE), config_dir.as_deref())?;

        Self::apply_env_overrides(&mut settings);
        settings.validate()?;

        Ok(settings)
    }

    /// Load the `.env` file and start logging
    fn initialize_environment() {
        Self::load_env_file();
        // Already initialised when settings are loaded more than once
        if env_logger::try_init().is_err() {
            debug!("Logger already initialised");
        }
    }

    /// Base settings from the working-directory file, replaced wholesale by
    /// the config-dir file when that one exists
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    fn load_files(local_path: &Path, config_dir: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        if local_path.exists() {
            settings = Self::read_file(local_path)?;
            info!("✓ Loaded base settings from {}", local_path.display());
        }

        if let Some(dir) = config_dir {
            let dir_path = dir.join(SETTINGS_FILE);
            if dir_path.exists() {
                settings = Self::read_file(&dir_path)?;
                info!("✓ Overriding settings from {}", dir_path.display());
            } else {
                info!(
                    "ℹ {CONFIG_DIR_VAR} set but no {SETTINGS_FILE} found at: {}",
                    dir_path.display()
                );
            }
        }

        Ok(settings)
    }

    fn read_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        basic_toml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment variable overrides to settings
    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_api_env_overrides(&mut settings.api);
        Self::apply_session_env_overrides(&mut settings.session);
        if let Ok(path) = std::env::var("CREDENTIALS_PATH") {
            settings.credentials.path = path;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            settings.logging.level = level;
        }
    }

    fn apply_api_env_overrides(api: &mut ApiSettings) {
        if let Ok(base_url) = std::env::var("API_BASE_URL") {
            api.base_url = base_url;
        }
        Self::apply_parsed_env_override("API_REQUEST_TIMEOUT_SECS", &mut api.request_timeout_secs);
    }

    /// Apply environment overrides for session timings
    pub fn apply_session_env_overrides(session: &mut SessionSettings) {
        Self::apply_parsed_env_override("SESSION_POLL_INTERVAL_SECS", &mut session.poll_interval_secs);
        Self::apply_parsed_env_override(
            "SESSION_CRITICAL_THRESHOLD_SECS",
            &mut session.critical_threshold_secs,
        );
        Self::apply_parsed_env_override("SESSION_DISPLAY_TICK_MS", &mut session.display_tick_ms);
        Self::apply_parsed_env_override(
            "SESSION_REFRESH_RETRY_ATTEMPTS",
            &mut session.refresh_retry_attempts,
        );
        Self::apply_parsed_env_override(
            "SESSION_REFRESH_RETRY_DELAY_MS",
            &mut session.refresh_retry_delay_ms,
        );
        Self::apply_parsed_env_override("SESSION_AUTO_EXTEND", &mut session.auto_extend);
    }

    /// Overwrite `target` with the parsed variable; unparsable values are ignored
    fn apply_parsed_env_override<T: FromStr>(env_var: &str, target: &mut T) {
        if let Ok(value) = std::env::var(env_var) {
            match value.trim().parse() {
                Ok(parsed) => *target = parsed,
                Err(_) => warn!("Ignoring {env_var}: cannot parse '{value}'"),
            }
        }
    }

    /// Load environment variables from a `.env` file
    ///
    /// Variables already present in the environment win over the file.
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    if std::env::var_os(key).is_none() {
                        std::env::set_var(key, value.trim());
                    }
                }
            }
        }
    }

    /// Check the settings are usable
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable base URL or a zero interval.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.api_base_url()?;

        let non_zero = [
            ("session.poll_interval_secs", self.session.poll_interval_secs),
            ("session.display_tick_ms", self.session.display_tick_ms),
            ("api.request_timeout_secs", self.api.request_timeout_secs),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(SettingsError::Invalid {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The parsed API base URL
    ///
    /// # Errors
    ///
    /// Returns an error if `api.base_url` is not a valid URL.
    pub fn api_base_url(&self) -> Result<Url, SettingsError> {
        Url::parse(&self.api.base_url).map_err(|source| SettingsError::InvalidUrl {
            value: self.api.base_url.clone(),
            source,
        })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Credential file location, or `None` for an in-memory store
    #[must_use]
    pub fn credentials_path(&self) -> Option<PathBuf> {
        let path = self.credentials.path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    /// Timings for the lifecycle manager
    #[must_use]
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            poll_interval: Duration::from_secs(self.session.poll_interval_secs),
            critical_threshold: Duration::from_secs(self.session.critical_threshold_secs),
            display_tick: Duration::from_millis(self.session.display_tick_ms),
            refresh_retry_attempts: self.session.refresh_retry_attempts,
            refresh_retry_delay: Duration::from_millis(self.session.refresh_retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::constants::TEST_BASE_URL;
    use crate::testing::TestFixtures;
    use serial_test::serial;
    use tempfile::TempDir;

    // Helper function to clean all relevant environment variables for tests
    fn clean_env_vars() {
        for var in [
            "API_BASE_URL",
            "API_REQUEST_TIMEOUT_SECS",
            "SESSION_POLL_INTERVAL_SECS",
            "SESSION_CRITICAL_THRESHOLD_SECS",
            "SESSION_DISPLAY_TICK_MS",
            "SESSION_REFRESH_RETRY_ATTEMPTS",
            "SESSION_REFRESH_RETRY_DELAY_MS",
            "SESSION_AUTO_EXTEND",
            "CREDENTIALS_PATH",
            CONFIG_DIR_VAR,
        ] {
            std::env::remove_var(var);
        }
    }

    fn write_settings(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_match_lifecycle_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.lifecycle_config(), TestFixtures::lifecycle_config());
        assert!(!settings.session.auto_extend);
        assert!(settings.credentials_path().is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_api_base_url_and_timeout() {
        let settings = TestFixtures::settings();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.api_base_url().unwrap().as_str(), TEST_BASE_URL);
        assert_eq!(
            settings.request_timeout(),
            Duration::from_secs(settings.api.request_timeout_secs)
        );
    }

    #[test]
    fn test_lifecycle_config_conversion() {
        let mut settings = Settings::default();
        settings.session.poll_interval_secs = 10;
        settings.session.display_tick_ms = 250;
        settings.session.refresh_retry_attempts = 0;

        let config = settings.lifecycle_config();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.display_tick, Duration::from_millis(250));
        assert_eq!(config.refresh_retry_attempts, 0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = basic_toml::from_str(
            r#"
            [session]
            poll_interval_secs = 15

            [credentials]
            path = "/tmp/tradelog/credentials.json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.session.poll_interval_secs, 15);
        assert_eq!(settings.session.critical_threshold_secs, 60);
        assert_eq!(settings.api, ApiSettings::default());
        assert_eq!(
            settings.credentials_path(),
            Some(PathBuf::from("/tmp/tradelog/credentials.json"))
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.api.base_url = "not a url".to_string();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidUrl { .. })
        ));

        let mut settings = Settings::default();
        settings.session.poll_interval_secs = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { name: "session.poll_interval_secs", .. })
        ));
    }

    #[test]
    #[serial]
    fn test_session_env_override() {
        clean_env_vars();
        let mut session = SessionSettings::default();

        std::env::set_var("SESSION_POLL_INTERVAL_SECS", "5");
        std::env::set_var("SESSION_AUTO_EXTEND", "true");
        Settings::apply_session_env_overrides(&mut session);

        assert_eq!(session.poll_interval_secs, 5);
        assert!(session.auto_extend);
        assert_eq!(session.critical_threshold_secs, 60); // Should remain unchanged

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_unparsable_env_override_is_ignored() {
        clean_env_vars();
        let mut session = SessionSettings::default();

        std::env::set_var("SESSION_DISPLAY_TICK_MS", "fast");
        Settings::apply_session_env_overrides(&mut session);

        assert_eq!(session.display_tick_ms, 1000);
        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_settings_file_precedence() {
        clean_env_vars();
        let local = TempDir::new().unwrap();
        let config_dir = TempDir::new().unwrap();
        let local_path = write_settings(
            &local,
            "[api]\nbase_url = \"https://local.example.com/api/\"\n",
        );

        // Scenario 1: only the working-directory file
        let settings = Settings::load_files(&local_path, None).unwrap();
        assert_eq!(settings.api.base_url, "https://local.example.com/api/");

        // Scenario 2: the config-dir file replaces it
        write_settings(
            &config_dir,
            "[api]\nbase_url = \"https://config.example.com/api/\"\n",
        );
        let mut settings = Settings::load_files(&local_path, Some(config_dir.path())).unwrap();
        assert_eq!(settings.api.base_url, "https://config.example.com/api/");

        // Scenario 3: environment variables override both
        std::env::set_var("API_BASE_URL", "https://env.example.com/api/");
        Settings::apply_env_overrides(&mut settings);
        assert_eq!(settings.api.base_url, "https://env.example.com/api/");

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_missing_files_fall_back_to_defaults() {
        clean_env_vars();
        let empty = TempDir::new().unwrap();

        let settings = Settings::load_files(
            &empty.path().join(SETTINGS_FILE),
            Some(empty.path()),
        )
        .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, "[session\npoll_interval_secs = ");

        assert!(matches!(
            Settings::load_files(&path, None),
            Err(SettingsError::Parse { .. })
        ));
    }
}
