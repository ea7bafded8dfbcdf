use crate::app::ports::EncryptionDirective;
use crate::fetcher::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "raw_ingest.toml";
pub const CONFIG_PATH_ENV: &str = "RAW_INGEST_CONFIG";

/// Upper bound for every timeout, budget and TTL, in seconds (one day).
pub const MAX_SECS: u64 = 86_400;
pub const MAX_ATTEMPTS: u64 = 100;

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}")]
    InvalidOverride { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub http: HttpSettings,
    pub retry: RetryPolicy,
    pub cache: CacheSettings,
    pub budget: BudgetSettings,
    pub secrets: SecretsSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub attempt_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 15,
            user_agent: concat!("raw_ingest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

/// Time budgets. The invocation budget must cover the worst case of every
/// stage combined.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    pub secret_lookup_secs: u64,
    pub storage_write_secs: u64,
    pub invocation_secs: u64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            secret_lookup_secs: 5,
            storage_write_secs: 10,
            invocation_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretsBackend {
    File,
    Env,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecretsSettings {
    pub backend: SecretsBackend,
    pub path: PathBuf,
    pub env_prefix: String,
}

impl Default for SecretsSettings {
    fn default() -> Self {
        Self {
            backend: SecretsBackend::File,
            path: PathBuf::from("secrets.json"),
            env_prefix: "RAW_INGEST_SECRET_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub root: PathBuf,
    pub encryption: EncryptionDirective,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            root: PathBuf::from("data"),
            encryption: EncryptionDirective::Aes256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: PathBuf,
    pub file_name: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_name: "raw_ingest.log".to_string(),
        }
    }
}

impl IngestSettings {
    /// Loads settings from `path`, or from `RAW_INGEST_CONFIG` / `raw_ingest.toml`
    /// when no path is given, then applies `RAW_INGEST_*` overrides and validates.
    ///
    /// A missing default file is not an error; an explicitly named one is.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));
        let mut settings = match explicit {
            Some(p) => Self::from_file(&p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        settings.apply_overrides(|var| std::env::var(var).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, SettingsError> {
            value
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidOverride { var, value })
        }

        if let Some(v) = lookup("RAW_INGEST_ATTEMPT_TIMEOUT_SECS") {
            self.http.attempt_timeout_secs = parse("RAW_INGEST_ATTEMPT_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("RAW_INGEST_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse("RAW_INGEST_MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("RAW_INGEST_BACKOFF_BASE_MS") {
            self.retry.base_delay = Duration::from_millis(parse("RAW_INGEST_BACKOFF_BASE_MS", v)?);
        }
        if let Some(v) = lookup("RAW_INGEST_BACKOFF_MAX_MS") {
            self.retry.max_delay = Duration::from_millis(parse("RAW_INGEST_BACKOFF_MAX_MS", v)?);
        }
        if let Some(v) = lookup("RAW_INGEST_JITTER_MS") {
            self.retry.jitter = Duration::from_millis(parse("RAW_INGEST_JITTER_MS", v)?);
        }
        if let Some(v) = lookup("RAW_INGEST_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse("RAW_INGEST_CACHE_TTL_SECS", v)?;
        }
        if let Some(v) = lookup("RAW_INGEST_INVOCATION_BUDGET_SECS") {
            self.budget.invocation_secs = parse("RAW_INGEST_INVOCATION_BUDGET_SECS", v)?;
        }
        if let Some(v) = lookup("RAW_INGEST_SECRET_LOOKUP_BUDGET_SECS") {
            self.budget.secret_lookup_secs = parse("RAW_INGEST_SECRET_LOOKUP_BUDGET_SECS", v)?;
        }
        if let Some(v) = lookup("RAW_INGEST_STORAGE_WRITE_BUDGET_SECS") {
            self.budget.storage_write_secs = parse("RAW_INGEST_STORAGE_WRITE_BUDGET_SECS", v)?;
        }
        if let Some(v) = lookup("RAW_INGEST_SECRETS_PATH") {
            self.secrets.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("RAW_INGEST_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("RAW_INGEST_STORAGE_BACKEND") {
            self.storage.backend = match v.trim().to_ascii_lowercase().as_str() {
                "fs" => StorageBackend::Fs,
                "supabase" => StorageBackend::Supabase,
                "memory" => StorageBackend::Memory,
                _ => {
                    return Err(SettingsError::InvalidOverride {
                        var: "RAW_INGEST_STORAGE_BACKEND",
                        value: v,
                    })
                }
            };
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.http.attempt_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn secret_lookup_budget(&self) -> Duration {
        Duration::from_secs(self.budget.secret_lookup_secs)
    }

    pub fn storage_write_budget(&self) -> Duration {
        Duration::from_secs(self.budget.storage_write_secs)
    }

    pub fn invocation_budget(&self) -> Duration {
        Duration::from_secs(self.budget.invocation_secs)
    }

    /// Longest an invocation can legitimately take with these settings, or
    /// `None` if the total overflows.
    pub fn worst_case_invocation(&self) -> Option<Duration> {
        let fetch = self
            .attempt_timeout()
            .checked_mul(self.retry.max_attempts.max(1))?
            .checked_add(self.retry.worst_case_delay()?)?;
        self.secret_lookup_budget()
            .checked_add(fetch)?
            .checked_add(self.storage_write_budget())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.retry.max_attempts == 0 {
            return Err(SettingsError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.http.attempt_timeout_secs == 0 {
            return Err(SettingsError::Invalid("http.attempt_timeout_secs must be positive".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(SettingsError::Invalid("cache.ttl_secs must be positive".into()));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(SettingsError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        let limits = [
            ("http.attempt_timeout_secs", self.http.attempt_timeout_secs, MAX_SECS),
            ("cache.ttl_secs", self.cache.ttl_secs, MAX_SECS),
            ("budget.secret_lookup_secs", self.budget.secret_lookup_secs, MAX_SECS),
            ("budget.storage_write_secs", self.budget.storage_write_secs, MAX_SECS),
            ("budget.invocation_secs", self.budget.invocation_secs, MAX_SECS),
            ("retry.max_attempts", u64::from(self.retry.max_attempts), MAX_ATTEMPTS),
            ("retry.max_delay_ms", millis(self.retry.max_delay), MAX_SECS * 1000),
            ("retry.jitter_ms", millis(self.retry.jitter), MAX_SECS * 1000),
        ];
        for (name, value, max) in limits {
            if value > max {
                return Err(SettingsError::Invalid(format!("{} must not exceed {}", name, max)));
            }
        }
        let worst = self.worst_case_invocation().ok_or_else(|| {
            SettingsError::Invalid("worst-case invocation time overflows".into())
        })?;
        if self.invocation_budget() <= worst {
            return Err(SettingsError::Invalid(format!(
                "budget.invocation_secs ({}s) must exceed the worst-case stage total ({:.1}s)",
                self.budget.invocation_secs,
                worst.as_secs_f64()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let settings = IngestSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.storage.encryption, EncryptionDirective::Aes256);
    }

    #[test]
    fn parses_partial_toml() {
        let settings = IngestSettings::from_toml(
            r#"
            [http]
            attempt_timeout_secs = 10

            [retry]
            max_attempts = 5
            retryable_statuses = [429, 408]

            [storage]
            backend = "supabase"
            encryption = { algorithm = "kms", key_id = "alias/raw" }
            "#,
        )
        .unwrap();
        assert_eq!(settings.attempt_timeout(), Duration::from_secs(10));
        assert_eq!(settings.retry.max_attempts, 5);
        assert!(settings.retry.is_retryable_status(408));
        assert_eq!(settings.storage.backend, StorageBackend::Supabase);
        assert_eq!(
            settings.storage.encryption,
            EncryptionDirective::Kms { key_id: "alias/raw".into() }
        );
        assert_eq!(settings.cache.ttl_secs, 300);
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RAW_INGEST_MAX_ATTEMPTS", "2"),
            ("RAW_INGEST_CACHE_TTL_SECS", "30"),
            ("RAW_INGEST_STORAGE_BACKEND", "memory"),
        ]);
        let mut settings = IngestSettings::default();
        settings
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.cache.ttl_secs, 30);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn bad_override_is_reported() {
        let mut settings = IngestSettings::default();
        let err = settings
            .apply_overrides(|k| (k == "RAW_INGEST_MAX_ATTEMPTS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidOverride { var: "RAW_INGEST_MAX_ATTEMPTS", .. }));
    }

    #[test]
    fn budget_must_cover_worst_case() {
        let mut settings = IngestSettings::default();
        // 5 + 3 * 15 + backoff + 10 is already more than 60
        settings.budget.invocation_secs = 60;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        settings.budget.invocation_secs = 120;
        settings.validate().unwrap();
    }

    #[test]
    fn oversized_values_are_rejected_not_panicking() {
        let mut settings = IngestSettings::default();
        settings
            .apply_overrides(|k| {
                (k == "RAW_INGEST_ATTEMPT_TIMEOUT_SECS").then(|| u64::MAX.to_string())
            })
            .unwrap();
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let mut settings = IngestSettings::default();
        settings.cache.ttl_secs = u64::MAX;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let mut settings = IngestSettings::default();
        settings.retry.jitter = Duration::from_millis(u64::MAX);
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn worst_case_overflow_is_none() {
        let mut settings = IngestSettings::default();
        settings.http.attempt_timeout_secs = u64::MAX;
        assert_eq!(settings.worst_case_invocation(), None);
    }

    #[test]
    fn example_file_matches_defaults() {
        let settings = IngestSettings::from_toml(include_str!("../raw_ingest.example.toml")).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.retry, RetryPolicy::default());
        assert_eq!(settings.invocation_budget(), IngestSettings::default().invocation_budget());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = IngestSettings::load(Some(Path::new("/nonexistent/raw_ingest.toml"))).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }
}
