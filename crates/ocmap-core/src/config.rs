use crate::error::{OcmapError, Result};
use crate::io;
use crate::paths;
use crate::retry::RetryBudget;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file, relative to the project root unless absolute.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(paths::STORE_FILE)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// GeocodeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_secs: 6.0,
            max_secs: 12.0,
        }
    }
}

impl DelayRange {
    /// Longest pause a range may ask for.
    pub const LIMIT_SECS: f64 = 3600.0;

    /// Finite, non-negative, non-empty and no longer than [`Self::LIMIT_SECS`].
    pub fn check(&self) -> Result<()> {
        let Self { min_secs, max_secs } = *self;
        let bounded = |v: f64| v.is_finite() && (0.0..=Self::LIMIT_SECS).contains(&v);
        if !bounded(min_secs) || !bounded(max_secs) || min_secs >= max_secs {
            return Err(OcmapError::InvalidConfig(format!(
                "delay range [{min_secs}, {max_secs}) must satisfy 0 <= min < max <= {}",
                Self::LIMIT_SECS
            )));
        }
        Ok(())
    }

    /// A uniformly random pause in `[min_secs, max_secs)`.
    pub fn sample(&self) -> Result<Duration> {
        self.check()?;
        let secs = rand::thread_rng().gen_range(self.min_secs..self.max_secs);
        Duration::try_from_secs_f64(secs)
            .map_err(|e| OcmapError::InvalidConfig(format!("delay of {secs}s: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// Postal-zone lookup form (GET for tokens, POST to search).
    #[serde(default = "default_primary_url")]
    pub primary_url: String,
    /// Place-search page, queried as `<url>?q=<address>`.
    #[serde(default = "default_secondary_url")]
    pub secondary_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retry budget for transient network failures against either provider.
    #[serde(default = "default_geocode_retry")]
    pub retry: RetryBudget,
    /// Randomized pause before every secondary-provider request.
    #[serde(default)]
    pub secondary_delay: DelayRange,
}

fn default_primary_url() -> String {
    "https://twzipcode.com".to_string()
}

fn default_secondary_url() -> String {
    "https://www.google.com/maps/place".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_geocode_retry() -> RetryBudget {
    RetryBudget::new(3, Duration::from_secs(2))
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            primary_url: default_primary_url(),
            secondary_url: default_secondary_url(),
            request_timeout_secs: default_request_timeout(),
            retry: default_geocode_retry(),
            secondary_delay: DelayRange::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// PreconditionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreconditionConfig {
    #[serde(default = "default_precondition_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_precondition_wait")]
    pub wait_secs: u64,
}

fn default_precondition_attempts() -> u32 {
    9
}

fn default_precondition_wait() -> u64 {
    300
}

impl Default for PreconditionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_precondition_attempts(),
            wait_secs: default_precondition_wait(),
        }
    }
}

impl PreconditionConfig {
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_attempts, Duration::from_secs(self.wait_secs))
    }
}

// ---------------------------------------------------------------------------
// NotifierConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Write alerts to the log only.
    #[default]
    Log,
    /// POST `{subject, body}` as JSON to `url`.
    Webhook { url: String },
}

// ---------------------------------------------------------------------------
// WorkflowConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitConfig {
    pub id: String,
    pub login_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_driver_path")]
    pub driver_path: PathBuf,
    #[serde(default = "default_driver_port")]
    pub driver_port: u16,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Account identity typed into the first login screen.
    #[serde(default)]
    pub identity: String,
    /// Name of the environment variable holding the account credential.
    #[serde(default = "default_credential_env")]
    pub credential_env: String,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Upper bound for a single element-presence wait.
    #[serde(default = "default_element_timeout")]
    pub element_timeout_secs: u64,
    /// Processed strictly in this order.
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

fn default_driver_path() -> PathBuf {
    PathBuf::from("/usr/local/bin/chromedriver")
}

fn default_driver_port() -> u16 {
    9515
}

fn default_headless() -> bool {
    true
}

fn default_credential_env() -> String {
    "OCMAP_MAP_CREDENTIAL".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(paths::ARTIFACT_DIR)
}

fn default_element_timeout() -> u64 {
    10
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            driver_path: default_driver_path(),
            driver_port: default_driver_port(),
            headless: default_headless(),
            identity: String::new(),
            credential_env: default_credential_env(),
            artifact_dir: default_artifact_dir(),
            element_timeout_secs: default_element_timeout(),
            units: Vec::new(),
        }
    }
}

impl WorkflowConfig {
    pub fn unit(&self, id: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub precondition: PreconditionConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            store: StoreConfig::default(),
            geocode: GeocodeConfig::default(),
            precondition: PreconditionConfig::default(),
            notifier: NotifierConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(OcmapError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// [`Config::load`], then refuse a config with Error-level findings.
    pub fn load_checked(root: &Path) -> Result<Self> {
        let cfg = Self::load(root)?;
        cfg.ensure_valid()?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&paths::config_path(root), data.as_bytes())
    }

    pub fn store_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.store.path)
    }

    pub fn artifact_dir(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.workflow.artifact_dir)
    }

    /// Read the map-account credential from the configured env var.
    pub fn credential(&self) -> Result<String> {
        let var = &self.workflow.credential_env;
        std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OcmapError::MissingCredential(var.clone()))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        // 1. Secondary delay must be a real, bounded interval
        if let Err(OcmapError::InvalidConfig(reason)) = self.geocode.secondary_delay.check() {
            push(
                WarnLevel::Error,
                format!("geocode.secondary_delay: {reason}"),
            );
        }

        // 2. Budgets that would never try anything
        if self.geocode.retry.max_attempts == 0 {
            push(
                WarnLevel::Error,
                "geocode.retry.max_attempts must be at least 1".into(),
            );
        }
        if self.precondition.max_attempts == 0 {
            push(
                WarnLevel::Error,
                "precondition.max_attempts must be at least 1".into(),
            );
        }

        // 3. Units: ids valid and unique, login URLs present
        if self.workflow.units.is_empty() {
            push(
                WarnLevel::Warning,
                "workflow.units is empty; no map layers will be updated".into(),
            );
        }
        let mut seen = HashSet::new();
        for unit in &self.workflow.units {
            if let Err(e) = paths::validate_unit_id(&unit.id) {
                push(WarnLevel::Error, e.to_string());
            }
            if !seen.insert(unit.id.as_str()) {
                push(
                    WarnLevel::Error,
                    format!("duplicate unit id '{}' in workflow.units", unit.id),
                );
            }
            if unit.login_url.trim().is_empty() {
                push(
                    WarnLevel::Warning,
                    format!("unit '{}' has no login_url and will be skipped", unit.id),
                );
            }
        }

        // 4. Environment the layer stage depends on
        if !self.workflow.units.is_empty() {
            if !self.workflow.driver_path.exists() {
                push(
                    WarnLevel::Warning,
                    format!(
                        "driver binary not found at {}; the layer stage will be skipped",
                        self.workflow.driver_path.display()
                    ),
                );
            }
            if self.workflow.identity.is_empty() {
                push(WarnLevel::Warning, "workflow.identity is empty".into());
            }
            if std::env::var_os(&self.workflow.credential_env).is_none() {
                push(
                    WarnLevel::Warning,
                    format!(
                        "credential env var '{}' is not set",
                        self.workflow.credential_env
                    ),
                );
            }
        }

        if let NotifierConfig::Webhook { url } = &self.notifier {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                push(
                    WarnLevel::Error,
                    format!("notifier.url '{url}' must be an http(s) URL"),
                );
            }
        }

        warnings
    }

    /// `Err` listing every Error-level finding of [`Config::validate`].
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(OcmapError::InvalidConfig(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(id: &str, url: &str) -> UnitConfig {
        UnitConfig {
            id: id.into(),
            login_url: url.into(),
        }
    }

    fn errors(cfg: &Config) -> Vec<String> {
        cfg.validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect()
    }

    #[test]
    fn default_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.geocode.secondary_delay, DelayRange::default());
        assert_eq!(loaded.precondition.max_attempts, 9);
        assert_eq!(loaded.notifier, NotifierConfig::Log);
    }

    #[test]
    fn load_without_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(OcmapError::NotInitialized)
        ));
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let yaml = r#"
workflow:
  identity: agent@example.test
  units:
    - id: ALEXY
      login_url: https://accounts.example.test/signin?x=1
notifier:
  type: webhook
  url: https://hooks.example.test/ocmap
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.workflow.units.len(), 1);
        assert_eq!(cfg.workflow.driver_port, 9515);
        assert!(cfg.workflow.headless);
        assert_eq!(cfg.geocode.primary_url, "https://twzipcode.com");
        assert_eq!(
            cfg.notifier,
            NotifierConfig::Webhook {
                url: "https://hooks.example.test/ocmap".into()
            }
        );
        assert_eq!(
            cfg.workflow.unit("ALEXY").map(|u| u.id.as_str()),
            Some("ALEXY")
        );
        assert!(cfg.workflow.unit("NOBODY").is_none());
    }

    #[test]
    fn validate_flags_inverted_delay() {
        let mut cfg = Config::default();
        cfg.geocode.secondary_delay = DelayRange {
            min_secs: 12.0,
            max_secs: 6.0,
        };
        let errs = errors(&cfg);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("secondary_delay"));
    }

    #[test]
    fn validate_rejects_unbounded_delays() {
        for (min_secs, max_secs) in [
            (6.0, f64::INFINITY),
            (f64::NAN, 12.0),
            (-1.0, 12.0),
            (1e20, 1e21),
            (6.0, DelayRange::LIMIT_SECS + 1.0),
        ] {
            let mut cfg = Config::default();
            cfg.geocode.secondary_delay = DelayRange { min_secs, max_secs };
            let errs = errors(&cfg);
            assert_eq!(errs.len(), 1, "[{min_secs}, {max_secs}) should be rejected");
            assert!(errs[0].starts_with("geocode.secondary_delay"));
        }
    }

    #[test]
    fn delay_sample_stays_in_range_or_errors() {
        let range = DelayRange::default();
        for _ in 0..50 {
            let d = range.sample().unwrap();
            assert!(d >= Duration::from_secs(6) && d < Duration::from_secs(12));
        }
        let infinite = DelayRange {
            min_secs: 6.0,
            max_secs: f64::INFINITY,
        };
        assert!(matches!(infinite.sample(), Err(OcmapError::InvalidConfig(_))));
        let huge = DelayRange {
            min_secs: 1e20,
            max_secs: 1.0,
        };
        assert!(matches!(huge.sample(), Err(OcmapError::InvalidConfig(_))));
    }

    #[test]
    fn load_checked_refuses_error_level_findings() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.geocode.secondary_delay.max_secs = f64::INFINITY;
        cfg.workflow.units = vec![unit("../x", "https://a")];
        cfg.save(dir.path()).unwrap();

        assert!(Config::load(dir.path()).is_ok());
        let err = Config::load_checked(dir.path()).unwrap_err().to_string();
        assert!(err.contains("geocode.secondary_delay"), "{err}");
        assert!(err.contains("invalid unit id '../x'"), "{err}");

        Config::default().save(dir.path()).unwrap();
        assert!(Config::load_checked(dir.path()).is_ok());
    }

    #[test]
    fn validate_flags_duplicate_and_bad_units() {
        let mut cfg = Config::default();
        cfg.workflow.units = vec![
            unit("ALEXY", "https://a"),
            unit("ALEXY", "https://b"),
            unit("../x", "https://c"),
        ];
        let errs = errors(&cfg);
        assert!(errs.iter().any(|m| m.contains("duplicate unit id 'ALEXY'")));
        assert!(errs.iter().any(|m| m.contains("invalid unit id '../x'")));
    }

    #[test]
    fn validate_warns_on_empty_units_and_login_url() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("units is empty")));

        let mut cfg = Config::default();
        cfg.workflow.units = vec![unit("JULIAN", "  ")];
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("'JULIAN' has no login_url")));
    }

    #[test]
    fn validate_rejects_non_http_webhook() {
        let mut cfg = Config::default();
        cfg.notifier = NotifierConfig::Webhook {
            url: "smtp://mail".into(),
        };
        assert!(errors(&cfg).iter().any(|m| m.contains("notifier.url")));
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let cfg = Config::default();
        let root = Path::new("/srv/ocmap");
        assert_eq!(
            cfg.store_path(root),
            PathBuf::from("/srv/ocmap/.ocmap/records.db")
        );
        assert_eq!(cfg.artifact_dir(root), PathBuf::from("/srv/ocmap/output"));
    }
}
