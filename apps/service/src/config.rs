use std::{env, fmt, fs, io, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use upwatch::{ProbeConfig, RangeError, Target, TargetError, TimeRange};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("No configuration directory: set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,

    #[error("Invalid target {url}: {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: TargetError,
    },

    #[error(transparent)]
    InvalidWindow(#[from] RangeError),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: Logging,
    pub probe: ProbeSettings,
    pub report: ReportSettings,
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    /// `compact` or `json`
    pub format: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub socket_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub max_redirects: usize,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        let defaults = ProbeConfig::default();
        Self {
            socket_timeout_seconds: defaults.socket_timeout.as_secs(),
            request_timeout_seconds: defaults.request_timeout.as_secs(),
            max_redirects: defaults.max_redirects,
            user_agent: defaults.user_agent,
            accept_invalid_certs: defaults.accept_invalid_certs,
        }
    }
}

impl ProbeSettings {
    pub fn to_probe_config(&self) -> ProbeConfig {
        ProbeConfig::default()
            .with_socket_timeout(Duration::from_secs(self.socket_timeout_seconds.max(1)))
            .with_request_timeout(Duration::from_secs(self.request_timeout_seconds.max(1)))
            .with_max_redirects(self.max_redirects)
            .with_user_agent(self.user_agent.clone())
            .with_accept_invalid_certs(self.accept_invalid_certs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// One of 1h, 3h, 6h, 12h, 24h, 2d, 7d, 14d, 30d, 90d
    pub window: String,
    pub period_seconds: u64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self { window: TimeRange::default().to_string(), period_seconds: 3600 }
    }
}

impl ReportSettings {
    pub fn window(&self) -> Result<TimeRange, ConfigError> {
        Ok(self.window.parse()?)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds.max(60))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default = "default_status_min")]
    pub status_min: u16,
    #[serde(default = "default_status_max")]
    pub status_max: u16,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_interval() -> u64 {
    upwatch::target::DEFAULT_INTERVAL_SECONDS
}

fn default_status_min() -> u16 {
    200
}

fn default_status_max() -> u16 {
    299
}

fn default_enabled() -> bool {
    true
}

impl TargetConfig {
    fn example() -> Self {
        Self {
            url: "https://example.com".into(),
            id: None,
            name: None,
            interval_seconds: default_interval(),
            keyword: None,
            status_min: default_status_min(),
            status_max: default_status_max(),
            enabled: true,
        }
    }

    /// Build and validate the target this entry describes
    pub fn to_target(&self) -> Result<Target, ConfigError> {
        let mut target = Target::new(self.url.clone())
            .with_interval(self.interval_seconds)
            .with_status_range(self.status_min, self.status_max)
            .with_enabled(self.enabled);

        if let Some(id) = self.id {
            target = target.with_id(id);
        }
        if let Some(name) = &self.name {
            target = target.with_name(name.clone());
        }
        if let Some(keyword) = &self.keyword {
            target = target.with_keyword(keyword.clone());
        }

        target
            .validate()
            .map_err(|source| ConfigError::InvalidTarget { url: self.url.clone(), source })?;
        Ok(target)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/upwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("upwatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        write_title_1(f, "Probe")?;
        write_1(f, "Socket Timeout (s)", &self.probe.socket_timeout_seconds)?;
        write_1(f, "Request Timeout (s)", &self.probe.request_timeout_seconds)?;
        write_1(f, "Max Redirects", &self.probe.max_redirects)?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_1(f, "Accept Invalid Certs", &self.probe.accept_invalid_certs)?;

        write_title_1(f, "Report")?;
        write_1(f, "Window", &self.report.window)?;
        write_1(f, "Period (s)", &self.report.period_seconds)?;

        write_title_1(f, "Targets")?;
        for target in &self.targets {
            write_1(f, "URL", &target.url)?;
            write_2(f, "Interval (s)", &target.interval_seconds)?;
            write_2(f, "Status Range", &format!("{}-{}", target.status_min, target.status_max))?;
            if let Some(keyword) = &target.keyword {
                write_2(f, "Keyword", keyword)?;
            }
            write_2(f, "Enabled", &target.enabled)?;
        }

        Ok(())
    }
}

impl Config {
    /// Configuration written on first start
    pub fn initial() -> Self {
        Self { targets: vec![TargetConfig::example()], ..Default::default() }
    }

    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/upwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::initial();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Validated targets, in file order
    pub fn targets(&self) -> Result<Vec<Target>, ConfigError> {
        self.targets.iter().map(TargetConfig::to_target).collect()
    }
}
