//! Runtime configuration – reads `~/.brick/config.toml`.
//!
//! Every field has a default, so an empty or partial file is valid.  After
//! parsing, `BRICK_*` environment variables override individual fields.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use brick_hal::HubConfig;
use brick_types::{Color, PERIOD_MS, Pattern, Port, PortRange};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for the hub and the periodic scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickConfig {
    /// Directory holding the `tacho-motor` and `leds` device classes.
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    /// Scheduler tick period in milliseconds.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    #[serde(default = "default_first_motor_port")]
    pub first_motor_port: Port,

    #[serde(default = "default_last_motor_port")]
    pub last_motor_port: Port,

    /// Port that carries the status light.  The LEDs form one light, so at
    /// most one port may be listed.
    #[serde(default = "default_light_ports")]
    pub light_ports: Vec<Port>,

    /// LED class devices driving each light.
    #[serde(default = "default_led_names")]
    pub led_names: Vec<String>,

    /// Shown on every light once the scheduler starts.
    #[serde(default = "default_startup_color")]
    pub startup_color: Color,

    #[serde(default = "default_startup_pattern")]
    pub startup_pattern: Pattern,

    /// Use a Linux `timerfd` rather than a sleep loop.
    #[serde(default = "default_use_timerfd")]
    pub use_timerfd: bool,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class")
}
fn default_period_ms() -> u64 {
    PERIOD_MS
}
fn default_first_motor_port() -> Port {
    Port::A
}
fn default_last_motor_port() -> Port {
    Port::D
}
fn default_light_ports() -> Vec<Port> {
    vec![Port::SELF]
}
fn default_led_names() -> Vec<String> {
    [
        "led0:red:brick-status",
        "led0:green:brick-status",
        "led1:red:brick-status",
        "led1:green:brick-status",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_startup_color() -> Color {
    Color::Green
}
fn default_startup_pattern() -> Pattern {
    Pattern::Breathe
}
fn default_use_timerfd() -> bool {
    true
}

impl Default for BrickConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            period_ms: default_period_ms(),
            first_motor_port: default_first_motor_port(),
            last_motor_port: default_last_motor_port(),
            light_ports: default_light_ports(),
            led_names: default_led_names(),
            startup_color: default_startup_color(),
            startup_pattern: default_startup_pattern(),
            use_timerfd: default_use_timerfd(),
        }
    }
}

impl BrickConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn motor_ports(&self) -> PortRange {
        PortRange::new(self.first_motor_port, self.last_motor_port)
    }

    /// Borrow the parts the hub needs.
    pub fn hub_config(&self) -> HubConfig<'_> {
        HubConfig {
            sysfs_root: &self.sysfs_root,
            motor_ports: self.motor_ports(),
            light_ports: &self.light_ports,
            led_names: &self.led_names,
        }
    }

    /// Reject settings the runtime cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::Invalid("period_ms must be greater than zero".into()));
        }
        if self.first_motor_port.raw() > self.last_motor_port.raw() {
            return Err(ConfigError::Invalid(format!(
                "first_motor_port {} is after last_motor_port {}",
                self.first_motor_port, self.last_motor_port
            )));
        }
        if self.light_ports.len() > 1 {
            return Err(ConfigError::Invalid(format!(
                "light_ports lists {} ports but the status LEDs drive a single light",
                self.light_ports.len()
            )));
        }
        Ok(())
    }
}

/// Return the path to `~/.brick/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".brick").join("config.toml")
}

/// Load the config from `~/.brick/config.toml`.  Returns `None` if the file
/// does not exist.
pub fn load() -> Result<Option<BrickConfig>, ConfigError> {
    load_from(&config_path())
}

/// Load, override from the environment and validate the config at `path`.
pub fn load_from(path: &Path) -> Result<Option<BrickConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg = parse(&raw)?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Parse TOML text without touching the environment.
pub fn parse(raw: &str) -> Result<BrickConfig, ConfigError> {
    Ok(toml::from_str(raw)?)
}

/// Apply `BRICK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `BRICK_SYSFS_ROOT` | `sysfs_root` |
/// | `BRICK_PERIOD_MS` | `period_ms` |
/// | `BRICK_USE_TIMERFD` | `use_timerfd` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut BrickConfig) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides_from(cfg: &mut BrickConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BRICK_SYSFS_ROOT") {
        cfg.sysfs_root = PathBuf::from(v);
    }
    if let Some(v) = lookup("BRICK_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.period_ms = ms;
    }
    if let Some(v) = lookup("BRICK_USE_TIMERFD")
        && let Ok(flag) = v.parse::<bool>()
    {
        cfg.use_timerfd = flag;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = BrickConfig::default();
        assert_eq!(cfg.sysfs_root, PathBuf::from("/sys/class"));
        assert_eq!(cfg.period(), Duration::from_millis(10));
        assert_eq!(cfg.motor_ports(), PortRange::MOTORS);
        assert_eq!(cfg.light_ports, vec![Port::SELF]);
        assert_eq!(cfg.led_names.len(), 4);
        assert_eq!(cfg.startup_color, Color::Green);
        assert_eq!(cfg.startup_pattern, Pattern::Breathe);
        assert!(cfg.use_timerfd);
        cfg.validate().unwrap();
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(parse("").unwrap(), BrickConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = parse(
            r#"
            period_ms = 20
            last_motor_port = "B"
            startup_color = "orange"
            startup_pattern = "flash"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.period_ms, 20);
        assert_eq!(cfg.motor_ports(), PortRange::new(Port::A, Port::B));
        assert_eq!(cfg.startup_color, Color::Orange);
        assert_eq!(cfg.startup_pattern, Pattern::Flash);
        assert!(cfg.use_timerfd);
    }

    #[test]
    fn port_must_be_a_single_label() {
        assert!(matches!(parse(r#"first_motor_port = "AB""#), Err(ConfigError::Parse(_))));
        assert!(matches!(parse(r#"first_motor_port = "€""#), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn zero_period_is_rejected() {
        let cfg = BrickConfig {
            period_ms: 0,
            ..BrickConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reversed_motor_range_is_rejected() {
        let cfg = BrickConfig {
            first_motor_port: Port::D,
            last_motor_port: Port::A,
            ..BrickConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn more_than_one_light_port_is_rejected() {
        let cfg = BrickConfig {
            light_ports: vec![Port::SELF, Port::SELF],
            ..BrickConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        let none = BrickConfig {
            light_ports: Vec::new(),
            ..BrickConfig::default()
        };
        none.validate().unwrap();
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = BrickConfig::default();
        apply_overrides_from(
            &mut cfg,
            env(&[
                ("BRICK_SYSFS_ROOT", "/tmp/fake-sys"),
                ("BRICK_PERIOD_MS", "25"),
                ("BRICK_USE_TIMERFD", "false"),
            ]),
        );
        assert_eq!(cfg.sysfs_root, PathBuf::from("/tmp/fake-sys"));
        assert_eq!(cfg.period_ms, 25);
        assert!(!cfg.use_timerfd);
    }

    #[test]
    fn env_overrides_ignore_garbage() {
        let mut cfg = BrickConfig::default();
        apply_overrides_from(
            &mut cfg,
            env(&[("BRICK_PERIOD_MS", "soon"), ("BRICK_USE_TIMERFD", "maybe")]),
        );
        assert_eq!(cfg, BrickConfig::default());
    }

    #[test]
    fn config_path_points_to_brick_dir() {
        let p = config_path_for_home("/home/robot");
        assert_eq!(p, PathBuf::from("/home/robot/.brick/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).unwrap().is_none());
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "light_ports = [\"@\"]\nuse_timerfd = false\n").unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.light_ports, vec![Port::SELF]);
    }

    #[test]
    fn serialized_default_parses_back() {
        let text = toml::to_string(&BrickConfig::default()).unwrap();
        assert_eq!(parse(&text).unwrap(), BrickConfig::default());
    }
}
