//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `trafficsync.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values, and `TRAFFICSYNC_LOG` takes precedence over
//! `RUST_LOG` when both are set. When no cluster is configured at all the
//! default intersection is used: a `north`/`south` tether and an `east`
//! master whose polar member is `west`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use trafficsync_app::timer::{DEFAULT_TICK_INTERVAL, TimerSettings};
use trafficsync_domain::light::{Configuration, LightState, StateDuration};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Controller loop settings.
    pub timer: TimerConfig,
    /// State durations shared by every light.
    pub durations: DurationsConfig,
    /// Tethered clusters, by light name.
    pub tethered: Vec<TetheredConfig>,
    /// Polar clusters, by light name.
    pub polar: Vec<PolarConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Controller loop configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Milliseconds between two ticks.
    pub tick_interval_ms: u64,
}

/// Seconds each state lasts. `StopThenGo` never expires.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DurationsConfig {
    pub go: u64,
    pub stop: u64,
    pub transitioning: u64,
}

/// A group of lights showing the same state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TetheredConfig {
    pub name: String,
    /// Light names; the first one drives the cluster.
    pub lights: Vec<String>,
}

/// A group of lights showing the state opposite to `master`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PolarConfig {
    pub name: String,
    pub master: String,
    pub members: Vec<String>,
}

impl Config {
    /// Load configuration from `trafficsync.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("trafficsync.toml")?;
        config.apply_env_overrides();
        config.fill_default_layout();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML document, without looking
    /// at the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.fill_default_layout();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("TRAFFICSYNC_LOG").or_else(|| var("RUST_LOG")) {
            self.logging.filter = val;
        }
        if let Some(val) = var("TRAFFICSYNC_TICK_MS")
            && let Ok(millis) = val.parse()
        {
            self.timer.tick_interval_ms = millis;
        }
    }

    fn fill_default_layout(&mut self) {
        if !self.tethered.is_empty() || !self.polar.is_empty() {
            return;
        }
        self.tethered.push(TetheredConfig {
            name: "north-south".to_string(),
            lights: vec!["north".to_string(), "south".to_string()],
        });
        self.polar.push(PolarConfig {
            name: "east-west".to_string(),
            master: "east".to_string(),
            members: vec!["west".to_string()],
        });
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timer.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "tick interval must be non-zero".to_string(),
            ));
        }
        let durations = [
            ("go", self.durations.go),
            ("stop", self.durations.stop),
            ("transitioning", self.durations.transitioning),
        ];
        if let Some((state, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Validation(format!(
                "{state} duration must be non-zero"
            )));
        }
        for cluster in &self.tethered {
            require_name("tethered cluster", &cluster.name)?;
            if cluster.lights.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "tethered cluster {} has no lights",
                    cluster.name
                )));
            }
            cluster
                .lights
                .iter()
                .try_for_each(|light| require_name("light", light))?;
        }
        for cluster in &self.polar {
            require_name("polar cluster", &cluster.name)?;
            require_name("light", &cluster.master)?;
            if cluster.members.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "polar cluster {} has no members",
                    cluster.name
                )));
            }
            cluster
                .members
                .iter()
                .try_for_each(|light| require_name("light", light))?;
        }
        Ok(())
    }

    /// Return the timer settings.
    #[must_use]
    pub fn timer_settings(&self) -> TimerSettings {
        TimerSettings {
            tick_interval: Duration::from_millis(self.timer.tick_interval_ms),
        }
    }

    /// Return a light configuration holding the configured durations.
    #[must_use]
    pub fn light_configuration(&self) -> Arc<Configuration> {
        let configuration = Configuration::new();
        configuration
            .add(LightState::Go, StateDuration::from_secs(self.durations.go))
            .add(LightState::Stop, StateDuration::from_secs(self.durations.stop))
            .add(
                LightState::Transitioning,
                StateDuration::from_secs(self.durations.transitioning),
            );
        Arc::new(configuration)
    }
}

fn require_name(what: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{what} name must not be empty")));
    }
    Ok(())
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "trafficsyncd=info,trafficsync=info".to_string(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: u64::try_from(DEFAULT_TICK_INTERVAL.as_millis()).unwrap_or(2000),
        }
    }
}

impl Default for DurationsConfig {
    fn default() -> Self {
        Self {
            go: 60,
            stop: 60,
            transitioning: 5,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.timer.tick_interval_ms, 2000);
        assert_eq!(config.durations.go, 60);
        assert_eq!(config.durations.stop, 60);
        assert_eq!(config.durations.transitioning, 5);
        assert_eq!(config.logging.filter, "trafficsyncd=info,trafficsync=info");
        assert!(config.tethered.is_empty());
    }

    #[test]
    fn should_use_default_layout_when_no_cluster_is_configured() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.tethered.len(), 1);
        assert_eq!(config.tethered[0].lights, vec!["north", "south"]);
        assert_eq!(config.polar.len(), 1);
        assert_eq!(config.polar[0].master, "east");
        assert_eq!(config.polar[0].members, vec!["west"]);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [logging]
            filter = 'debug'

            [timer]
            tick_interval_ms = 500

            [durations]
            go = 4
            stop = 4
            transitioning = 1

            [[tethered]]
            name = 'main'
            lights = ['a', 'b']

            [[polar]]
            name = 'side'
            master = 'c'
            members = ['d', 'e']
        ";
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.timer_settings().tick_interval, Duration::from_millis(500));
        assert_eq!(config.durations.go, 4);
        assert_eq!(
            config.tethered,
            vec![TetheredConfig {
                name: "main".to_string(),
                lights: vec!["a".to_string(), "b".to_string()],
            }]
        );
        assert_eq!(config.polar[0].members, vec!["d", "e"]);
    }

    #[test]
    fn should_keep_explicit_layout_without_default_polar() {
        let toml = "
            [[tethered]]
            name = 'only'
            lights = ['a']
        ";
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.tethered.len(), 1);
        assert!(config.polar.is_empty());
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let toml = "
            [durations]
            go = 30
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.durations.go, 30);
        assert_eq!(config.durations.stop, 60);
        assert_eq!(config.timer.tick_interval_ms, 2000);
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.timer.tick_interval_ms, 2000);
    }

    #[test]
    fn should_reject_zero_tick_interval() {
        let mut config = Config::default();
        config.timer.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_duration() {
        let result = Config::from_toml("[durations]\nstop = 0");
        assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("stop")));
    }

    #[test]
    fn should_reject_cluster_without_lights() {
        let toml = "
            [[tethered]]
            name = 'empty'
            lights = []
        ";
        assert!(matches!(
            Config::from_toml(toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_reject_polar_cluster_with_blank_master() {
        let toml = "
            [[polar]]
            name = 'side'
            master = ' '
            members = ['d']
        ";
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn should_build_light_configuration_from_durations() {
        let mut config = Config::default();
        config.durations.go = 4;
        let configuration = config.light_configuration();
        assert_eq!(
            configuration.duration_of(LightState::Go),
            StateDuration::from_secs(4)
        );
        assert_eq!(
            configuration.duration_of(LightState::StopThenGo),
            StateDuration::Unbounded
        );
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, val)| ((*key).to_string(), (*val).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn should_prefer_trafficsync_log_over_rust_log() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("RUST_LOG", "warn"),
            ("TRAFFICSYNC_LOG", "trafficsyncd=debug"),
        ]));
        assert_eq!(config.logging.filter, "trafficsyncd=debug");
    }

    #[test]
    fn should_fall_back_to_rust_log() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn should_ignore_unparsable_tick_override() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("TRAFFICSYNC_TICK_MS", "soon")]));
        assert_eq!(config.timer.tick_interval_ms, 2000);

        config.apply_overrides(lookup(&[("TRAFFICSYNC_TICK_MS", "250")]));
        assert_eq!(config.timer.tick_interval_ms, 250);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        assert!(matches!(
            Config::from_toml("invalid {{{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
