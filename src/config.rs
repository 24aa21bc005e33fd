use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::delegation::DelegationConfig;
use crate::predict::{CatalogEntry, ObserverLocation, OrbitalElements, PassSettings, SatelliteId};
use crate::scheduler::Priority;
use crate::tracker::{AchievedAngle, TrackingSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Reads durations written as `30s`, `500ms`, `14days`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    pub elements: ElementsConfig,
    #[serde(default)]
    pub predict: PredictConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    pub satellites: Vec<SatelliteConfig>,
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
    #[serde(default)]
    pub delegation: Option<DelegationConfig>,
    #[serde(default)]
    pub web: Option<WebConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub name: Option<String>,
    pub coordinates: String,
    #[serde(default)]
    pub altitude_m: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementsConfig {
    /// A TLE file, or a directory of them.
    pub path: PathBuf,
    #[serde(default = "default_refresh", deserialize_with = "deserialize_duration")]
    pub refresh: Duration,
    #[serde(default = "default_validity", deserialize_with = "deserialize_duration")]
    pub validity: Duration,
}

fn default_refresh() -> Duration {
    Duration::from_secs(6 * 3600)
}

fn default_validity() -> Duration {
    Duration::from_secs(14 * 86400)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub step: Duration,
    pub min_elevation_deg: f64,
    /// How far ahead each snapshot looks.
    #[serde(deserialize_with = "deserialize_duration")]
    pub horizon: Duration,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(30),
            min_elevation_deg: 10.0,
            horizon: Duration::from_secs(24 * 3600),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub period: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub actuator_timeout: Duration,
    pub retry_limit: u32,
    pub fatal_limit: u32,
    pub max_slew_rate_deg_s: f64,
    pub handover_tolerance_deg: f64,
    pub stow_azimuth_deg: f64,
    pub stow_elevation_deg: f64,
    pub min_elevation_deg: f64,
    pub max_elevation_deg: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let settings = TrackingSettings::default();
        Self {
            period: settings.period,
            actuator_timeout: settings.actuator_timeout,
            retry_limit: settings.retry_limit,
            fatal_limit: settings.fatal_limit,
            max_slew_rate_deg_s: settings.max_slew_rate_deg_s,
            handover_tolerance_deg: settings.handover_tolerance_deg,
            stow_azimuth_deg: settings.stow.azimuth_deg,
            stow_elevation_deg: settings.stow.elevation_deg,
            min_elevation_deg: settings.min_elevation_deg,
            max_elevation_deg: settings.max_elevation_deg,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SatelliteConfig {
    pub norad_id: SatelliteId,
    #[serde(default)]
    pub priority: Priority,
    pub downlink_hz: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// JSON-lines file samples are appended to.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.observer()?;
        self.tracking_settings()?;
        self.pass_settings()?;

        let mut seen = HashSet::new();
        for satellite in &self.satellites {
            if !seen.insert(satellite.norad_id) {
                return Err(ConfigError::Invalid(format!(
                    "satellite {} listed twice",
                    satellite.norad_id
                )));
            }
            if let Some(hz) = satellite.downlink_hz {
                if !(hz.is_finite() && hz > 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "satellite {}: downlink frequency must be positive",
                        satellite.norad_id
                    )));
                }
            }
        }

        if self.predict.horizon.is_zero() || self.elements.refresh.is_zero() {
            return Err(ConfigError::Invalid(
                "prediction horizon and element refresh must be positive".into(),
            ));
        }
        if let Some(delegation) = &self.delegation {
            delegation
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    pub fn observer(&self) -> Result<ObserverLocation, ConfigError> {
        ObserverLocation::from_coordinates(&self.station.coordinates, Some(self.station.altitude_m))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "station coordinates must be \"lat, lon\", got {:?}",
                    self.station.coordinates
                ))
            })
    }

    pub fn pass_settings(&self) -> Result<PassSettings, ConfigError> {
        let step = chrono::Duration::from_std(self.predict.step)
            .map_err(|e| ConfigError::Invalid(format!("predict step: {e}")))?;
        let validity = chrono::Duration::from_std(self.elements.validity)
            .map_err(|e| ConfigError::Invalid(format!("element validity: {e}")))?;
        if step <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid("predict step must be positive".into()));
        }
        if !(-90.0..90.0).contains(&self.predict.min_elevation_deg) {
            return Err(ConfigError::Invalid(
                "predict min elevation must be within [-90, 90)".into(),
            ));
        }
        Ok(PassSettings {
            min_elevation_deg: self.predict.min_elevation_deg,
            step,
            validity,
        })
    }

    pub fn tracking_settings(&self) -> Result<TrackingSettings, ConfigError> {
        let t = &self.tracker;
        let settings = TrackingSettings {
            period: t.period,
            actuator_timeout: t.actuator_timeout,
            retry_limit: t.retry_limit,
            fatal_limit: t.fatal_limit,
            max_slew_rate_deg_s: t.max_slew_rate_deg_s,
            handover_tolerance_deg: t.handover_tolerance_deg,
            stow: AchievedAngle {
                azimuth_deg: t.stow_azimuth_deg,
                elevation_deg: t.stow_elevation_deg,
            },
            min_elevation_deg: t.min_elevation_deg,
            max_elevation_deg: t.max_elevation_deg,
        };
        settings
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(settings)
    }

    /// Pairs each configured satellite with its loaded elements. Returns the
    /// ids that had no elements alongside the catalog.
    pub fn catalog(
        &self,
        elements: &HashMap<SatelliteId, OrbitalElements>,
    ) -> (Vec<CatalogEntry>, Vec<SatelliteId>) {
        let mut catalog = Vec::with_capacity(self.satellites.len());
        let mut missing = Vec::new();
        for satellite in &self.satellites {
            match elements.get(&satellite.norad_id) {
                Some(found) => catalog.push(CatalogEntry {
                    elements: Arc::new(found.clone()),
                    priority: satellite.priority,
                    downlink_hz: satellite.downlink_hz,
                }),
                None => missing.push(satellite.norad_id),
            }
        }
        (catalog, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::fixtures::{epoch, leo_elements};

    const MINIMAL: &str = r#"
station:
  coordinates: "45.0, -93.0"
  altitude_m: 300
elements:
  path: /var/lib/sat-track/elements
satellites:
  - norad_id: 25544
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = MINIMAL.parse().unwrap();
        assert_eq!(config.observer().unwrap(), ObserverLocation::new(45.0, -93.0, 300.0));
        assert_eq!(config.elements.refresh, Duration::from_secs(6 * 3600));
        assert_eq!(config.satellites[0].priority, Priority::Medium);
        assert!(config.telemetry.is_none());
        assert!(config.delegation.is_none());
        assert!(config.web.is_none());

        let passes = config.pass_settings().unwrap();
        assert_eq!(passes.min_elevation_deg, 10.0);
        assert_eq!(passes.step, chrono::Duration::seconds(30));
        assert_eq!(passes.validity, chrono::Duration::days(14));

        let tracking = config.tracking_settings().unwrap();
        assert_eq!(tracking.period, Duration::from_secs(1));
        assert_eq!(tracking.retry_limit, 3);
    }

    #[test]
    fn full_config() {
        let yaml = r#"
station:
  name: Roof
  coordinates: "52.5, 13.4"
elements:
  path: elements.tle
  refresh: 2h
  validity: 7days
predict:
  step: 15s
  min_elevation_deg: 5
  horizon: 12h
tracker:
  period: 500ms
  actuator_timeout: 200ms
  retry_limit: 5
  max_slew_rate_deg_s: 3.5
  stow_azimuth_deg: 180
satellites:
  - norad_id: 25544
    priority: critical
    downlink_hz: 145800000
  - norad_id: 43017
    priority: low
telemetry:
  path: /tmp/telemetry.jsonl
delegation:
  endpoint: local://agent
  timeout: 10s
web:
  bind: 127.0.0.1:9000
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.station.name.as_deref(), Some("Roof"));
        assert_eq!(config.elements.validity, Duration::from_secs(7 * 86400));
        assert_eq!(config.predict.horizon, Duration::from_secs(12 * 3600));

        let tracking = config.tracking_settings().unwrap();
        assert_eq!(tracking.period, Duration::from_millis(500));
        assert_eq!(tracking.retry_limit, 5);
        assert_eq!(tracking.fatal_limit, 10);
        assert_eq!(tracking.stow.azimuth_deg, 180.0);
        assert_eq!(tracking.stow.elevation_deg, 90.0);

        assert_eq!(config.satellites[0].priority, Priority::Critical);
        assert_eq!(config.satellites[1].downlink_hz, None);
        assert_eq!(config.delegation.unwrap().timeout, Duration::from_secs(10));
        assert_eq!(config.web.unwrap().bind, "127.0.0.1:9000");
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_coordinates = MINIMAL.replace("45.0, -93.0", "north");
        assert!(matches!(
            Config::from_str(&bad_coordinates),
            Err(ConfigError::Invalid(_))
        ));

        let duplicate = format!("{MINIMAL}  - norad_id: 25544\n");
        assert!(matches!(Config::from_str(&duplicate), Err(ConfigError::Invalid(_))));

        let zero_retries = format!("{MINIMAL}tracker:\n  retry_limit: 0\n");
        assert!(matches!(Config::from_str(&zero_retries), Err(ConfigError::Invalid(_))));

        let empty_endpoint = format!("{MINIMAL}delegation:\n  endpoint: \"\"\n");
        assert!(matches!(Config::from_str(&empty_endpoint), Err(ConfigError::Invalid(_))));

        let bad_duration = format!("{MINIMAL}predict:\n  step: soon\n");
        assert!(matches!(Config::from_str(&bad_duration), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn catalog_reports_missing_elements() {
        let yaml = MINIMAL.replace("25544", "99001") + "  - norad_id: 12345\n    priority: high\n";
        let config = Config::from_str(&yaml).unwrap();

        let loaded = HashMap::from([(99001, leo_elements(epoch()))]);
        let (catalog, missing) = config.catalog(&loaded);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].elements.norad_id, 99001);
        assert_eq!(catalog[0].priority, Priority::Medium);
        assert_eq!(missing, vec![12345]);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/sat-track.yaml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn reads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sat-track.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.satellites.len(), 1);

        std::fs::write(&path, MINIMAL.replace("45.0, -93.0", "north")).unwrap();
        assert!(Config::from_file(path.to_str().unwrap()).is_err());
    }
}
