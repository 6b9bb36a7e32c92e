use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kecontact::DEFAULT_PORT;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Settings {
    /// Seconds between refreshes
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    pub devices: Vec<DeviceSettings>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeviceSettings {
    #[serde(default = "default_name")]
    pub name: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Local UDP port, the device port if unset
    #[serde(default)]
    pub local_port: Option<u16>,

    /// Response timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub sensors: Vec<SensorSettings>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SensorSettings {
    /// Report field name, e.g. "E total"
    pub field: String,

    #[serde(default)]
    pub unit: String,
}

fn default_scan_interval() -> u64 {
    30
}

fn default_name() -> String {
    "keba_kecontact".to_owned()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
        let path = path.as_ref();
        let mut json = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut json))
            .map_err(|source| SettingsError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Settings, SettingsError> {
        let v: Settings = serde_json::from_str(json)?;
        v.validate()?;
        Ok(v)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceSettings> {
        self.devices.iter().find(|d| d.name == name)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.devices.is_empty() {
            return Err(SettingsError::Invalid("no devices configured".to_owned()));
        }
        if self.scan_interval == 0 {
            return Err(SettingsError::Invalid("scan_interval must be > 0".to_owned()));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for d in &self.devices {
            if d.port == 0 {
                return Err(SettingsError::Invalid(format!("{}: port must be > 0", d.name)));
            }
            if !names.insert(d.name.as_str()) {
                return Err(SettingsError::Invalid(format!("duplicate device name {}", d.name)));
            }
            // each gateway owns its socket
            if !ports.insert(d.local_port()) {
                return Err(SettingsError::Invalid(format!(
                    "{}: local port {} already used by another device",
                    d.name,
                    d.local_port()
                )));
            }
        }
        Ok(())
    }
}

impl DeviceSettings {
    pub fn local_port(&self) -> u16 {
        self.local_port.unwrap_or(self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
