//! Collaborator interfaces for device state and host metadata
//!
//! The sweep only talks to the operating system through these traits, so the
//! platform mechanisms (volume scripting, device queries, host lookups) live in
//! backends that can be swapped out or mocked.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a volume backend
#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("Volume command failed: {0}")]
    Command(String),

    #[error("Unparsable volume output: {0:?}")]
    Parse(String),

    #[error("Volume control not supported on this platform")]
    Unsupported,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads and sets the device output volume as an integer percent
pub trait VolumeController: Send + Sync {
    /// Current output volume (0-100)
    fn get(&self) -> Result<u8, VolumeError>;

    /// Set output volume (0-100)
    fn set(&self, percent: u8) -> Result<(), VolumeError>;
}

/// Names of the devices a trial runs on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub output_device_name: String,
    pub input_device_name: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            output_device_name: "Unknown Output".to_string(),
            input_device_name: "Unknown Input".to_string(),
        }
    }
}

/// Reports the current default output and input devices
pub trait DeviceInfoProvider: Send + Sync {
    fn current(&self) -> DeviceInfo;
}

/// Host metadata attached to every webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(rename = "Hostname")]
    pub hostname: String,
    #[serde(rename = "SerialNumber")]
    pub serial_number: String,
    pub os: String,
    pub os_version: String,
    pub platform: String,
    pub machine: String,
    pub processor: String,
    pub app_version: String,
    pub user: String,
}

/// Gathers a fresh [`SystemInfo`] snapshot
pub trait SystemInfoProvider: Send + Sync {
    fn snapshot(&self) -> SystemInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_devices_default() {
        let info = DeviceInfo::default();
        assert_eq!(info.output_device_name, "Unknown Output");
        assert_eq!(info.input_device_name, "Unknown Input");
    }

    #[test]
    fn test_system_info_json_keys() {
        let info = SystemInfo {
            hostname: "studio-mac".to_string(),
            serial_number: "C02XYZ".to_string(),
            os: "macos".to_string(),
            os_version: "14.5".to_string(),
            platform: "macos-14.5-aarch64".to_string(),
            machine: "aarch64".to_string(),
            processor: "arm".to_string(),
            app_version: "0.1.0".to_string(),
            user: "tester".to_string(),
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["Hostname"], "studio-mac");
        assert_eq!(json["SerialNumber"], "C02XYZ");
        assert_eq!(json["os_version"], "14.5");
        assert_eq!(json["user"], "tester");
    }
}
