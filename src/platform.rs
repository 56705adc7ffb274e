//! Platform backends for output volume and host metadata
//!
//! - macOS: AppleScript via `osascript`, serial number from `system_profiler`
//! - Linux: ALSA `amixer` on the `Master` control, serial number from DMI
//!
//! Other platforms report [`VolumeError::Unsupported`], which the sweep turns
//! into the fallback volume on read and an error on write.

use echotest_core::device::{SystemInfo, SystemInfoProvider, VolumeController, VolumeError};
use std::process::Command;

/// Output volume of the default device
#[derive(Debug, Default, Clone)]
pub struct SystemVolume;

impl SystemVolume {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeController for SystemVolume {
    #[cfg(target_os = "macos")]
    fn get(&self) -> Result<u8, VolumeError> {
        let out = run("osascript", &["-e", "output volume of (get volume settings)"])?;
        parse_osascript_volume(&out)
    }

    #[cfg(target_os = "macos")]
    fn set(&self, percent: u8) -> Result<(), VolumeError> {
        run(
            "osascript",
            &["-e", &format!("set volume output volume {}", percent)],
        )
        .map(|_| ())
    }

    #[cfg(target_os = "linux")]
    fn get(&self) -> Result<u8, VolumeError> {
        let out = run("amixer", &["get", "Master"])?;
        parse_amixer_volume(&out)
    }

    #[cfg(target_os = "linux")]
    fn set(&self, percent: u8) -> Result<(), VolumeError> {
        run("amixer", &["-q", "set", "Master", &format!("{}%", percent)]).map(|_| ())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    fn get(&self) -> Result<u8, VolumeError> {
        Err(VolumeError::Unsupported)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    fn set(&self, _percent: u8) -> Result<(), VolumeError> {
        Err(VolumeError::Unsupported)
    }
}

/// Run a command and return its stdout, failing on a non-zero exit
#[allow(dead_code)]
fn run(program: &str, args: &[&str]) -> Result<String, VolumeError> {
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        return Err(VolumeError::Command(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `osascript` volume output such as `"63\n"`
pub fn parse_osascript_volume(out: &str) -> Result<u8, VolumeError> {
    out.trim()
        .parse::<u8>()
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| VolumeError::Parse(out.to_string()))
}

/// Parse the first `[NN%]` field of `amixer get` output
pub fn parse_amixer_volume(out: &str) -> Result<u8, VolumeError> {
    out.split('[')
        .skip(1)
        .filter_map(|field| field.split_once("%]"))
        .find_map(|(value, _)| value.parse::<u8>().ok())
        .filter(|v| *v <= 100)
        .ok_or_else(|| VolumeError::Parse(out.to_string()))
}

/// Extract the value of the `Serial Number` line from `system_profiler` output
pub fn parse_serial_number(out: &str) -> Option<String> {
    out.lines()
        .find(|line| line.trim_start().starts_with("Serial Number"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Host metadata from the running system
#[derive(Debug, Default, Clone)]
pub struct HostSystemInfo;

impl HostSystemInfo {
    fn serial_number() -> String {
        #[cfg(target_os = "macos")]
        let serial = Command::new("system_profiler")
            .arg("SPHardwareDataType")
            .output()
            .ok()
            .and_then(|o| parse_serial_number(&String::from_utf8_lossy(&o.stdout)));

        #[cfg(target_os = "linux")]
        let serial = std::fs::read_to_string("/sys/class/dmi/id/product_serial")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        let serial: Option<String> = None;

        serial.unwrap_or_else(|| "Unknown".to_string())
    }

    fn os_version() -> String {
        let (program, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
            ("sw_vers", &["-productVersion"][..])
        } else {
            ("uname", &["-r"][..])
        };
        command_line(program, args).unwrap_or_default()
    }

    fn processor() -> String {
        command_line("uname", &["-p"])
            .filter(|p| p != "unknown")
            .unwrap_or_else(|| std::env::consts::ARCH.to_string())
    }
}

/// First line of a command's stdout, if it ran successfully
fn command_line(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}

impl SystemInfoProvider for HostSystemInfo {
    fn snapshot(&self) -> SystemInfo {
        let os = std::env::consts::OS.to_string();
        let os_version = Self::os_version();
        let machine = std::env::consts::ARCH.to_string();

        SystemInfo {
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string()),
            serial_number: Self::serial_number(),
            platform: format!("{}-{}-{}", os, os_version, machine),
            processor: Self::processor(),
            app_version: echotest_core::VERSION.to_string(),
            user: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_default(),
            os,
            os_version,
            machine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_osascript_volume() {
        assert_eq!(parse_osascript_volume("63\n").unwrap(), 63);
        assert_eq!(parse_osascript_volume("100").unwrap(), 100);
        assert!(parse_osascript_volume("missing value").is_err());
        assert!(parse_osascript_volume("180").is_err());
    }

    #[test]
    fn test_parse_amixer_volume() {
        let out = "Simple mixer control 'Master',0\n  \
                   Capabilities: pvolume pswitch\n  \
                   Front Left: Playback 42597 [65%] [on]\n  \
                   Front Right: Playback 42597 [65%] [on]\n";
        assert_eq!(parse_amixer_volume(out).unwrap(), 65);
        assert!(parse_amixer_volume("Mono: Playback [on]").is_err());
    }

    #[test]
    fn test_parse_serial_number() {
        let out = "Hardware:\n\n    Hardware Overview:\n\n      Model Name: MacBook Pro\n      \
                   Serial Number (system): C02ABC123\n      Hardware UUID: 1234\n";
        assert_eq!(parse_serial_number(out).as_deref(), Some("C02ABC123"));
        assert_eq!(parse_serial_number("Model Name: Mac"), None);
    }

    #[test]
    fn test_snapshot_fields() {
        let info = HostSystemInfo.snapshot();
        assert!(!info.hostname.is_empty());
        assert!(!info.serial_number.is_empty());
        assert_eq!(info.os, std::env::consts::OS);
        assert_eq!(info.machine, std::env::consts::ARCH);
        assert_eq!(info.app_version, echotest_core::VERSION);
        assert!(info.platform.starts_with(&info.os));
    }
}
