//! Configuration for the arm link daemon
//!
//! Loads from a TOML file: serial port settings, link timing tunables
//! and the six-joint calibration table. Calibration values captured at
//! runtime live in memory; `to_file` lets an operator snapshot them
//! back into the config.

use crate::error::{Error, Result};
use crate::link::LinkConfig;
use crate::mapping::{JointCalibration, NUM_JOINTS};
use crate::protocol::Mode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Firmware mode assumed at startup (0=IDLE)
    ///
    /// First field so TOML serialization emits it before the tables.
    #[serde(default)]
    pub default_mode: u8,
    pub serial: SerialConfig,
    #[serde(default)]
    pub link: LinkConfig,
    /// Per-joint calibration, exactly six entries
    pub joints: Vec<JointCalibration>,
}

/// Serial port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Port path ("/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud: u32,
    /// Print packets instead of opening the port
    #[serde(default)]
    pub dry_run: bool,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// Calibration problems (zero direction, wrong joint count) are
    /// fatal here rather than at first use.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        if self.joints.len() != NUM_JOINTS {
            return Err(Error::InvalidCalibration {
                joint: self.joints.len(),
                reason: format!("expected {} joints, got {}", NUM_JOINTS, self.joints.len()),
            });
        }
        for (i, joint) in self.joints.iter().enumerate() {
            joint.validate(i)?;
        }
        if Mode::from_u8(self.default_mode).is_none() {
            return Err(Error::Other(format!(
                "default_mode must be 0-3, got {}",
                self.default_mode
            )));
        }
        Ok(())
    }

    /// The joint table as a fixed-size array (after `validate`).
    pub fn joint_table(&self) -> Result<[JointCalibration; NUM_JOINTS]> {
        self.joints.clone().try_into().map_err(|v: Vec<_>| {
            Error::InvalidCalibration {
                joint: v.len(),
                reason: format!("expected {} joints, got {}", NUM_JOINTS, v.len()),
            }
        })
    }

    /// Default configuration for the 6-DOF bench arm.
    ///
    /// Calibration values here are the last captured set for the
    /// physical prototype; production use should load a TOML file.
    pub fn arm_defaults() -> Self {
        let joint = |label: &str,
                     enabled: bool,
                     ref_raw: f64,
                     ref_offset: f64,
                     direction: i8,
                     min_raw: f64,
                     max_raw: f64| JointCalibration {
            label: label.to_string(),
            enabled,
            ref_raw,
            ref_offset,
            direction,
            min_raw,
            max_raw,
        };

        Self {
            serial: SerialConfig {
                port: "/dev/ttyACM0".to_string(),
                baud: 115_200,
                dry_run: false,
            },
            link: LinkConfig::default(),
            default_mode: Mode::Idle as u8,
            joints: vec![
                joint("Joint 1", false, 0.0, 0.0, 1, 0.0, 90.0),
                joint("Joint 2 shoulder", true, 305.0, 90.0, 1, 256.0, 9.2),
                joint("Joint 3", true, 203.5, 0.0, 1, 116.0, 241.0),
                joint("Joint 4", true, 264.3, 0.0, -1, 356.0, 175.0),
                joint("Joint 5", true, 83.2, 0.0, 1, 12.8, 177.0),
                joint("Joint 6", false, 0.0, 0.0, 1, 0.0, 180.0),
            ],
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::arm_defaults()
    }
}
