use std::{fs::File, io::BufReader, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    errors::ConfigError,
    pid::{PidGains, Thresholds},
};

pub const PASSWORD_ENV: &str = "BMCFAND_PASSWORD";

// Connection settings for the BMC
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BmcConfig {
    pub host: String,
    pub username: String,
    pub password: String,

    // IPMI sensor used as the fan speed feedback
    pub fan_sensor: String,
}

// Notifications stay disabled unless both host and topic are set
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct NtfyConfig {
    pub host: Option<String>,
    pub topic: Option<String>,
    pub token: Option<String>,
}

// Curve used when no scan or stored curve is available
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CurveConfig {
    pub percentages: Vec<u8>,
    pub rpms: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FanControlConfig {
    pub desired_temp: i32,
    pub max_temp: i32,
    pub hysteresis: i32,
    pub min_fan_percent: u8,
    pub max_fan_percent: u8,

    pub kp: f64,
    pub ki: f64,
    pub kd: f64,

    pub step_delay_seconds: f64,

    pub bmc: BmcConfig,
    pub ntfy: Option<NtfyConfig>,

    pub curve_path: String,
    pub default_curve: CurveConfig,

    // Measure a new calibration curve at startup
    pub scan: bool,
    pub disable_third_party_fan_mode: bool,
    pub ntfy_test: bool,
}

impl FanControlConfig {
    // Read and validate the Json configuration file. Missing
    // keys take their default value
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Parsing config file at: {:?}", path);

        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            info!("Using BMC password from {PASSWORD_ENV}");
            config.bmc.password = password;
        }

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.max_fan_percent > 100 {
            return invalid(format!(
                "max_fan_percent {} is above 100",
                self.max_fan_percent
            ));
        }
        if self.min_fan_percent > self.max_fan_percent {
            return invalid(format!(
                "min_fan_percent {} is above max_fan_percent {}",
                self.min_fan_percent, self.max_fan_percent
            ));
        }
        if self.hysteresis < 0 {
            return invalid(format!(
                "hysteresis {} is negative",
                self.hysteresis
            ));
        }
        if self.desired_temp >= self.max_temp {
            return invalid(format!(
                "desired_temp {} must be below max_temp {}",
                self.desired_temp, self.max_temp
            ));
        }
        if !(self.step_delay_seconds > 0.)
            || Duration::try_from_secs_f64(self.step_delay_seconds).is_err()
        {
            return invalid(format!(
                "step_delay_seconds {} must be a positive duration",
                self.step_delay_seconds
            ));
        }
        if self.bmc.host.trim().is_empty() {
            return invalid("bmc.host is not set".to_string());
        }

        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            desired_temp: self.desired_temp,
            max_temp: self.max_temp,
            hysteresis: self.hysteresis,
            min_fan_percent: self.min_fan_percent,
            max_fan_percent: self.max_fan_percent,
        }
    }

    pub fn gains(&self) -> PidGains {
        PidGains {
            kp: self.kp,
            ki: self.ki,
            kd: self.kd,
        }
    }

    pub fn step_delay(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.step_delay_seconds).map_err(|_| {
            ConfigError::Invalid(format!(
                "step_delay_seconds {} is not a valid duration",
                self.step_delay_seconds
            ))
        })
    }
}

impl Default for BmcConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: "root".to_string(),
            password: String::new(),
            fan_sensor: "Fan1".to_string(),
        }
    }
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            percentages: vec![20, 30, 40, 50, 60],
            rpms: vec![1560, 2040, 2640, 2880, 3360],
        }
    }
}

impl Default for FanControlConfig {
    fn default() -> Self {
        Self {
            desired_temp: 50,
            max_temp: 80,
            hysteresis: 5,
            min_fan_percent: 20,
            max_fan_percent: 60,

            kp: 1.,
            ki: 0.,
            kd: 0.,

            step_delay_seconds: 20.,

            bmc: BmcConfig::default(),
            ntfy: None,

            curve_path: "/etc/bmcfand/fan_curve.csv".to_string(),
            default_curve: CurveConfig::default(),

            scan: false,
            disable_third_party_fan_mode: false,
            ntfy_test: false,
        }
    }
}
