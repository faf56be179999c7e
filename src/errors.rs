use std::{path::PathBuf, time::Duration};

use thiserror::Error;

// Reasons a calibration curve can be rejected at build time
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurveError {
    #[error("calibration curve has no points")]
    Empty,
    #[error(
        "calibration curve has {percentages} percentages but {rpms} RPM values"
    )]
    LengthMismatch { percentages: usize, rpms: usize },
    #[error("calibration curve needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("calibration curve is not strictly increasing at point {0}")]
    NotIncreasing(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path:?}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// Outcome of a single external command once every retry is spent
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn \"{program}\"")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("\"{program}\" timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("\"{program}\" exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("could not parse {what} from command output")]
    Parse { what: &'static str },
    #[error("fan speed {0}% is out of range")]
    OutOfRange(u8),
}

// Conditions that stop the controller
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid configuration")]
    InvalidConfig(#[from] ConfigError),
    #[error("no usable calibration curve")]
    InvalidCurve(#[from] CurveError),
    #[error("failed to put the BMC into direct fan control")]
    InitialModeFailed(#[source] anyhow::Error),
    #[error("{0} consecutive temperature read failures")]
    ConsecutiveFailureCeiling(u32),
}
