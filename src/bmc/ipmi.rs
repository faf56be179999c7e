use anyhow::{Context, Result};
use tracing::{debug, error};

use crate::{
    bmc::{CommandExecutor, HardwareReader, HardwareWriter},
    config::BmcConfig,
    errors::CommandError,
};

const IPMITOOL: &str = "ipmitool";

// Raw OEM fan commands understood by Dell iDRAC BMCs
const RAW_SET_FAN_SPEED: [&str; 5] = ["raw", "0x30", "0x30", "0x02", "0xff"];
const RAW_DIRECT_MODE: [&str; 5] = ["raw", "0x30", "0x30", "0x01", "0x00"];
const RAW_VENDOR_MODE: [&str; 5] = ["raw", "0x30", "0x30", "0x01", "0x01"];

// Talk to the BMC over the network through ipmitool
pub struct IpmiTool {
    executor: CommandExecutor,

    // Interface, host and credential arguments shared by every command
    base_args: Vec<String>,
    fan_sensor: String,
}

impl IpmiTool {
    pub fn new(config: &BmcConfig, executor: CommandExecutor) -> Self {
        let base_args = [
            "-I",
            "lanplus",
            "-H",
            config.host.as_str(),
            "-U",
            config.username.as_str(),
            "-P",
            config.password.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            executor,
            base_args,
            fan_sensor: config.fan_sensor.clone(),
        }
    }

    async fn ipmitool(&self, args: &[&str]) -> Result<String, CommandError> {
        let mut full_args = self.base_args.clone();
        full_args.extend(args.iter().map(|s| s.to_string()));

        self.executor.run(IPMITOOL, &full_args).await
    }
}

impl HardwareReader for IpmiTool {
    async fn get_temperature(&self) -> Result<i32> {
        let output = self
            .ipmitool(&["sdr", "type", "temperature"])
            .await
            .with_context(|| "Failed to read temperature sensors")?;

        let temp = parse_highest_cpu_temp(&output)?;
        debug!("Highest CPU temperature: {temp}°C");

        Ok(temp)
    }

    async fn get_fan_rpm(&self) -> Result<u32> {
        let output = self
            .ipmitool(&["sdr", "get", self.fan_sensor.as_str()])
            .await
            .with_context(|| {
                format!("Failed to read fan sensor \"{}\"", self.fan_sensor)
            })?;

        let rpm = parse_fan_rpm(&output)?;
        debug!("Fan \"{}\" speed: {rpm} RPM", self.fan_sensor);

        Ok(rpm)
    }
}

impl HardwareWriter for IpmiTool {
    async fn set_fan_percent(&self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(CommandError::OutOfRange(percent).into());
        }

        let speed = format!("{percent:#x}");
        let mut args = RAW_SET_FAN_SPEED.to_vec();
        args.push(speed.as_str());

        self.ipmitool(&args).await.with_context(|| {
            format!("Failed to set fan speed to {percent}%")
        })?;

        Ok(())
    }

    async fn set_direct_mode(&self) -> Result<()> {
        self.ipmitool(&RAW_DIRECT_MODE).await.map_err(|err| {
            error!("Failed to set manual fan control: {err}");
            err
        })?;

        Ok(())
    }

    async fn set_vendor_mode(&self) -> Result<()> {
        self.ipmitool(&RAW_VENDOR_MODE).await.map_err(|err| {
            error!("Failed to set vendor fan control: {err}");
            err
        })?;

        Ok(())
    }
}

// Return the hottest of the "Temp" sensors, which are the CPU
// packages, from the output of `sdr type temperature`.
// The reading is the third field from the end of the line:
// Temp | 0Eh | ok | 3.1 | 45 degrees C
pub fn parse_highest_cpu_temp(output: &str) -> Result<i32, CommandError> {
    output
        .lines()
        .filter(|line| line.starts_with("Temp"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            fields.len().checked_sub(3).and_then(|i| fields[i].parse().ok())
        })
        .max()
        .ok_or(CommandError::Parse {
            what: "CPU temperature",
        })
}

// Extract the RPM from the output of `sdr get <sensor>`:
//  Sensor Reading        : 5040 (+/- 120) RPM
pub fn parse_fan_rpm(output: &str) -> Result<u32, CommandError> {
    let line = output
        .lines()
        .find(|line| line.contains("Sensor Reading"))
        .ok_or(CommandError::Parse { what: "fan speed" })?;

    line.split([':', '('])
        .nth(1)
        .and_then(|reading| reading.trim().parse().ok())
        .ok_or(CommandError::Parse { what: "fan speed" })
}
