pub mod executor;
pub mod ipmi;
pub mod racadm;
pub mod scan;

use std::future::Future;

use anyhow::Result;

pub use executor::CommandExecutor;
pub use ipmi::IpmiTool;

// Sensor readings exposed by the BMC. Every call is a single
// request that either returns a value or fails once all of the
// executor retries are exhausted
pub trait HardwareReader: Send + Sync {
    // Highest CPU temperature in degrees Celsius
    fn get_temperature(&self) -> impl Future<Output = Result<i32>> + Send;

    // Current speed of the monitored fan
    fn get_fan_rpm(&self) -> impl Future<Output = Result<u32>> + Send;
}

// Fan commands accepted by the BMC
pub trait HardwareWriter: Send + Sync {
    // Command every fan to the given percentage, only
    // honoured while the BMC is in direct control mode
    fn set_fan_percent(
        &self,
        percent: u8,
    ) -> impl Future<Output = Result<()>> + Send;

    // Take fan control away from the vendor firmware
    fn set_direct_mode(&self) -> impl Future<Output = Result<()>> + Send;

    // Give fan control back to the vendor firmware
    fn set_vendor_mode(&self) -> impl Future<Output = Result<()>> + Send;
}
