use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::bmc::{HardwareReader, HardwareWriter};

pub const SCAN_STEP_PERCENT: usize = 10;
pub const SETTLE_TIME: Duration = Duration::from_secs(10);

// Measure the fan RPM for each commanded percentage between min and
// max, waiting for the fans to settle at every step. The fans are put
// back on the first percentage at the end. The BMC has to be in direct
// control mode for the speed commands to have any effect
pub async fn scan<B>(
    bmc: &B,
    min_percent: u8,
    max_percent: u8,
    settle_time: Duration,
) -> Result<(Vec<u8>, Vec<u32>)>
where
    B: HardwareReader + HardwareWriter,
{
    info!("Begin scanning");

    let percentages: Vec<u8> = (min_percent..=max_percent)
        .step_by(SCAN_STEP_PERCENT)
        .collect();

    if percentages.is_empty() {
        return Err(anyhow!(
            "Empty scan range {min_percent}%..{max_percent}%"
        ));
    }

    let mut rpms = Vec::with_capacity(percentages.len());
    for &percent in percentages.iter() {
        bmc.set_fan_percent(percent)
            .await
            .with_context(|| {
                format!("Error scanning, could not set {percent}%")
            })?;

        // Let the fans stabilize
        tokio::time::sleep(settle_time).await;

        let rpm = bmc.get_fan_rpm().await.with_context(|| {
            format!("Error scanning, could not get fan rpm for percentage {percent}")
        })?;

        info!("RPM is {rpm} for percentage {percent}");
        rpms.push(rpm);
    }

    bmc.set_fan_percent(percentages[0])
        .await
        .with_context(|| "Failed to reset fan speed after the scan")?;

    Ok((percentages, rpms))
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::test_utils::{FakeBmc, Write};

    #[tokio::test(start_paused = true)]
    async fn steps_by_ten_within_the_limits() {
        let bmc = FakeBmc::new();
        let begin = Instant::now();

        let (percentages, rpms) =
            scan(&bmc, 25, 68, SETTLE_TIME).await.unwrap();

        assert_eq!(percentages, vec![25, 35, 45, 55, 65]);
        assert_eq!(rpms, vec![1750, 2250, 2750, 3250, 3750]);
        assert!(begin.elapsed() >= SETTLE_TIME * 5);
        assert_eq!(bmc.writes().last(), Some(&Write::FanPercent(25)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_aborts_the_scan() {
        let bmc = FakeBmc::new();
        bmc.fail_fan_writes(1);

        assert!(scan(&bmc, 20, 60, SETTLE_TIME).await.is_err());
        assert!(bmc.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_range_is_an_error() {
        assert!(scan(&FakeBmc::new(), 70, 60, SETTLE_TIME).await.is_err());
    }
}
