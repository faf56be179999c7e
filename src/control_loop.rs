use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{select, time::Instant};
use tokio_util::sync::CancellationToken;

use tracing::{debug, error, info, warn};

use crate::{
    bmc::{
        CommandExecutor, HardwareReader, HardwareWriter, IpmiTool,
        racadm::Racadm,
        scan::{self, SETTLE_TIME},
    },
    config::FanControlConfig,
    errors::ControlError,
    fan_curve::{CalibrationCurve, store},
    fan_mode::{ControlMode, ModeStateMachine},
    notifier::{AnyNotifier, Notifier, TITLE},
    pid::{PidController, Thresholds},
};

// Consecutive failed temperature reads before giving up
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

// Start the controller against the BMC described by the configuration
// and run it until the token is cancelled or a fatal error occurs
pub async fn run(
    config: &FanControlConfig,
    run_token: CancellationToken,
) -> Result<(), ControlError> {
    let executor = CommandExecutor::new(Some(config.bmc.password.clone()));
    let bmc = Arc::new(IpmiTool::new(&config.bmc, executor.clone()));
    let notifier = Arc::new(AnyNotifier::from_config(config.ntfy.as_ref()));

    if config.ntfy_test {
        notifier.notify(TITLE, "Test message").await;
    }

    let curve = prepare_curve(config, bmc.as_ref(), notifier.as_ref()).await?;

    if config.disable_third_party_fan_mode {
        let racadm = Racadm::new(&config.bmc, executor);

        if let Err(err) = racadm.disable_third_party_fan_mode().await {
            error!("Error disabling third party fan mode: {err:#}");
            notifier
                .notify(TITLE, "Error disabling third party fan mode")
                .await;
        }
    }

    let mut control_loop =
        ControlLoop::start(bmc, notifier, curve, config).await?;

    control_loop.run(run_token).await
}

// Pick the calibration curve for this run: a fresh scan when requested,
// otherwise the stored curve, falling back on the configured default
// whenever the preferred source fails or is not a valid curve
pub async fn prepare_curve<B, N>(
    config: &FanControlConfig,
    bmc: &B,
    notifier: &N,
) -> Result<CalibrationCurve, ControlError>
where
    B: HardwareReader + HardwareWriter,
    N: Notifier,
{
    let curve_path = Path::new(&config.curve_path);

    let source = if config.scan {
        info!("Scanning fan speeds and RPMs...");

        match scan_curve(config, bmc).await {
            Ok((percentages, rpms)) => {
                if let Err(err) = store::save(curve_path, &percentages, &rpms) {
                    error!("Failed to write calibration curve: {err:#}");
                }

                Some((percentages, rpms))
            }
            Err(err) => {
                error!("Scanning failed: {err:#}");
                notifier
                    .notify(TITLE, "Scan failed - using default values")
                    .await;

                None
            }
        }
    } else {
        match store::load(curve_path) {
            Ok(curve) => Some(curve),
            Err(err) => {
                error!("Could not load values from csv, using defaults: {err:#}");

                None
            }
        }
    };

    if let Some((percentages, rpms)) = source {
        match CalibrationCurve::build(&percentages, &rpms) {
            Ok(curve) => return Ok(curve),
            Err(err) => {
                warn!("Rejected calibration curve, using defaults: {err}")
            }
        }
    }

    let default = &config.default_curve;

    match CalibrationCurve::build(&default.percentages, &default.rpms) {
        Ok(curve) => Ok(curve),
        Err(err) => {
            error!("Invalid fan configuration - cannot proceed: {err}");
            notifier
                .notify(TITLE, "Invalid fan configuration - exiting")
                .await;

            Err(err.into())
        }
    }
}

async fn scan_curve<B>(
    config: &FanControlConfig,
    bmc: &B,
) -> Result<(Vec<u8>, Vec<u32>)>
where
    B: HardwareReader + HardwareWriter,
{
    // Speed commands are ignored while the firmware drives the fans
    bmc.set_direct_mode().await?;

    scan::scan(
        bmc,
        config.min_fan_percent,
        config.max_fan_percent,
        SETTLE_TIME,
    )
    .await
}

// Fixed period driver tying the mode state machine,
// the calibration curve and the PID controller together
pub struct ControlLoop<B, N> {
    bmc: Arc<B>,
    notifier: Arc<N>,

    curve: CalibrationCurve,
    thresholds: Thresholds,
    step_delay: Duration,

    pid: PidController,
    mode: ModeStateMachine,

    consecutive_errors: u32,
}

impl<B, N> ControlLoop<B, N>
where
    B: HardwareReader + HardwareWriter,
    N: Notifier,
{
    // Take direct control of the fans, the loop can only
    // be created once the BMC has accepted the command
    pub async fn start(
        bmc: Arc<B>,
        notifier: Arc<N>,
        curve: CalibrationCurve,
        config: &FanControlConfig,
    ) -> Result<Self, ControlError> {
        let step_delay = config.step_delay()?;

        if let Err(err) = bmc.set_direct_mode().await {
            error!("Error setting fan control to manual: {err:#}");
            notifier
                .notify(TITLE, "Error setting fan control to manual")
                .await;

            return Err(ControlError::InitialModeFailed(err));
        }

        info!("Manual fan control enabled successfully");

        let thresholds = config.thresholds();

        Ok(Self {
            bmc,
            notifier,

            curve,
            thresholds,
            step_delay,

            pid: PidController::new(config.gains()),
            mode: ModeStateMachine::new(&thresholds),

            consecutive_errors: 0,
        })
    }

    pub fn mode(&self) -> ControlMode {
        self.mode.mode()
    }

    // Run the control loop. Only returns when the token is cancelled
    // or on too many consecutive temperature read failures, in both
    // cases after handing the fans back to the vendor firmware
    pub async fn run(
        &mut self,
        run_token: CancellationToken,
    ) -> Result<(), ControlError> {
        info!("Starting PID fan control loop...");

        loop {
            let tick_start = Instant::now();

            let result = select! {
                _ = run_token.cancelled() => None,
                result = self.tick(tick_start) => Some(result),
            };

            match result {
                None => break,
                Some(Err(err)) => {
                    self.release().await;
                    return Err(err);
                }
                Some(Ok(())) => {}
            }

            // Account for the time spent working so the period does not drift
            let sleep_time =
                self.step_delay.saturating_sub(tick_start.elapsed());
            debug!("Sleeping {:?} until the next step", sleep_time);

            select! {
                _ = run_token.cancelled() => break,
                _ = tokio::time::sleep(sleep_time) => {}
            }
        }

        info!("Control loop: Quiting");
        self.release().await;

        Ok(())
    }

    // One control period. Only the consecutive failure ceiling is
    // an error, every other failure skips the rest of the tick
    async fn tick(&mut self, tick_start: Instant) -> Result<(), ControlError> {
        let temp = match self.bmc.get_temperature().await {
            Ok(temp) => {
                self.consecutive_errors = 0;
                temp
            }
            Err(err) => {
                self.consecutive_errors += 1;
                error!(
                    "Failed to get temperature (error {}/{}): {err:#}",
                    self.consecutive_errors, MAX_CONSECUTIVE_ERRORS
                );

                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!("Too many consecutive temperature reading failures, exiting");
                    self.notifier
                        .notify(
                            TITLE,
                            "System exiting due to repeated temperature reading failures",
                        )
                        .await;

                    return Err(ControlError::ConsecutiveFailureCeiling(
                        self.consecutive_errors,
                    ));
                }

                return Ok(());
            }
        };

        let previous_mode = self.mode.mode();
        let mode = match self
            .mode
            .update(temp, self.bmc.as_ref(), self.notifier.as_ref())
            .await
        {
            Ok(mode) => mode,
            Err(err) => {
                warn!("Mode change failed, retrying next step: {err:#}");
                return Ok(());
            }
        };

        if mode != ControlMode::Direct {
            return Ok(());
        }

        // The error history is meaningless after a period under vendor control
        if previous_mode == ControlMode::VendorAutomatic {
            self.pid.reset();
        }

        let rpm = match self.bmc.get_fan_rpm().await {
            Ok(rpm) => rpm,
            Err(err) => {
                error!("Failed to get current fan speed, skipping PID step: {err:#}");
                return Ok(());
            }
        };

        let percent =
            self.pid
                .step(tick_start, temp, rpm, &self.curve, &self.thresholds);

        info!("Setting fan speed to {percent}% (temp: {temp}°C)");
        if let Err(err) = self.bmc.set_fan_percent(percent).await {
            error!("Error setting fan speed to {percent}%: {err:#}");
        }

        Ok(())
    }

    // Give the fans back to the vendor firmware before stopping
    async fn release(&mut self) {
        if self.mode.mode() == ControlMode::VendorAutomatic {
            return;
        }

        match self.bmc.set_vendor_mode().await {
            Ok(()) => info!("Fan control handed back to the vendor firmware"),
            Err(err) => error!("Failed to hand fan control back: {err:#}"),
        }
    }
}
