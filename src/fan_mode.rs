use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::{
    bmc::HardwareWriter,
    notifier::{Notifier, TITLE},
    pid::Thresholds,
};

// Who is driving the fans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    // Fan speed set by the PID controller
    Direct,
    // Fan speed managed by the server firmware
    VendorAutomatic,
}

// What a temperature reading asks of the current mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    ToVendor,
    ToDirect,
}

// Switch between direct and vendor control around max_temp, with
// a hysteresis band below it so that the mode does not flip back
// and forth while the temperature hovers at the limit
#[derive(Debug)]
pub struct ModeStateMachine {
    mode: ControlMode,
    max_temp: i32,
    hysteresis_temp: i32,
}

impl ModeStateMachine {
    // The BMC must already be in direct control mode
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            mode: ControlMode::Direct,
            max_temp: thresholds.max_temp,
            hysteresis_temp: thresholds.hysteresis_temp(),
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn transition(&self, temp: i32) -> Transition {
        match self.mode {
            ControlMode::Direct if temp > self.max_temp => Transition::ToVendor,
            ControlMode::VendorAutomatic if temp <= self.hysteresis_temp => {
                Transition::ToDirect
            }
            _ => Transition::Stay,
        }
    }

    // Apply the transition requested by the given temperature and
    // return the resulting mode. On a failed mode command the mode
    // is left unchanged and the error returned, the next tick retries
    pub async fn update<W, N>(
        &mut self,
        temp: i32,
        writer: &W,
        notifier: &N,
    ) -> Result<ControlMode>
    where
        W: HardwareWriter,
        N: Notifier,
    {
        match self.transition(temp) {
            Transition::Stay => {
                if self.mode == ControlMode::VendorAutomatic {
                    info!(
                        "In vendor mode, temperature {temp}°C still above threshold {}°C",
                        self.hysteresis_temp
                    );
                } else {
                    debug!("Temperature {temp}°C, staying in direct mode");
                }
            }
            Transition::ToVendor => {
                warn!(
                    "Temperature {temp}°C exceeds maximum {}°C, switching to vendor fan control",
                    self.max_temp
                );
                notifier
                    .notify(
                        TITLE,
                        &format!(
                            "Temperature {temp}°C exceeds maximum, switching to vendor fan control"
                        ),
                    )
                    .await;

                if let Err(err) = writer.set_vendor_mode().await {
                    error!("Error setting vendor fan control: {err}");
                    notifier
                        .notify(TITLE, "Error setting vendor fan control")
                        .await;

                    return Err(err)
                        .with_context(|| "Failed to enter vendor mode");
                }

                self.mode = ControlMode::VendorAutomatic;
                info!("Successfully switched to vendor fan control");
            }
            Transition::ToDirect => {
                info!(
                    "Temperature {temp}°C below threshold {}°C, returning to manual fan control",
                    self.hysteresis_temp
                );

                if let Err(err) = writer.set_direct_mode().await {
                    error!("Error returning to manual fan control after hysteresis: {err}");
                    notifier
                        .notify(
                            TITLE,
                            "Error returning to manual fan control after hysteresis",
                        )
                        .await;

                    return Err(err)
                        .with_context(|| "Failed to leave vendor mode");
                }

                self.mode = ControlMode::Direct;
                notifier
                    .notify(TITLE, "Returned to manual fan control after hysteresis")
                    .await;
                info!("Successfully returned to manual fan control");
            }
        }

        Ok(self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeBmc, RecordingNotifier, Write};

    fn thresholds() -> Thresholds {
        Thresholds {
            desired_temp: 50,
            max_temp: 80,
            hysteresis: 5,
            min_fan_percent: 20,
            max_fan_percent: 60,
        }
    }

    async fn vendor_machine() -> ModeStateMachine {
        let mut machine = ModeStateMachine::new(&thresholds());
        machine
            .update(85, &FakeBmc::new(), &RecordingNotifier::default())
            .await
            .unwrap();
        assert_eq!(machine.mode(), ControlMode::VendorAutomatic);

        machine
    }

    #[test]
    fn transitions_around_the_hysteresis_band() {
        let mut machine = ModeStateMachine::new(&thresholds());

        assert_eq!(machine.transition(78), Transition::Stay);
        assert_eq!(machine.transition(80), Transition::Stay);
        assert_eq!(machine.transition(85), Transition::ToVendor);

        machine.mode = ControlMode::VendorAutomatic;
        assert_eq!(machine.transition(85), Transition::Stay);
        assert_eq!(machine.transition(78), Transition::Stay);
        assert_eq!(machine.transition(76), Transition::Stay);
        assert_eq!(machine.transition(75), Transition::ToDirect);
        assert_eq!(machine.transition(40), Transition::ToDirect);
    }

    #[tokio::test]
    async fn hot_reading_hands_fans_to_vendor() {
        let bmc = FakeBmc::new();
        let notifier = RecordingNotifier::default();
        let mut machine = ModeStateMachine::new(&thresholds());

        let mode = machine.update(85, &bmc, &notifier).await.unwrap();

        assert_eq!(mode, ControlMode::VendorAutomatic);
        assert_eq!(bmc.writes(), vec![Write::VendorMode]);
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn direct_mode_below_max_issues_nothing() {
        let bmc = FakeBmc::new();
        let notifier = RecordingNotifier::default();
        let mut machine = ModeStateMachine::new(&thresholds());

        let mode = machine.update(78, &bmc, &notifier).await.unwrap();

        assert_eq!(mode, ControlMode::Direct);
        assert!(bmc.writes().is_empty());
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test]
    async fn dead_band_keeps_vendor_control() {
        let bmc = FakeBmc::new();
        let mut machine = vendor_machine().await;

        let mode = machine
            .update(78, &bmc, &RecordingNotifier::default())
            .await
            .unwrap();

        assert_eq!(mode, ControlMode::VendorAutomatic);
        assert!(bmc.writes().is_empty());
    }

    #[tokio::test]
    async fn cooled_down_reading_returns_to_direct() {
        let bmc = FakeBmc::new();
        let notifier = RecordingNotifier::default();
        let mut machine = vendor_machine().await;

        // 76 is still inside the band with max_temp 80 and hysteresis 5
        assert_eq!(
            machine.update(76, &bmc, &notifier).await.unwrap(),
            ControlMode::VendorAutomatic
        );
        assert_eq!(
            machine.update(75, &bmc, &notifier).await.unwrap(),
            ControlMode::Direct
        );
        assert_eq!(bmc.writes(), vec![Write::DirectMode]);
        assert!(notifier.messages()[0].contains("Returned to manual"));
    }

    #[tokio::test]
    async fn failed_vendor_command_keeps_direct_mode() {
        let bmc = FakeBmc::new();
        bmc.fail_mode_commands(1);
        let mut machine = ModeStateMachine::new(&thresholds());
        let notifier = RecordingNotifier::default();

        assert!(machine.update(90, &bmc, &notifier).await.is_err());
        assert_eq!(machine.mode(), ControlMode::Direct);

        // Retried on the next reading
        let mode = machine.update(90, &bmc, &notifier).await.unwrap();
        assert_eq!(mode, ControlMode::VendorAutomatic);
    }

    #[tokio::test]
    async fn failed_direct_command_keeps_vendor_mode() {
        let bmc = FakeBmc::new();
        let mut machine = vendor_machine().await;
        bmc.fail_mode_commands(1);

        assert!(
            machine
                .update(60, &bmc, &RecordingNotifier::default())
                .await
                .is_err()
        );
        assert_eq!(machine.mode(), ControlMode::VendorAutomatic);
    }
}
