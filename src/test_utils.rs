// Scripted hardware and notification doubles shared by the unit tests

use std::{collections::VecDeque, sync::Mutex};

use anyhow::{Result, anyhow};

use crate::{
    bmc::{HardwareReader, HardwareWriter},
    notifier::Notifier,
};

// Command received by the fake BMC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    FanPercent(u8),
    DirectMode,
    VendorMode,
}

#[derive(Default)]
struct FakeState {
    // None entries are failed reads, an empty queue fails every read
    temps: VecDeque<Option<i32>>,
    rpms: VecDeque<Option<u32>>,

    writes: Vec<Write>,
    temp_reads: usize,
    mode_failures: u32,
    fan_write_failures: u32,
}

#[derive(Default)]
pub struct FakeBmc {
    state: Mutex<FakeState>,
}

impl FakeBmc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temps(temps: impl IntoIterator<Item = Option<i32>>) -> Self {
        let bmc = Self::new();
        bmc.state.lock().unwrap().temps.extend(temps);
        bmc
    }

    pub fn push_rpms(&self, rpms: impl IntoIterator<Item = Option<u32>>) {
        self.state.lock().unwrap().rpms.extend(rpms);
    }

    // Make the next n mode commands fail
    pub fn fail_mode_commands(&self, n: u32) {
        self.state.lock().unwrap().mode_failures = n;
    }

    // Make the next n fan speed commands fail
    pub fn fail_fan_writes(&self, n: u32) {
        self.state.lock().unwrap().fan_write_failures = n;
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn fan_percents(&self) -> Vec<u8> {
        self.writes()
            .into_iter()
            .filter_map(|write| match write {
                Write::FanPercent(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn temp_reads(&self) -> usize {
        self.state.lock().unwrap().temp_reads
    }

    fn mode_command(&self, write: Write) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.mode_failures > 0 {
            state.mode_failures -= 1;
            return Err(anyhow!("fake mode command failure"));
        }

        state.writes.push(write);
        Ok(())
    }
}

impl HardwareReader for FakeBmc {
    async fn get_temperature(&self) -> Result<i32> {
        let mut state = self.state.lock().unwrap();
        state.temp_reads += 1;

        state
            .temps
            .pop_front()
            .flatten()
            .ok_or_else(|| anyhow!("fake temperature read failure"))
    }

    // Without a scripted reading the fan follows the last command
    async fn get_fan_rpm(&self) -> Result<u32> {
        let mut state = self.state.lock().unwrap();

        match state.rpms.pop_front() {
            Some(rpm) => rpm.ok_or_else(|| anyhow!("fake fan read failure")),
            None => {
                let percent = state
                    .writes
                    .iter()
                    .rev()
                    .find_map(|write| match write {
                        Write::FanPercent(p) => Some(*p as u32),
                        _ => None,
                    })
                    .unwrap_or(0);

                Ok(500 + percent * 50)
            }
        }
    }
}

impl HardwareWriter for FakeBmc {
    async fn set_fan_percent(&self, percent: u8) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.fan_write_failures > 0 {
            state.fan_write_failures -= 1;
            return Err(anyhow!("fake fan write failure"));
        }

        state.writes.push(Write::FanPercent(percent));
        Ok(())
    }

    async fn set_direct_mode(&self) -> Result<()> {
        self.mode_command(Write::DirectMode)
    }

    async fn set_vendor_mode(&self) -> Result<()> {
        self.mode_command(Write::VendorMode)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, _title: &str, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
