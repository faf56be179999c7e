use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::{bmc::CommandExecutor, config::BmcConfig};

const SSHPASS: &str = "sshpass";
const SLOT_PREFIX: &str = "System.pcieslotlfm.";

// Run racadm on the BMC over ssh, used for the settings
// that have no IPMI counterpart
pub struct Racadm {
    executor: CommandExecutor,
    base_args: Vec<String>,
}

impl Racadm {
    pub fn new(config: &BmcConfig, executor: CommandExecutor) -> Self {
        let base_args = vec![
            "-p".to_string(),
            config.password.clone(),
            "ssh".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            format!("{}@{}", config.username, config.host),
            "racadm".to_string(),
        ];

        Self {
            executor,
            base_args,
        }
    }

    async fn racadm(&self, args: &[&str]) -> Result<String> {
        let mut full_args = self.base_args.clone();
        full_args.extend(args.iter().map(|s| s.to_string()));

        Ok(self.executor.run(SSHPASS, &full_args).await?)
    }

    // Turn off the "third party PCIe card" cooling response, which
    // otherwise keeps the fans high whenever a non Dell card is present.
    // Every slot is attempted, the result is the one of the last slot
    pub async fn disable_third_party_fan_mode(&self) -> Result<()> {
        let output = self
            .racadm(&["get", "system.pcieslotlfm"])
            .await
            .with_context(|| "Failed to list PCIe slots")?;

        let slots = count_pcie_slots(&output);
        if slots == 0 {
            warn!("No PCIe slot cooling settings reported by the BMC");
            return Ok(());
        }

        let mut result: Result<String> = Ok(String::new());
        for slot in 1..=slots {
            let key = format!("system.pcieslotlfm.{slot}.lfmmode");

            result = self.racadm(&["set", key.as_str(), "disabled"]).await;
            match &result {
                Ok(_) => {
                    info!("Slot {slot} third-party fan mode is now disabled.")
                }
                Err(err) => error!(
                    "Failed to disable third-party fan mode on slot {slot}: {err}"
                ),
            }
        }

        result.map(|_| ())
    }
}

fn count_pcie_slots(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.contains(SLOT_PREFIX))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_reported_slots() {
        let output = "\
System.pcieslotlfm.1 [Key=System.Embedded.1#PCIeSlotLFM.1]
System.pcieslotlfm.2 [Key=System.Embedded.1#PCIeSlotLFM.2]
System.pcieslotlfm.3 [Key=System.Embedded.1#PCIeSlotLFM.3]
";

        assert_eq!(count_pcie_slots(output), 3);
        assert_eq!(count_pcie_slots("ERROR: invalid group\n"), 0);
    }

    #[test]
    fn ssh_target_is_user_at_host() {
        let config = BmcConfig {
            host: "10.0.0.2".to_string(),
            username: "root".to_string(),
            password: "calvin".to_string(),
            fan_sensor: "Fan1".to_string(),
        };

        let racadm = Racadm::new(&config, CommandExecutor::new(None));

        assert_eq!(racadm.base_args[1], "calvin");
        assert_eq!(racadm.base_args[5], "root@10.0.0.2");
        assert_eq!(racadm.base_args.last().unwrap(), "racadm");
    }
}
