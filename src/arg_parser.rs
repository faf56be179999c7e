use std::path::PathBuf;

use argparse::{ArgumentParser, Print, Store, StoreTrue};

pub struct ArgsOptions {
    pub config_file_path: PathBuf,

    // Force a calibration scan regardless of the configuration
    pub scan: bool,
    // Send a test notification at startup
    pub test_notify: bool,
}

impl ArgsOptions {
    pub fn parse() -> Self {
        let mut options = ArgsOptions::default();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description("PID fan speed controller for server BMCs");

            // Configuration file path
            parser.refer(&mut options.config_file_path).add_option(
                &["-c", "--config"],
                Store,
                "The file path of the configuration file",
            );

            parser.refer(&mut options.scan).add_option(
                &["-s", "--scan"],
                StoreTrue,
                "Measure the fan RPM curve before starting",
            );

            parser.refer(&mut options.test_notify).add_option(
                &["-t", "--test-notify"],
                StoreTrue,
                "Send a test notification at startup",
            );

            // Show daemon version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the daemon version"
            );

            parser.parse_args_or_exit();
        }

        options
    }
}

impl Default for ArgsOptions {
    fn default() -> Self {
        Self {
            config_file_path: PathBuf::from("/etc/bmcfand/config.json"),
            scan: false,
            test_notify: false,
        }
    }
}
