use std::process::ExitCode;

use anyhow::{Context, Result};
use bmcfand::{arg_parser::ArgsOptions, config::FanControlConfig, logger};
use tokio::{
    select,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logger::init_logging();

    // Parse the command line arguments
    let args_options = ArgsOptions::parse();

    let mut config = FanControlConfig::load(&args_options.config_file_path)
        .with_context(|| "Failed to load the configuration")?;
    config.scan |= args_options.scan;
    config.ntfy_test |= args_options.test_notify;

    // This token and tracker will be used to handle graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let control = {
        let token = token.clone();

        tracker.spawn(async move { bmcfand::run(&config, token).await })
    };
    tracker.close();

    // systemd stops the service with SIGTERM
    let mut terminate = signal(SignalKind::terminate())
        .with_context(|| "Failed to install the SIGTERM handler")?;

    select! {
        _ = ctrl_c() => {
            info!("Interrupted, stopping the control loop");

            // Cancel the token to communicate the program
            // termination to the running tasks
            token.cancel();
        },
        _ = terminate.recv() => {
            info!("Terminated, stopping the control loop");
            token.cancel();
        },
        _ = tracker.wait() => {},
    }

    // Wait for the tasks to finish
    tracker.wait().await;

    match control.await? {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            let err = anyhow::Error::from(err);
            for e in err.chain() {
                error!("{e}");
            }

            Ok(ExitCode::FAILURE)
        }
    }
}
