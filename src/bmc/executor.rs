use std::time::Duration;

use tokio::{process::Command, time::timeout};
use tracing::{debug, trace, warn};

use crate::errors::CommandError;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const COMMAND_ATTEMPTS: u32 = 3;
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);

// Run external BMC tools with a bounded time per attempt and a
// fixed number of attempts, so that callers only ever see the
// final outcome of a command
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
    attempts: u32,
    backoff: Duration,

    // Masked whenever a command line is logged
    secret: Option<String>,
}

impl CommandExecutor {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            timeout: COMMAND_TIMEOUT,
            attempts: COMMAND_ATTEMPTS,
            backoff: RETRY_BACKOFF,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn with_retry(
        mut self,
        timeout: Duration,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        self.timeout = timeout;
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    // Run the command and return its standard output, retrying
    // on spawn failures, timeouts and non zero exit codes
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<String, CommandError> {
        let mut attempt = 1;

        loop {
            trace!(
                "Running (attempt {attempt}/{}): {program} {}",
                self.attempts,
                self.masked(args)
            );

            match self.run_once(program, args).await {
                Ok(stdout) => return Ok(stdout),
                Err(err) if attempt < self.attempts => {
                    warn!(
                        "Attempt {attempt}/{} of \"{program}\" failed: {err}",
                        self.attempts
                    );

                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => {
                    debug!("Giving up on \"{program}\" after {attempt} attempts");

                    return Err(err);
                }
            }
        }
    }

    async fn run_once(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<String, CommandError> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| CommandError::Timeout {
                program: program.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::ExitStatus {
                program: program.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr)
                    .trim()
                    .to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    // Join the arguments for logging with the secret hidden
    fn masked(&self, args: &[String]) -> String {
        args.iter()
            .map(|arg| match &self.secret {
                Some(secret) if arg.contains(secret.as_str()) => {
                    arg.replace(secret.as_str(), "****")
                }
                _ => arg.clone(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
