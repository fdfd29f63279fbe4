// VMBENCH REMOTE SHELL
// RUNS GUEST COMMANDS THROUGH THE SYSTEM ssh CLIENT. BATCH MODE, NO HOST KEY
// PROMPTS: GUESTS ARE THROWAWAY AND REGENERATE KEYS ON EVERY BOOT.

use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::vm::SshConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait RemoteShell {
    fn execute_command(&self, cmd: &str) -> Result<CommandOutput>;
}

// OPENS A SHELL TO A FRESHLY BOOTED GUEST
pub trait ShellConnector {
    fn connect(&self, config: &SshConfig) -> Result<Box<dyn RemoteShell>>;
}

const CONNECT_RETRIES: u32 = 20;
const RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct SshConnection {
    config: SshConfig,
    timeout_secs: u64,
}

impl SshConnection {
    // BLOCKS UNTIL THE GUEST sshd ANSWERS `true` OR RETRIES RUN OUT
    pub fn connect(config: SshConfig, timeout_secs: u64) -> Result<Self> {
        let conn = Self { config, timeout_secs };
        let start = Instant::now();
        for attempt in 1..=CONNECT_RETRIES {
            match conn.execute_command("true") {
                Ok(out) if out.exit_code == 0 => {
                    debug!(host = %conn.config.host, attempt, elapsed_ms = start.elapsed().as_millis() as u64,
                           "guest ssh reachable");
                    return Ok(conn);
                }
                Ok(out) => debug!(attempt, code = out.exit_code, "guest ssh not ready"),
                Err(e) => warn!(attempt, error = %e, "ssh probe failed"),
            }
            thread::sleep(RETRY_DELAY);
        }
        bail!("guest {} unreachable over ssh after {} attempts", conn.config.host, CONNECT_RETRIES)
    }

    fn command(&self, cmd: &str) -> Command {
        let connect_timeout = format!("ConnectTimeout={}", self.timeout_secs);
        let mut c = Command::new("ssh");
        c.args([
            "-q",
            "-o", "BatchMode=yes",
            "-o", "StrictHostKeyChecking=no",
            "-o", "UserKnownHostsFile=/dev/null",
            "-o", connect_timeout.as_str(),
            "-i",
        ])
        .arg(&self.config.key_path)
        .arg(format!("{}@{}", self.config.username, self.config.host))
        .arg(cmd)
        .stdin(Stdio::null());
        c
    }
}

impl RemoteShell for SshConnection {
    fn execute_command(&self, cmd: &str) -> Result<CommandOutput> {
        debug!(host = %self.config.host, cmd, "ssh exec");
        let output = self
            .command(cmd)
            .output()
            .with_context(|| format!("failed to spawn ssh for {:?}", cmd))?;
        Ok(CommandOutput {
            // KILLED BY SIGNAL: NO CODE. REPORT AS -1 LIKE A FAILED CONNECTION.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub struct SshConnector {
    pub timeout_secs: u64,
}

impl ShellConnector for SshConnector {
    fn connect(&self, config: &SshConfig) -> Result<Box<dyn RemoteShell>> {
        Ok(Box::new(SshConnection::connect(config.clone(), self.timeout_secs)?))
    }
}
