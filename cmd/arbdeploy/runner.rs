use std::{
    collections::VecDeque,
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use arbdeploy_common::networks::Network;
use arbdeploy_pipeline::batch::{PairFailure, PairRunner};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{Level, debug};

const STDERR_TAIL_LINES: usize = 20;

/// Runs each batch pair as `arbdeploy deploy <contract> --network <net>` in
/// its own process, so a crash or panic stays contained to that pair.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    /// Forwarded as `--registry`; children otherwise use each contract's own file.
    registry: Option<PathBuf>,
    log_level: Level,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>, registry: Option<&Path>, log_level: Level) -> Self {
        Self {
            program: program.into(),
            registry: registry.map(Path::to_path_buf),
            log_level,
        }
    }

    /// Re-invokes the running binary.
    pub fn current(registry: Option<&Path>, log_level: Level) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, registry, log_level))
    }

    fn command(&self, contract: &str, network: &Network) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(registry) = &self.registry {
            command.arg("--registry").arg(registry);
        }
        command
            .arg("--log.level")
            .arg(self.log_level.to_string())
            .args(["deploy", contract, "--network", network.id])
            // A single endpoint cannot serve every network of a batch.
            .env_remove("ARBDEPLOY_RPC_URL")
            .env_remove("ARBDEPLOY_NETWORK")
            .env_remove("ARBDEPLOY_REGISTRY")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait::async_trait]
impl PairRunner for ProcessRunner {
    async fn run(&self, contract: &str, network: &'static Network) -> Result<(), PairFailure> {
        let mut child = self
            .command(contract, network)
            .spawn()
            .map_err(|err| PairFailure {
                message: format!("failed to start {}: {err}", self.program.display()),
            })?;
        debug!(contract, %network, pid = ?child.id(), "Spawned deploy process");

        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                eprintln!("[{contract}@{network}] {line}");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = child.wait().await.map_err(|err| PairFailure {
            message: format!("failed to wait for the deploy process: {err}"),
        })?;
        if status.success() {
            return Ok(());
        }
        let code = status
            .code()
            .map_or_else(|| "a signal".to_owned(), |code| format!("code {code}"));
        let detail = tail
            .iter()
            .filter(|line| !line.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        Err(PairFailure {
            message: if detail.is_empty() {
                format!("deploy exited with {code}")
            } else {
                format!("deploy exited with {code}: {detail}")
            },
        })
    }
}
