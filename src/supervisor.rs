/**
 * SUPERVISEUR DE PROCESS - Capacité pm2 derrière une interface
 *
 * RÔLE : Introspection et contrôle des process supervisés (list, restart,
 * stop, start, logs) sans exposer le détail pm2 au reste du kernel.
 *
 * FONCTIONNEMENT : shell out vers la CLI pm2 (`pm2 jlist` pour la liste,
 * parsée depuis son JSON). La commande est configurable et découpée façon
 * shell, ce qui permet par exemple un `ssh box pm2`.
 *
 * Le trait ProcessSupervisor est la couture : le sampler et l'API HTTP ne
 * dépendent que de lui, une implémentation native pourrait remplacer la CLI.
 */
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::process::Command;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("supervisor unavailable: {0}")]
    Unavailable(String),
    #[error("supervisor command failed: {0}")]
    CommandFailed(String),
    #[error("invalid supervisor output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// État d'un process tel que rapporté par le superviseur
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub id: Option<i64>,
    pub status: String,
    pub cpu: Option<f64>,
    pub memory: Option<u64>,
    pub uptime_ms: Option<u64>,
    pub restarts: Option<u64>,
}

impl ProcessInfo {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn list(&self) -> Result<Vec<ProcessInfo>, SupervisorError>;
    async fn restart(&self, name: &str) -> Result<(), SupervisorError>;
    async fn stop(&self, name: &str) -> Result<(), SupervisorError>;
    async fn start(&self, name: &str) -> Result<(), SupervisorError>;
    async fn logs(&self, name: &str, lines: u32) -> Result<String, SupervisorError>;
}

/// Implémentation CLI : chaque opération est un appel `pm2 ...`
pub struct Pm2Supervisor {
    argv: Vec<String>,
}

impl Pm2Supervisor {
    pub fn new(command: &str) -> Result<Self, SupervisorError> {
        let argv = shell_words::split(command)
            .map_err(|e| SupervisorError::Unavailable(format!("bad supervisor command: {e}")))?;
        if argv.is_empty() {
            return Err(SupervisorError::Unavailable("empty supervisor command".into()));
        }
        Ok(Self { argv })
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, SupervisorError> {
        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new(&self.argv[0])
                .args(&self.argv[1..])
                .args(args)
                .stdin(Stdio::null())
                .output(),
        )
        .await
        .map_err(|_| SupervisorError::Unavailable(format!("{} timed out", self.argv[0])))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SupervisorError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(output)
    }
}

#[async_trait]
impl ProcessSupervisor for Pm2Supervisor {
    async fn list(&self) -> Result<Vec<ProcessInfo>, SupervisorError> {
        let output = self.run(&["jlist"]).await?;
        let raw = String::from_utf8_lossy(&output.stdout);
        let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        Ok(parse_jlist(&raw, now_ms)?)
    }

    async fn restart(&self, name: &str) -> Result<(), SupervisorError> {
        self.run(&["restart", name]).await?;
        println!("[supervisor] restarted {name}");
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        self.run(&["stop", name]).await?;
        println!("[supervisor] stopped {name}");
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<(), SupervisorError> {
        self.run(&["start", name]).await?;
        println!("[supervisor] started {name}");
        Ok(())
    }

    async fn logs(&self, name: &str, lines: u32) -> Result<String, SupervisorError> {
        let output = self
            .run(&["logs", name, "--lines", &lines.to_string(), "--nostream"])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// Sous-ensemble du JSON de `pm2 jlist` ; les champs inconnus sont ignorés
#[derive(Debug, Deserialize)]
struct Pm2Process {
    name: String,
    pm_id: Option<i64>,
    pm2_env: Pm2Env,
    monit: Option<Pm2Monit>,
}

#[derive(Debug, Deserialize)]
struct Pm2Env {
    status: String,
    pm_uptime: Option<i64>,
    restart_time: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Pm2Monit {
    cpu: Option<f64>,
    memory: Option<u64>,
}

fn parse_jlist(raw: &str, now_ms: i64) -> Result<Vec<ProcessInfo>, serde_json::Error> {
    let processes: Vec<Pm2Process> = serde_json::from_str(raw.trim())?;
    Ok(processes
        .into_iter()
        .map(|p| ProcessInfo {
            name: p.name,
            id: p.pm_id,
            status: p.pm2_env.status,
            cpu: p.monit.as_ref().and_then(|m| m.cpu),
            memory: p.monit.as_ref().and_then(|m| m.memory),
            // pm_uptime est l'epoch ms du démarrage, pas une durée
            uptime_ms: p
                .pm2_env
                .pm_uptime
                .filter(|start| *start > 0 && *start <= now_ms)
                .map(|start| (now_ms - start) as u64),
            restarts: p.pm2_env.restart_time,
        })
        .collect())
}
