use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub online: bool,
    pub response_time_ms: Option<f64>,
}

impl ProbeOutcome {
    fn offline() -> Self {
        Self { online: false, response_time_ms: None }
    }
}

/// Sonde un hôte avec un seul echo via le binaire ping système.
/// Toute erreur (spawn, exit non nul, timeout) devient simplement "offline" :
/// une cible injoignable ne doit jamais interrompre le cycle de sampling.
pub async fn probe_host(host: &str, probe_timeout: Duration) -> ProbeOutcome {
    let started = Instant::now();
    let wait_secs = probe_timeout.as_secs().max(1);

    let status = tokio::time::timeout(
        // marge d'une seconde au-dessus du timeout de ping lui-même
        probe_timeout + Duration::from_secs(1),
        Command::new("ping")
            .arg("-c").arg("1")
            .arg("-W").arg(wait_secs.to_string())
            .arg(host)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status(),
    )
    .await;

    match status {
        Ok(Ok(exit)) if exit.success() => ProbeOutcome {
            online: true,
            response_time_ms: Some(started.elapsed().as_secs_f64() * 1000.0),
        },
        Ok(Ok(_)) => ProbeOutcome::offline(),
        Ok(Err(e)) => {
            eprintln!("[probe] ping {host} failed to spawn: {e}");
            ProbeOutcome::offline()
        }
        Err(_) => ProbeOutcome::offline(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_offline() {
        // .invalid ne résout jamais (RFC 2606) ; que ping soit présent ou non,
        // le résultat doit être un sample offline, pas une erreur
        let outcome = probe_host("host.invalid", Duration::from_secs(1)).await;
        assert!(!outcome.online);
        assert!(outcome.response_time_ms.is_none());
    }
}
