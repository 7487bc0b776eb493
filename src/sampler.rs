/**
 * SAMPLER - Boucle périodique d'observation de la flotte
 *
 * RÔLE : à intervalle fixe, sonder chaque cible configurée (ping pour les
 * serveurs distants, liste pm2 pour les process), écraser l'état en mémoire,
 * tracer une ligne par cible dans les logs online/offline, puis passer
 * chaque échantillon au détecteur et pousser les transitions au notifier.
 *
 * Un échec de sonde devient un échantillon offline, jamais une erreur : une
 * cible injoignable n'empêche pas d'échantillonner les suivantes. La requête
 * pm2 est LA sonde des cibles process ; si elle échoue, ces cibles passent
 * offline ce cycle et la vue pm2Services garde ses dernières données.
 */
use crate::config::VigieConfig;
use crate::detector::ChangeDetector;
use crate::models::{
    SampleResult, SamplesMap, ServiceStatus, ServicesMap, Target, TargetKind, Transition,
};
use crate::notifier::Notifier;
use crate::probe;
use crate::state::Shared;
use crate::supervisor::ProcessSupervisor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::task;

pub fn spawn_sampler(
    cfg: VigieConfig,
    samples: Shared<SamplesMap>,
    services: Shared<ServicesMap>,
    detector: ChangeDetector,
    notifier: Arc<Notifier>,
    supervisor: Option<Arc<dyn ProcessSupervisor>>,
) {
    println!(
        "[sampler] starting fleet sampler ({} servers, {} processes, every {}s, threshold {})",
        cfg.servers.len(),
        cfg.processes.len(),
        cfg.check_interval_seconds,
        cfg.notification_threshold
    );

    task::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(cfg.check_interval_seconds.max(1)));
        loop {
            interval.tick().await;
            run_cycle(
                &cfg,
                &samples,
                &services,
                &detector,
                &notifier,
                supervisor.as_deref(),
            )
            .await;
        }
    });
}

async fn run_cycle(
    cfg: &VigieConfig,
    samples: &Shared<SamplesMap>,
    services: &Shared<ServicesMap>,
    detector: &ChangeDetector,
    notifier: &Notifier,
    supervisor: Option<&dyn ProcessSupervisor>,
) {
    let probe_timeout = Duration::from_secs(cfg.probe_timeout_seconds);

    // serveurs distants, séquentiellement et dans l'ordre de la config
    for server in &cfg.servers {
        let outcome = probe::probe_host(&server.host, probe_timeout).await;
        let now = OffsetDateTime::now_utc();
        samples.lock().insert(
            server.name.clone(),
            SampleResult {
                online: outcome.online,
                response_time_ms: outcome.response_time_ms,
                last_checked: now,
            },
        );
        append_status_log(&cfg.data_dir, &server.name, outcome.online, outcome.response_time_ms)
            .await;

        let target = Target { name: server.name.clone(), kind: TargetKind::Host };
        if let Some(kind) = detector.observe(&target, outcome.online) {
            notifier
                .notify_transition(&Transition {
                    target,
                    kind,
                    response_time_ms: outcome.response_time_ms,
                    process: None,
                })
                .await;
        }
    }

    // process supervisés : une seule requête pm2 par cycle
    let Some(supervisor) = supervisor else { return };
    match supervisor.list().await {
        Ok(list) => {
            let now = OffsetDateTime::now_utc();
            {
                let mut map = services.lock();
                for info in &list {
                    map.insert(info.name.clone(), ServiceStatus::from_info(info, now));
                }
            }
            for name in &cfg.processes {
                let info = list.iter().find(|i| &i.name == name);
                let online = info.map(|i| i.is_online()).unwrap_or(false);
                append_status_log(&cfg.data_dir, name, online, None).await;

                let target = Target { name: name.clone(), kind: TargetKind::Process };
                if let Some(kind) = detector.observe(&target, online) {
                    notifier
                        .notify_transition(&Transition {
                            target,
                            kind,
                            response_time_ms: None,
                            process: info.cloned(),
                        })
                        .await;
                }
            }
        }
        Err(e) => {
            eprintln!("[sampler] supervisor list failed: {e}");
            for name in &cfg.processes {
                append_status_log(&cfg.data_dir, name, false, None).await;
                let target = Target { name: name.clone(), kind: TargetKind::Process };
                if let Some(kind) = detector.observe(&target, false) {
                    notifier
                        .notify_transition(&Transition {
                            target,
                            kind,
                            response_time_ms: None,
                            process: None,
                        })
                        .await;
                }
            }
        }
    }
}

/// Une ligne par cible et par cycle, dans logs/online/ ou logs/offline/.
/// Les erreurs d'écriture sont avalées : le log d'audit ne doit jamais
/// interrompre le sampling.
async fn append_status_log(data_dir: &str, name: &str, online: bool, response_time_ms: Option<f64>) {
    let dir = Path::new(data_dir)
        .join("logs")
        .join(if online { "online" } else { "offline" });
    let file = dir.join(format!("{}.log", name.replace('/', "_")));

    let stamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    let line = match response_time_ms {
        Some(ms) => format!("{stamp} {name} {}ms\n", ms.round() as i64),
        None => format!("{stamp} {name} -\n"),
    };

    let result = async {
        tokio::fs::create_dir_all(&dir).await?;
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
            .await?;
        f.write_all(line.as_bytes()).await
    }
    .await;

    if let Err(e) = result {
        eprintln!("[sampler] status log write failed for {name}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();

        append_status_log(data_dir, "blahaj.tr", true, Some(12.6)).await;
        append_status_log(data_dir, "blahaj.tr", true, Some(9.1)).await;
        append_status_log(data_dir, "home server", false, None).await;

        let online = std::fs::read_to_string(
            dir.path().join("logs").join("online").join("blahaj.tr.log"),
        )
        .unwrap();
        assert_eq!(online.lines().count(), 2);
        assert!(online.contains("13ms"));

        let offline = std::fs::read_to_string(
            dir.path().join("logs").join("offline").join("home server.log"),
        )
        .unwrap();
        assert!(offline.contains("home server -"));
    }

    #[tokio::test]
    async fn test_status_log_failure_is_swallowed() {
        // data_dir impossible à créer (fichier à la place d'un dossier)
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("data");
        std::fs::write(&blocker, "pas un dossier").unwrap();

        append_status_log(blocker.to_str().unwrap(), "x", true, None).await;
    }
}
