/**
 * VIGIE - Point d'entrée du kernel d'opérations
 *
 * RÔLE : Orchestration des modules : config, store, board, sampler,
 * notifier, HTTP. Bootstrap complet avec arrêt propre et notification
 * de shutdown.
 *
 * ARCHITECTURE : boucle de sampling en tâche de fond + API REST Axum,
 * état partagé via maps à writer unique.
 */

mod board;
mod config;
mod detector;
mod http;
mod longpoll;
mod models;
mod mqtt;
mod notifier;
mod probe;
mod sampler;
mod state;
mod store;
mod supervisor;

use crate::board::{MessageBoard, SharedBoard};
use crate::config::load_config;
use crate::detector::ChangeDetector;
use crate::http::AppState;
use crate::longpoll::{PollRegistry, SharedPolls};
use crate::models::{CountersMap, SamplesMap, ServicesMap};
use crate::notifier::Notifier;
use crate::state::new_state;
use crate::store::BlobStore;
use crate::supervisor::{Pm2Supervisor, ProcessSupervisor};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let cfg = load_config().await;

    std::fs::create_dir_all(&cfg.data_dir).unwrap_or_else(|e| {
        eprintln!("[vigie] warning: failed to create data dir: {e}");
    });

    // board + registre long-poll
    let store = BlobStore::new(&cfg.data_dir);
    let board: SharedBoard = Arc::new(MessageBoard::load(store).await);
    let polls: SharedPolls = Arc::new(PollRegistry::new());

    // maps partagées de la flotte (writer unique : le sampler)
    let samples = new_state::<SamplesMap>(HashMap::new());
    let services = new_state::<ServicesMap>(HashMap::new());
    let counters = new_state::<CountersMap>(HashMap::new());
    let detector = ChangeDetector::new(cfg.notification_threshold, counters.clone());

    // push MQTT + webhook opérateur
    let mqtt_client = mqtt::create_mqtt_client(&cfg);
    let notifier = Arc::new(Notifier::new(mqtt_client, cfg.notify.clone()));

    // superviseur pm2 derrière son interface
    let supervisor: Option<Arc<dyn ProcessSupervisor>> =
        match Pm2Supervisor::new(&cfg.supervisor.command) {
            Ok(s) => Some(Arc::new(s)),
            Err(e) => {
                eprintln!("[vigie] supervisor disabled: {e}");
                None
            }
        };

    // boucle de sampling en tâche de fond
    sampler::spawn_sampler(
        cfg.clone(),
        samples.clone(),
        services.clone(),
        detector,
        notifier.clone(),
        supervisor.clone(),
    );

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        cfg: Arc::new(cfg.clone()),
        samples,
        services,
        counters,
        board,
        polls,
        supervisor,
    };

    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    println!("[vigie] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(notifier))
        .await
        .unwrap();
}

/// Attend SIGINT/SIGTERM puis prévient les opérateurs avant de rendre la
/// main à axum pour l'arrêt propre.
async fn shutdown_signal(notifier: Arc<Notifier>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("[vigie] failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                eprintln!("[vigie] failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    println!("[vigie] received {signal}, shutting down gracefully");
    notifier.notify_shutdown(signal).await;
}
