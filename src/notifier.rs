/**
 * NOTIFIER - Push des transitions de la flotte vers les opérateurs
 *
 * RÔLE : transformer une transition détectée en alerte lisible et la livrer
 * à chaque destinataire configuré :
 * - topic MQTT (un topic par genre de transition, payload JSON)
 * - webhook ntfy (texte brut, pour le téléphone de l'opérateur)
 *
 * Toute erreur de livraison est journalisée puis avalée : le notifier ne
 * doit jamais faire échouer ni ralentir la boucle de sampling. Le détecteur
 * garantit un appel au plus par transition.
 */
use crate::config::NotifyConf;
use crate::models::{TargetKind, Transition, TransitionKind};
use anyhow::Result;
use rumqttc::{AsyncClient, QoS};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Notifier {
    mqtt: Option<AsyncClient>,
    topic_prefix: String,
    webhook_url: Option<String>,
    http: reqwest::Client,
}

impl Notifier {
    pub fn new(mqtt: Option<AsyncClient>, notify: Option<NotifyConf>) -> Self {
        let (topic_prefix, webhook_url) = match notify {
            Some(conf) => (conf.topic_prefix, conf.webhook_url),
            None => ("vigie/alerts".to_string(), None),
        };
        Self {
            mqtt,
            topic_prefix,
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    /// Livre une transition à tous les destinataires, best-effort.
    pub async fn notify_transition(&self, transition: &Transition) {
        let text = format_transition(transition);
        println!("[notifier] {text}");

        if let Err(e) = self.publish_mqtt(transition, &text).await {
            eprintln!("[notifier] MQTT publish failed: {e}");
        }
        if let Err(e) = self.push_webhook(&title_for(transition.kind), &text).await {
            eprintln!("[notifier] webhook push failed: {e}");
        }
    }

    /// Dernier recours à l'arrêt du process ; mêmes destinataires.
    pub async fn notify_shutdown(&self, reason: &str) {
        let text = format!("⚪ vigie is shutting down ({reason})");
        println!("[notifier] {text}");

        if let Some(client) = &self.mqtt {
            let topic = format!("{}/shutdown@v1", self.topic_prefix);
            let payload = serde_json::json!({
                "reason": reason,
                "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            });
            if let Err(e) = client
                .publish(topic, QoS::AtLeastOnce, false, payload.to_string())
                .await
            {
                eprintln!("[notifier] MQTT publish failed: {e:?}");
            }
        }
        if let Err(e) = self.push_webhook("vigie shutdown", &text).await {
            eprintln!("[notifier] webhook push failed: {e}");
        }
    }

    async fn publish_mqtt(&self, transition: &Transition, text: &str) -> Result<()> {
        let Some(client) = &self.mqtt else { return Ok(()) };

        let suffix = match transition.kind {
            TransitionKind::Failed => "failed",
            TransitionKind::Recovered => "recovered",
        };
        let topic = format!("{}/{suffix}@v1", self.topic_prefix);
        let payload = serde_json::json!({
            "target": transition.target.name,
            "kind": transition.target.kind,
            "transition": transition.kind,
            "detail": text,
            "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        });
        client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_string())
            .await?;
        Ok(())
    }

    async fn push_webhook(&self, title: &str, text: &str) -> Result<()> {
        let Some(url) = &self.webhook_url else { return Ok(()) };
        self.http
            .post(url)
            .header("Title", title)
            .body(text.to_string())
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn title_for(kind: TransitionKind) -> String {
    match kind {
        TransitionKind::Failed => "vigie: target down".to_string(),
        TransitionKind::Recovered => "vigie: target recovered".to_string(),
    }
}

fn format_transition(transition: &Transition) -> String {
    let name = &transition.target.name;
    let mut text = match (transition.target.kind, transition.kind) {
        (TargetKind::Host, TransitionKind::Failed) => {
            format!("🔴 {name}: 🟢 online → 🔴 offline")
        }
        (TargetKind::Host, TransitionKind::Recovered) => {
            format!("🟢 {name}: 🔴 offline → 🟢 online")
        }
        (TargetKind::Process, TransitionKind::Failed) => {
            format!("🔴 process {name} is down")
        }
        (TargetKind::Process, TransitionKind::Recovered) => {
            format!("🟢 process {name} is back online")
        }
    };

    if let Some(ms) = transition.response_time_ms {
        text.push_str(&format!("\nResponse time: {ms:.0}ms"));
    }
    if let Some(info) = &transition.process {
        let memory_mb = info.memory.map(|b| b as f64 / (1024.0 * 1024.0));
        text.push_str(&format!(
            "\nCPU: {}% | Memory: {}",
            info.cpu.map(|c| format!("{c:.1}")).unwrap_or_else(|| "?".into()),
            memory_mb.map(|m| format!("{m:.1}MB")).unwrap_or_else(|| "?".into()),
        ));
        if let Some(restarts) = info.restarts {
            text.push_str(&format!(" | Restarts: {restarts}"));
        }
    }
    text
}
