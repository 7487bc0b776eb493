use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VigieConfig {
    /// Serveurs distants surveillés par ping
    #[serde(default)]
    pub servers: Vec<ServerConf>,
    /// Noms de process pm2 surveillés
    #[serde(default)]
    pub processes: Vec<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    /// Nombre d'échecs consécutifs avant alerte
    #[serde(default = "default_threshold")]
    pub notification_threshold: u32,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    pub mqtt: Option<MqttConf>,
    pub notify: Option<NotifyConf>,
    #[serde(default)]
    pub supervisor: SupervisorConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConf {
    pub name: String,
    pub host: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifyConf {
    /// Préfixe des topics d'alerte (ex: "vigie/alerts")
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// URL ntfy pour le push opérateur (ex: "https://ntfy.sh/mon-topic")
    pub webhook_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SupervisorConf {
    /// Commande du superviseur, découpée façon shell ("pm2", "ssh box pm2"...)
    pub command: String,
}

fn default_check_interval() -> u64 { 5 }
fn default_probe_timeout() -> u64 { 2 }
fn default_threshold() -> u32 { 3 }
fn default_poll_timeout() -> u64 { 30 }
fn default_data_dir() -> String { "./data".into() }
fn default_http_port() -> u16 { 2589 }
fn default_topic_prefix() -> String { "vigie/alerts".into() }

impl Default for SupervisorConf {
    fn default() -> Self {
        Self { command: "pm2".into() }
    }
}

impl Default for VigieConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            processes: Vec::new(),
            check_interval_seconds: default_check_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            notification_threshold: default_threshold(),
            poll_timeout_seconds: default_poll_timeout(),
            data_dir: default_data_dir(),
            http_port: default_http_port(),
            mqtt: Some(MqttConf { host: "localhost".into(), port: 1883 }),
            notify: None,
            supervisor: SupervisorConf::default(),
        }
    }
}

pub async fn load_config() -> VigieConfig {
    let path = std::env::var("VIGIE_CONFIG").unwrap_or_else(|_| "vigie.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() { return VigieConfig::default(); }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[vigie] config invalide: {e}");
            VigieConfig::default()
        })
    } else {
        eprintln!("[vigie] pas de vigie.yaml, usage config par défaut");
        VigieConfig::default()
    }
}
