use crate::supervisor::ProcessInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

/// Entité surveillée : serveur distant ou process supervisé
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub kind: TargetKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Host,
    Process,
}

/// Dernière observation d'un serveur distant, écrasée à chaque cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    pub online: bool,
    pub response_time_ms: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_checked: OffsetDateTime,
}

pub type SamplesMap = HashMap<String, SampleResult>;

/// Vue détaillée d'un process pm2, format wire de l'API /status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub id: Option<i64>,
    pub status: String,
    pub cpu: Option<f64>,
    /// Mémoire résidente en octets
    pub memory: Option<u64>,
    /// Uptime en millisecondes
    pub uptime: Option<u64>,
    pub restarts: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_checked: OffsetDateTime,
}

impl ServiceStatus {
    pub fn from_info(info: &ProcessInfo, now: OffsetDateTime) -> Self {
        Self {
            name: info.name.clone(),
            id: info.id,
            status: info.status.clone(),
            cpu: info.cpu,
            memory: info.memory,
            uptime: info.uptime_ms,
            restarts: info.restarts,
            last_checked: now,
        }
    }
}

pub type ServicesMap = HashMap<String, ServiceStatus>;

/// Compteur d'échecs consécutifs par cible.
/// `last_known_online` vaut None tant que la cible n'a jamais été vue online
/// ni notifiée down (démarrage à froid).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureCounter {
    pub kind: TargetKind,
    pub consecutive_failures: u32,
    pub last_known_online: Option<bool>,
}

pub type CountersMap = HashMap<String, FailureCounter>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Failed,
    Recovered,
}

/// Transition notifiable détectée en fin de cycle
#[derive(Debug, Clone)]
pub struct Transition {
    pub target: Target,
    pub kind: TransitionKind,
    pub response_time_ms: Option<f64>,
    pub process: Option<ProcessInfo>,
}
