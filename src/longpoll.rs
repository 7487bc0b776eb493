/**
 * LONG-POLL REGISTRY - Requêtes HTTP en attente de nouveaux messages
 *
 * RÔLE : garde les clients du message board "en ligne" jusqu'à l'arrivée
 * d'un message plus récent que leur lastId, ou l'expiration de leur délai.
 *
 * FONCTIONNEMENT :
 * - Chaque attente est un oneshot dans une map Uuid -> Waiter
 * - À chaque soumission, le coordinateur appelle notify() qui retire et
 *   résout tous les waiters dont le since_id est dépassé
 * - Timeout et déconnexion ne font que retirer l'entrée ; celui qui réussit
 *   le remove() est l'unique finaliseur, un waiter ne tire jamais deux fois
 */
use crate::board::Message;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

struct Waiter {
    since_id: u64,
    tx: oneshot::Sender<Vec<Message>>,
}

pub enum PollOutcome {
    /// Des messages plus récents existaient déjà
    Ready(Vec<Message>),
    /// Attente enregistrée ; le handler garde le receiver sous timeout
    Wait(Uuid, oneshot::Receiver<Vec<Message>>),
}

pub struct PollRegistry {
    waiters: Mutex<HashMap<Uuid, Waiter>>,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self { waiters: Mutex::new(HashMap::new()) }
    }

    /// Enregistre une attente. Appelé par le coordinateur sous son propre
    /// verrou, pour qu'aucune soumission ne se glisse entre la vérification
    /// du log et l'enregistrement.
    pub fn register(&self, since_id: u64) -> (Uuid, oneshot::Receiver<Vec<Message>>) {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        self.waiters.lock().insert(id, Waiter { since_id, tx });
        (id, rx)
    }

    /// Résout toutes les attentes dépassées par `new_id`. `log` est le log
    /// complet après soumission ; chaque waiter reçoit les messages plus
    /// récents que son propre since_id.
    pub fn notify(&self, log: &[Message], new_id: u64) {
        let ready: Vec<Waiter> = {
            let mut waiters = self.waiters.lock();
            let ids: Vec<Uuid> = waiters
                .iter()
                .filter(|(_, w)| w.since_id < new_id)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter().filter_map(|id| waiters.remove(&id)).collect()
        };

        for waiter in ready {
            let newer: Vec<Message> = log
                .iter()
                .filter(|m| m.id > waiter.since_id)
                .cloned()
                .collect();
            // le client a pu partir entre temps ; son entrée est déjà retirée
            if waiter.tx.send(newer).is_err() {
                eprintln!("[longpoll] waiter gone before delivery");
            }
        }
    }

    /// Retire une attente (timeout ou déconnexion). Idempotent : retirer une
    /// entrée déjà finalisée est un no-op.
    pub fn remove(&self, id: &Uuid) -> bool {
        self.waiters.lock().remove(id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

pub type SharedPolls = Arc<PollRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn msg(id: u64) -> Message {
        Message {
            id,
            name: "ayse".into(),
            message: format!("message {id}"),
            time: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_notify_resolves_matching_waiters() {
        let registry = PollRegistry::new();
        let (_id, rx) = registry.register(2);
        assert_eq!(registry.pending_count(), 1);

        let log = vec![msg(1), msg(2), msg(3)];
        registry.notify(&log, 3);
        assert_eq!(registry.pending_count(), 0);

        let delivered = rx.await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, 3);
    }

    #[tokio::test]
    async fn test_waiter_at_current_max_is_not_woken() {
        let registry = PollRegistry::new();
        let (_id, mut rx) = registry.register(3);

        // nouveau message d'id 3 : pas plus récent que since_id=3
        registry.notify(&[msg(3)], 3);
        assert_eq!(registry.pending_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = PollRegistry::new();
        let (id, _rx) = registry.register(0);

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert_eq!(registry.pending_count(), 0);

        // une attente retirée ne réapparaît dans aucun scan ultérieur
        registry.notify(&[msg(1)], 1);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_notify_survives_dropped_receiver() {
        let registry = PollRegistry::new();
        let (_id, rx) = registry.register(0);
        drop(rx);

        // le send échoue en silence, l'entrée est tout de même retirée
        registry.notify(&[msg(1)], 1);
        assert_eq!(registry.pending_count(), 0);
    }
}
