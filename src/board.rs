/**
 * MESSAGE BOARD - Coordinateur du tableau de messages public
 *
 * RÔLE : soumissions (validation, ID monotone, fenêtre des 100 derniers),
 * persistance via le blob store, réveil des long-polls en attente.
 *
 * Le coordinateur est l'unique writer du log et du compteur d'ID ; le
 * registre de long-poll ne fait que lire le log qu'on lui passe. Le
 * compteur survit à la troncature ET au redémarrage (persisté dans le
 * document), un ID n'est jamais réutilisé.
 */
use crate::longpoll::{PollOutcome, PollRegistry};
use crate::store::BlobStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

/// Fenêtre glissante : seuls les 100 derniers messages sont retenus
const MESSAGE_LOG_CAPACITY: usize = 100;

pub const MESSAGES_DOC_VERSION: u32 = 1;
const MESSAGES_DOC_KEY: &str = "messages";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub name: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

/// Document persisté du board ; `last_id` y figure pour que la numérotation
/// reprenne après redémarrage même si de vieux messages ont été évincés
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesDoc {
    pub version: u32,
    pub last_id: u64,
    pub messages: Vec<Message>,
}

impl Default for MessagesDoc {
    fn default() -> Self {
        Self { version: MESSAGES_DOC_VERSION, last_id: 0, messages: Vec::new() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Missing name or message fields")]
    MissingFields,
}

struct BoardInner {
    last_id: u64,
    messages: Vec<Message>,
}

pub struct MessageBoard {
    inner: Mutex<BoardInner>,
    store: BlobStore,
}

impl MessageBoard {
    /// Recharge le log persisté ; un document absent ou corrompu donne un
    /// board vide, jamais une erreur de démarrage.
    pub async fn load(store: BlobStore) -> Self {
        let doc: MessagesDoc = store.load(MESSAGES_DOC_KEY).await;
        // ne jamais redescendre sous le plus grand ID encore présent
        let max_id = doc.messages.iter().map(|m| m.id).max().unwrap_or(0);
        let last_id = doc.last_id.max(max_id);
        println!("[board] loaded {} messages (last id {})", doc.messages.len(), last_id);
        Self {
            inner: Mutex::new(BoardInner { last_id, messages: doc.messages }),
            store,
        }
    }

    /// Accepte une soumission, persiste, puis réveille les long-polls.
    pub async fn submit(
        &self,
        polls: &PollRegistry,
        name: &str,
        message: &str,
    ) -> Result<Message, BoardError> {
        if name.trim().is_empty() || message.trim().is_empty() {
            return Err(BoardError::MissingFields);
        }

        let (new_message, doc) = {
            let mut inner = self.inner.lock();
            inner.last_id += 1;
            let new_message = Message {
                id: inner.last_id,
                name: name.to_string(),
                message: message.to_string(),
                time: OffsetDateTime::now_utc(),
            };
            inner.messages.push(new_message.clone());
            if inner.messages.len() > MESSAGE_LOG_CAPACITY {
                let excess = inner.messages.len() - MESSAGE_LOG_CAPACITY;
                inner.messages.drain(..excess);
            }
            let doc = MessagesDoc {
                version: MESSAGES_DOC_VERSION,
                last_id: inner.last_id,
                messages: inner.messages.clone(),
            };
            (new_message, doc)
        };

        self.store.save(MESSAGES_DOC_KEY, &doc).await;
        polls.notify(&doc.messages, new_message.id);
        Ok(new_message)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    pub fn last_id(&self) -> u64 {
        self.inner.lock().last_id
    }

    /// Réponse immédiate s'il existe déjà des messages après `since_id`,
    /// sinon enregistre l'attente sous le verrou du board : une soumission
    /// concurrente verra forcément le waiter.
    pub fn poll_or_register(&self, polls: &PollRegistry, since_id: u64) -> PollOutcome {
        let inner = self.inner.lock();
        let newer: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.id > since_id)
            .cloned()
            .collect();
        if !newer.is_empty() {
            return PollOutcome::Ready(newer);
        }
        let (id, rx) = polls.register(since_id);
        PollOutcome::Wait(id, rx)
    }
}

pub type SharedBoard = Arc<MessageBoard>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn fresh_board(dir: &std::path::Path) -> MessageBoard {
        MessageBoard::load(BlobStore::new(dir)).await
    }

    #[tokio::test]
    async fn test_submit_assigns_increasing_ids_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let board = fresh_board(dir.path()).await;
        let polls = PollRegistry::new();

        let a = board.submit(&polls, "ayse", "selam").await.unwrap();
        let b = board.submit(&polls, "mark", "bonjour").await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(board.last_id(), 2);
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_fields() {
        let dir = tempfile::tempdir().unwrap();
        let board = fresh_board(dir.path()).await;
        let polls = PollRegistry::new();

        assert!(board.submit(&polls, "", "hello").await.is_err());
        assert!(board.submit(&polls, "ayse", "   ").await.is_err());
        // un rejet ne consomme pas d'ID et ne touche pas au log
        assert_eq!(board.last_id(), 0);
        assert!(board.messages().is_empty());
    }

    #[tokio::test]
    async fn test_truncation_keeps_newest_and_ids_survive() {
        let dir = tempfile::tempdir().unwrap();
        let board = fresh_board(dir.path()).await;
        let polls = PollRegistry::new();

        for i in 0..105 {
            board.submit(&polls, "ayse", &format!("m{i}")).await.unwrap();
        }
        let messages = board.messages();
        assert_eq!(messages.len(), 100);
        // les plus vieux sont partis, la numérotation continue
        assert_eq!(messages.first().unwrap().id, 6);
        assert_eq!(messages.last().unwrap().id, 105);
        assert_eq!(board.last_id(), 105);

        let next = board.submit(&polls, "ayse", "encore").await.unwrap();
        assert_eq!(next.id, 106);
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let polls = PollRegistry::new();
        {
            let board = fresh_board(dir.path()).await;
            board.submit(&polls, "ayse", "un").await.unwrap();
            board.submit(&polls, "mark", "deux").await.unwrap();
        }

        let reloaded = fresh_board(dir.path()).await;
        let messages = reloaded.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].name, "ayse");
        assert_eq!(messages[0].message, "un");
        assert_eq!(messages[1].id, 2);
        // la numérotation reprend où elle s'était arrêtée
        let c = reloaded.submit(&polls, "ayse", "trois").await.unwrap();
        assert_eq!(c.id, 3);
    }

    #[tokio::test]
    async fn test_poll_returns_backlog_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let board = fresh_board(dir.path()).await;
        let polls = PollRegistry::new();

        board.submit(&polls, "ayse", "A").await.unwrap();
        board.submit(&polls, "ayse", "B").await.unwrap();

        match board.poll_or_register(&polls, 0) {
            PollOutcome::Ready(messages) => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].message, "A");
                assert_eq!(messages[1].id, 2);
            }
            PollOutcome::Wait(..) => panic!("expected immediate result"),
        }
        assert_eq!(polls.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_held_poll_resolves_on_submission() {
        let dir = tempfile::tempdir().unwrap();
        let board = Arc::new(fresh_board(dir.path()).await);
        let polls = Arc::new(PollRegistry::new());

        board.submit(&polls, "ayse", "A").await.unwrap();
        board.submit(&polls, "ayse", "B").await.unwrap();

        // au max courant : pas de réponse immédiate
        let PollOutcome::Wait(_id, rx) = board.poll_or_register(&polls, 2) else {
            panic!("expected to wait");
        };

        let submitter = {
            let board = board.clone();
            let polls = polls.clone();
            tokio::spawn(async move {
                board.submit(&polls, "mark", "C").await.unwrap();
            })
        };

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("poll resolved")
            .unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, 3);
        assert_eq!(delivered[0].message, "C");
        submitter.await.unwrap();
        assert_eq!(polls.pending_count(), 0);
    }
}
