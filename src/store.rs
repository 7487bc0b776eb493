/**
 * BLOB STORE - Persistance JSON des petits documents du kernel
 *
 * RÔLE : lecture/écriture best-effort d'un document typé par "store" logique
 * (messages du board, etc.), un fichier <data_dir>/<key>.json par document.
 *
 * FONCTIONNEMENT : `load` ne lève jamais ; fichier absent ou corrompu donne
 * le défaut typé du document. `save` journalise ses erreurs sans les
 * propager ; l'état mémoire reste la référence pour la durée du process.
 *
 * Pas de verrou ni de transaction : chaque document n'a qu'un seul writer
 * (le composant qui le possède), qui sérialise lui-même ses écritures.
 */
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct BlobStore {
    data_dir: PathBuf,
}

impl BlobStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self { data_dir: data_dir.as_ref().to_path_buf() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    /// Charge un document typé ; défaut typé si absent ou illisible.
    pub async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let path = self.path_for(key);
        if !path.exists() {
            println!("[store] no existing {key} document, starting fresh");
            return T::default();
        }
        match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(doc) => doc,
                Err(e) => {
                    eprintln!("[store] corrupt {key} document, using default: {e}");
                    T::default()
                }
            },
            Err(e) => {
                eprintln!("[store] failed to read {key} document: {e}");
                T::default()
            }
        }
    }

    /// Écrit un document, best-effort.
    pub async fn save<T: Serialize>(&self, key: &str, doc: &T) {
        let path = self.path_for(key);
        let content = match serde_json::to_string_pretty(doc) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("[store] failed to serialize {key} document: {e}");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                eprintln!("[store] failed to create data dir: {e}");
                return;
            }
        }
        if let Err(e) = fs::write(&path, content).await {
            eprintln!("[store] failed to write {key} document: {e}");
        }
    }
}
