use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::embedding_store::{retain_most_recent, EmbeddingStore};
use crate::gallery::domain::identity_key::IdentityKey;
use crate::shared::constants::MAX_EMBEDDINGS_PER_IDENTITY;

const EMBEDDINGS_FILE: &str = "embeddings.json";
const FACES_DIR: &str = "faces";

/// Stores one `embeddings.json` per identity under `root/<key>/`.
///
/// Each append is a read-modify-write held under a per-identity mutex, and
/// the file is replaced via write-to-temp + rename so readers never observe
/// a truncated file. A per-identity mutex lives only while an append for
/// that identity is in flight.
pub struct JsonEmbeddingStore {
    root: PathBuf,
    locks: Mutex<HashMap<IdentityKey, Arc<Mutex<()>>>>,
}

impl JsonEmbeddingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn identity_dir(&self, identity: &IdentityKey) -> PathBuf {
        self.root.join(identity.as_str())
    }

    fn embeddings_path(&self, identity: &IdentityKey) -> PathBuf {
        self.identity_dir(identity).join(EMBEDDINGS_FILE)
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, HashMap<IdentityKey, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_for(&self, identity: &IdentityKey) -> Arc<Mutex<()>> {
        self.lock_table().entry(identity.clone()).or_default().clone()
    }

    /// Drops the identity's mutex once no other append holds a handle to it.
    fn release(&self, identity: &IdentityKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.lock_table();
        // One handle in the table, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(identity);
        }
    }

    fn append_locked(
        &self,
        identity: &IdentityKey,
        embeddings: Vec<Embedding>,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        let path = self.embeddings_path(identity);
        let mut stored = read_embeddings(&path)?;
        stored.extend(embeddings);
        retain_most_recent(&mut stored, MAX_EMBEDDINGS_PER_IDENTITY);
        write_embeddings(&path, &stored)?;
        Ok(stored.len())
    }
}

impl EmbeddingStore for JsonEmbeddingStore {
    fn load(&self, identity: &IdentityKey) -> Result<Vec<Embedding>, Box<dyn std::error::Error>> {
        read_embeddings(&self.embeddings_path(identity))
    }

    fn append(
        &self,
        identity: &IdentityKey,
        embeddings: Vec<Embedding>,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        let lock = self.lock_for(identity);
        let result = {
            // The file is rewritten by rename, so a panicked writer leaves it whole.
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.append_locked(identity, embeddings)
        };
        self.release(identity, lock);
        result
    }

    fn identities(&self) -> Result<Vec<IdentityKey>, Box<dyn std::error::Error>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().join(EMBEDDINGS_FILE).is_file() {
                continue;
            }
            let name = entry.file_name();
            match IdentityKey::parse(&name.to_string_lossy()) {
                Ok(key) if key.as_str() == name.to_string_lossy() => keys.push(key),
                _ => log::warn!("Ignoring non-normalized identity directory {name:?}"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn faces_dir(&self, identity: &IdentityKey) -> PathBuf {
        self.identity_dir(identity).join(FACES_DIR)
    }
}

fn read_embeddings(path: &Path) -> Result<Vec<Embedding>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_embeddings(path: &Path, embeddings: &[Embedding]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, serde_json::to_vec(embeddings)?)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
