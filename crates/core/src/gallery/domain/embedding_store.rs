use std::path::PathBuf;

use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::identity_key::IdentityKey;

/// Per-identity, insertion-ordered, bounded embedding collections.
///
/// Implementations must make `append` atomic per identity: two concurrent
/// appends for the same key both land, none is lost.
pub trait EmbeddingStore: Send + Sync {
    /// All embeddings of `identity`, oldest first. Unknown identities are empty.
    fn load(&self, identity: &IdentityKey) -> Result<Vec<Embedding>, Box<dyn std::error::Error>>;

    /// Appends `embeddings`, evicts the oldest beyond the store's cap, and
    /// returns the number stored afterwards.
    fn append(
        &self,
        identity: &IdentityKey,
        embeddings: Vec<Embedding>,
    ) -> Result<usize, Box<dyn std::error::Error>>;

    /// Every identity with a stored collection, sorted by key.
    fn identities(&self) -> Result<Vec<IdentityKey>, Box<dyn std::error::Error>>;

    /// Directory where diagnostic face crops for `identity` are written.
    fn faces_dir(&self, identity: &IdentityKey) -> PathBuf;
}

/// Drops the oldest entries so at most `cap` remain.
pub fn retain_most_recent<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        items.drain(..items.len() - cap);
    }
}
