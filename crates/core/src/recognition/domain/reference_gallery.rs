use crate::gallery::domain::embedding::Embedding;
use crate::gallery::domain::identity_key::IdentityKey;

/// One identity of the flat fallback gallery.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceFace {
    pub identity: IdentityKey,
    pub embedding: Embedding,
}

/// Single-image-per-identity references used before any model is trained.
///
/// Implementations return references in a stable order; recognition takes
/// the first one within tolerance.
pub trait ReferenceGallery: Send + Sync {
    fn references(&self) -> Result<Vec<ReferenceFace>, Box<dyn std::error::Error>>;
}
