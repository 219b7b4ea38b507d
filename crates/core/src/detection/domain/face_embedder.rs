use crate::gallery::domain::embedding::Embedding;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for turning a located face into an identity embedding.
///
/// `Ok(None)` means the extractor could not produce an embedding for this
/// face (e.g. a degenerate crop); callers treat it as a rejected sample.
pub trait FaceEmbedder: Send + Sync {
    fn embed(
        &self,
        frame: &Frame,
        face: &Region,
    ) -> Result<Option<Embedding>, Box<dyn std::error::Error>>;
}
