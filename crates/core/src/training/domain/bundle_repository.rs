use crate::training::domain::model_bundle::ModelBundle;

/// Durable home of the current model bundle.
///
/// `save` must be atomic from a reader's point of view: `load_current`
/// returns either the previous complete bundle or the new one.
pub trait BundleRepository: Send + Sync {
    fn load_current(&self) -> Result<Option<ModelBundle>, Box<dyn std::error::Error>>;

    fn save(&self, bundle: &ModelBundle) -> Result<(), Box<dyn std::error::Error>>;

    fn exists(&self) -> bool;
}
