use std::sync::Arc;

use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::detection::domain::face_locator::{Rotation, RotationAwareFaceLocator};
use crate::gallery::domain::embedding::Embedding;
use crate::recognition::domain::decision::{is_unknown, within_tolerance};
use crate::recognition::domain::recognition_result::{
    Diagnostics, RecognitionResult, RecognitionStatus,
};
use crate::recognition::domain::reference_gallery::ReferenceGallery;
use crate::shared::config::RecognitionConfig;
use crate::shared::error::FaceGalleryError;
use crate::shared::temp_file::spill_to_temp_file;
use crate::training::domain::model_bundle::ModelBundle;
use crate::training::training_coordinator::TrainingCoordinator;
use crate::video::domain::video_reader::{read_first_frame, VideoReaderFactory};

/// Open-set identification of the single face in an image.
///
/// Uses the current model bundle when one exists, otherwise the flat
/// reference gallery. Read-only: never touches the embedding store.
pub struct RecognizeFaceUseCase {
    image_reader: VideoReaderFactory,
    locator: Arc<RotationAwareFaceLocator>,
    embedder: Arc<dyn FaceEmbedder>,
    coordinator: Arc<TrainingCoordinator>,
    references: Arc<dyn ReferenceGallery>,
    config: RecognitionConfig,
}

impl RecognizeFaceUseCase {
    pub fn new(
        image_reader: VideoReaderFactory,
        locator: Arc<RotationAwareFaceLocator>,
        embedder: Arc<dyn FaceEmbedder>,
        coordinator: Arc<TrainingCoordinator>,
        references: Arc<dyn ReferenceGallery>,
        config: RecognitionConfig,
    ) -> Self {
        Self {
            image_reader,
            locator,
            embedder,
            coordinator,
            references,
            config,
        }
    }

    pub fn execute(&self, image: &[u8]) -> Result<RecognitionResult, FaceGalleryError> {
        if image.is_empty() {
            return Err(FaceGalleryError::InvalidInput("image is empty".into()));
        }
        let temp = spill_to_temp_file(image)?;
        let mut reader = (self.image_reader)();
        let frame = read_first_frame(reader.as_mut(), temp.path())
            .map_err(|e| FaceGalleryError::InvalidInput(format!("failed to decode image: {e}")))?;

        let located = self
            .locator
            .locate(&frame)
            .map_err(|e| FaceGalleryError::Internal(e.to_string()))?;
        let Some(located) = located else {
            log::debug!("No single face in query image");
            return Ok(RecognitionResult::no_face());
        };

        let embedding = match self.embedder.embed(&located.upright, &located.face) {
            Ok(Some(embedding)) => embedding,
            Ok(None) => return Ok(RecognitionResult::no_face()),
            Err(e) => {
                log::warn!("Face embedding failed: {e}");
                return Ok(RecognitionResult::no_face());
            }
        };

        let result = match self.coordinator.current_bundle() {
            Some(bundle) => self.classify(&bundle, &embedding, located.rotation)?,
            None => self.match_references(&embedding, located.rotation)?,
        };
        log::info!(
            "Recognition verdict {:?} ({:.3})",
            result.status,
            result.confidence
        );
        Ok(result)
    }

    fn classify(
        &self,
        bundle: &ModelBundle,
        embedding: &Embedding,
        rotation: Rotation,
    ) -> Result<RecognitionResult, FaceGalleryError> {
        let prediction = bundle
            .predict(embedding)
            .map_err(|e| FaceGalleryError::Internal(format!("model {}: {e}", bundle.version)))?;

        let unknown = is_unknown(
            prediction.probability,
            prediction.centroid_distance,
            &self.config,
        );
        let (status, identity) = if unknown {
            (RecognitionStatus::Unknown, None)
        } else {
            (RecognitionStatus::Match, Some(prediction.identity.clone()))
        };

        Ok(RecognitionResult {
            status,
            identity,
            confidence: prediction.probability,
            diagnostics: Diagnostics {
                probability: Some(prediction.probability),
                centroid_distance: prediction.centroid_distance,
                predicted: Some(prediction.identity),
                rotation: Some(rotation),
            },
        })
    }

    /// First reference within tolerance wins, in the gallery's order.
    fn match_references(
        &self,
        embedding: &Embedding,
        rotation: Rotation,
    ) -> Result<RecognitionResult, FaceGalleryError> {
        let references = self
            .references
            .references()
            .map_err(|e| FaceGalleryError::Internal(format!("reference gallery: {e}")))?;
        let diagnostics = Diagnostics {
            rotation: Some(rotation),
            ..Diagnostics::default()
        };

        if references.is_empty() {
            return Ok(RecognitionResult {
                status: RecognitionStatus::NoKnownFaces,
                identity: None,
                confidence: 1.0,
                diagnostics,
            });
        }

        let hit = references.into_iter().find(|reference| {
            reference.embedding.dim() == embedding.dim()
                && within_tolerance(reference.embedding.distance(embedding), &self.config)
        });

        Ok(match hit {
            Some(reference) => RecognitionResult {
                status: RecognitionStatus::Match,
                identity: Some(reference.identity),
                confidence: 1.0,
                diagnostics,
            },
            None => RecognitionResult {
                status: RecognitionStatus::NoMatch,
                identity: None,
                confidence: 1.0,
                diagnostics,
            },
        })
    }
}
