use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::detection::domain::face_locator::RotationAwareFaceLocator;
use crate::gallery::domain::identity_key::IdentityKey;
use crate::recognition::domain::reference_gallery::{ReferenceFace, ReferenceGallery};
use crate::shared::constants::REFERENCE_EXTENSIONS;
use crate::video::domain::video_reader::{read_first_frame, VideoReaderFactory};

/// File modification time and size; a change in either re-embeds the file.
type FileStamp = (SystemTime, u64);

struct CachedReference {
    stamp: FileStamp,
    face: Option<ReferenceFace>,
}

/// Reads `<dir>/<identity>.{jpg,jpeg,png}` files, sorted by file name.
///
/// The directory is listed on every call, so files dropped in or removed
/// take effect immediately. Embeddings are cached per file until its
/// modification time or size changes. Unreadable images and images without
/// exactly one face are skipped with a warning.
pub struct DirectoryReferenceGallery {
    dir: PathBuf,
    image_reader: VideoReaderFactory,
    locator: Arc<RotationAwareFaceLocator>,
    embedder: Arc<dyn FaceEmbedder>,
    cache: Mutex<HashMap<PathBuf, CachedReference>>,
}

impl DirectoryReferenceGallery {
    pub fn new(
        dir: impl Into<PathBuf>,
        image_reader: VideoReaderFactory,
        locator: Arc<RotationAwareFaceLocator>,
        embedder: Arc<dyn FaceEmbedder>,
    ) -> Self {
        Self {
            dir: dir.into(),
            image_reader,
            locator,
            embedder,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn reference_files(&self) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_reference_extension(p))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn embed_file(&self, path: &Path) -> Result<Option<ReferenceFace>, Box<dyn std::error::Error>> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let identity = IdentityKey::parse(&stem)?;

        let mut reader = (self.image_reader)();
        let frame = read_first_frame(reader.as_mut(), path)?;
        let Some(located) = self.locator.locate(&frame)? else {
            return Ok(None);
        };
        let embedding = self.embedder.embed(&located.upright, &located.face)?;
        Ok(embedding.map(|embedding| ReferenceFace {
            identity,
            embedding,
        }))
    }
}

impl ReferenceGallery for DirectoryReferenceGallery {
    fn references(&self) -> Result<Vec<ReferenceFace>, Box<dyn std::error::Error>> {
        let files = self.reference_files()?;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|path, _| files.contains(path));

        let mut references = Vec::new();
        for path in files {
            let stamp = file_stamp(&path);
            if let Some(cached) = cache.get(&path).filter(|c| Some(c.stamp) == stamp) {
                references.extend(cached.face.clone());
                continue;
            }

            match self.embed_file(&path) {
                Ok(face) => {
                    if face.is_none() {
                        log::warn!("No usable face in reference {}", path.display());
                    }
                    references.extend(face.clone());
                    match stamp {
                        Some(stamp) => {
                            cache.insert(path, CachedReference { stamp, face });
                        }
                        None => {
                            cache.remove(&path);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Skipping reference {}: {e}", path.display());
                    cache.remove(&path);
                }
            }
        }
        Ok(references)
    }
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

fn has_reference_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| REFERENCE_EXTENSIONS.contains(&e.as_str()))
}
