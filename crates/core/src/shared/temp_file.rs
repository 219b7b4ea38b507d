use std::io::Write;

use tempfile::NamedTempFile;

use crate::shared::error::FaceGalleryError;

/// Writes uploaded media to a temporary file that is removed on drop.
///
/// Decoders sniff the container from the content, so no suffix is needed.
pub fn spill_to_temp_file(bytes: &[u8]) -> Result<NamedTempFile, FaceGalleryError> {
    let mut temp = NamedTempFile::new()
        .map_err(|e| FaceGalleryError::Internal(format!("failed to create temp file: {e}")))?;
    temp.write_all(bytes)
        .and_then(|_| temp.flush())
        .map_err(|e| FaceGalleryError::Internal(format!("failed to write temp file: {e}")))?;
    Ok(temp)
}
