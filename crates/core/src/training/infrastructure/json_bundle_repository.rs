use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::training::domain::bundle_repository::BundleRepository;
use crate::training::domain::model_bundle::ModelBundle;

const CURRENT_FILE: &str = "CURRENT";
const BUNDLES_DIR: &str = "bundles";

/// Persists bundles as `bundles/<version>.json` plus a `CURRENT` pointer.
///
/// The bundle file is fully written before `CURRENT` is switched to it, and
/// both writes go through a temp file + rename.
pub struct JsonBundleRepository {
    root: PathBuf,
}

impl JsonBundleRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bundles_dir(&self) -> PathBuf {
        self.root.join(BUNDLES_DIR)
    }

    fn bundle_path(&self, version: &str) -> PathBuf {
        self.bundles_dir().join(format!("{version}.json"))
    }

    fn current_version(&self) -> Result<Option<String>, Box<dyn std::error::Error>> {
        match fs::read_to_string(self.root.join(CURRENT_FILE)) {
            Ok(raw) => {
                let version = raw.trim();
                Ok((!version.is_empty()).then(|| version.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every bundle file other than `keep`. Failures are only logged.
    fn prune_except(&self, keep: &str) {
        let entries = match fs::read_dir(self.bundles_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not list old bundles: {e}");
                return;
            }
        };
        let keep_name = format!("{keep}.json");
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy() == keep_name {
                continue;
            }
            if let Err(e) = fs::remove_file(entry.path()) {
                log::warn!("Could not remove old bundle {}: {e}", entry.path().display());
            }
        }
    }
}

impl BundleRepository for JsonBundleRepository {
    fn load_current(&self) -> Result<Option<ModelBundle>, Box<dyn std::error::Error>> {
        let Some(version) = self.current_version()? else {
            return Ok(None);
        };
        let raw = fs::read(self.bundle_path(&version))
            .map_err(|e| format!("bundle {version} referenced by CURRENT: {e}"))?;
        let bundle: ModelBundle = serde_json::from_slice(&raw)?;
        bundle
            .validate()
            .map_err(|e| format!("bundle {version} is unusable: {e}"))?;
        Ok(Some(bundle))
    }

    fn save(&self, bundle: &ModelBundle) -> Result<(), Box<dyn std::error::Error>> {
        fs::create_dir_all(self.bundles_dir())?;
        write_atomic(
            &self.bundle_path(&bundle.version),
            &serde_json::to_vec(bundle)?,
        )?;
        write_atomic(&self.root.join(CURRENT_FILE), bundle.version.as_bytes())?;
        self.prune_except(&bundle.version);
        Ok(())
    }

    fn exists(&self) -> bool {
        matches!(self.current_version(), Ok(Some(v)) if self.bundle_path(&v).is_file())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_name = path
        .file_name()
        .ok_or("path has no file name")?
        .to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::domain::embedding::Embedding;
    use crate::gallery::domain::identity_key::IdentityKey;
    use chrono::{Duration, TimeZone, Utc};

    fn bundle(minute: i64) -> ModelBundle {
        let set: Vec<(IdentityKey, Vec<Embedding>)> = ["alice", "bob"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let embeddings = (0..5)
                    .map(|j| {
                        let mut v = vec![0.0f32; 3];
                        v[i] = 1.0 + j as f32 * 0.01;
                        Embedding::new(v)
                    })
                    .collect();
                (IdentityKey::parse(name).unwrap(), embeddings)
            })
            .collect();
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
        ModelBundle::train(&set, at).unwrap()
    }

    #[test]
    fn test_empty_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonBundleRepository::new(dir.path());
        assert!(!repo.exists());
        assert!(repo.load_current().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonBundleRepository::new(dir.path());
        let saved = bundle(0);
        repo.save(&saved).unwrap();

        assert!(repo.exists());
        let loaded = repo.load_current().unwrap().unwrap();
        assert_eq!(loaded.version, saved.version);
        assert_eq!(loaded.labels, saved.labels);
        assert_eq!(
            fs::read_to_string(dir.path().join(CURRENT_FILE)).unwrap(),
            saved.version
        );
    }

    #[test]
    fn test_new_bundle_replaces_old() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonBundleRepository::new(dir.path());
        let old = bundle(0);
        let new = bundle(5);
        repo.save(&old).unwrap();
        repo.save(&new).unwrap();

        assert_eq!(repo.load_current().unwrap().unwrap().version, new.version);
        assert!(!repo.bundle_path(&old.version).exists());
        let leftovers: Vec<_> = fs::read_dir(repo.bundles_dir()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
        assert!(!dir.path().join("CURRENT.tmp").exists());
    }

    #[test]
    fn test_bundle_with_truncated_labels_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonBundleRepository::new(dir.path());
        let saved = bundle(0);
        repo.save(&saved).unwrap();

        let path = repo.bundle_path(&saved.version);
        let mut json: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json["labels"].as_array_mut().unwrap().truncate(1);
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let err = repo.load_current().unwrap_err();
        assert!(err.to_string().contains("unusable"), "{err}");
    }

    #[test]
    fn test_dangling_pointer_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CURRENT_FILE), "missing-version").unwrap();
        let repo = JsonBundleRepository::new(dir.path());
        assert!(!repo.exists());
        assert!(repo.load_current().is_err());
    }
}
