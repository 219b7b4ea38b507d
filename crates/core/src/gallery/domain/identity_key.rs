use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::error::FaceGalleryError;

/// Normalized identity key: trimmed, lower-cased, non-empty.
///
/// Keys double as directory names in the embedding store, so anything that
/// could escape that directory is rejected.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn parse(raw: &str) -> Result<Self, FaceGalleryError> {
        let key = raw.trim().to_lowercase();
        if key.is_empty() {
            return Err(FaceGalleryError::InvalidInput(
                "identity key is required".into(),
            ));
        }
        if key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
            return Err(FaceGalleryError::InvalidInput(format!(
                "identity key {key:?} is not a valid name"
            )));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("alice", "alice")]
    #[case("  Alice ", "alice")]
    #[case("BOB\n", "bob")]
    #[case("Mary Ann", "mary ann")]
    fn test_parse_normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(IdentityKey::parse(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("..")]
    #[case("a/b")]
    #[case("a\\b")]
    fn test_parse_rejects(#[case] raw: &str) {
        let err = IdentityKey::parse(raw).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_keys_order_lexicographically() {
        let mut keys = vec![
            IdentityKey::parse("carol").unwrap(),
            IdentityKey::parse("alice").unwrap(),
            IdentityKey::parse("bob").unwrap(),
        ];
        keys.sort();
        let names: Vec<_> = keys.iter().map(IdentityKey::as_str).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }
}
