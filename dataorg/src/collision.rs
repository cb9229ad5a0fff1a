use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DataorgError, DataorgResult};
use crate::utils::append_suffix;

/// Upper bound on `-N` suffixes tried for a single file name.
pub const MAX_SUFFIX: u32 = 10_000;

/// Target paths handed out within the current batch.
#[derive(Debug, Default)]
pub struct ClaimSet {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.claimed.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.lock().is_empty()
    }

    pub fn clear(&self) {
        self.claimed.lock().clear();
    }

    /// Reserve `candidate`, or the first `name-N.ext` that is neither on
    /// disk nor already claimed.
    pub fn claim<F>(&self, candidate: &Path, exists_on_disk: F) -> DataorgResult<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        let mut claimed = self.claimed.lock();

        if !claimed.contains(candidate) && !exists_on_disk(candidate) {
            claimed.insert(candidate.to_path_buf());
            return Ok(candidate.to_path_buf());
        }

        for counter in 1..=MAX_SUFFIX {
            let renamed = append_suffix(candidate, &format!("-{}", counter));
            if !claimed.contains(&renamed) && !exists_on_disk(&renamed) {
                debug!("Renaming target {:?} to {:?}", candidate, renamed);
                claimed.insert(renamed.clone());
                return Ok(renamed);
            }
        }

        Err(DataorgError::CollisionLimitExceeded {
            path: candidate.to_path_buf(),
            attempts: MAX_SUFFIX,
        })
    }
}

/// Default disk probe for [`ClaimSet::claim`].
pub fn exists_on_disk(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_free_candidate_is_kept() {
        let claims = ClaimSet::new();
        let path = claims.claim(Path::new("/t/a.mov"), |_| false).unwrap();
        assert_eq!(path, PathBuf::from("/t/a.mov"));
        assert!(claims.contains(Path::new("/t/a.mov")));
    }

    #[test]
    fn test_repeated_claims_get_distinct_paths() {
        let claims = ClaimSet::new();
        let first = claims.claim(Path::new("/t/a.mov"), |_| false).unwrap();
        let second = claims.claim(Path::new("/t/a.mov"), |_| false).unwrap();
        let third = claims.claim(Path::new("/t/a.mov"), |_| false).unwrap();
        assert_eq!(first, PathBuf::from("/t/a.mov"));
        assert_eq!(second, PathBuf::from("/t/a-1.mov"));
        assert_eq!(third, PathBuf::from("/t/a-2.mov"));
        assert_eq!(claims.len(), 3);
    }

    #[test]
    fn test_disk_collisions_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.mov"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("a-1.mov"), b"x").unwrap();

        let claims = ClaimSet::new();
        let path = claims
            .claim(&temp_dir.path().join("a.mov"), exists_on_disk)
            .unwrap();
        assert_eq!(path, temp_dir.path().join("a-2.mov"));
    }

    #[test]
    fn test_clear_releases_claims() {
        let claims = ClaimSet::new();
        claims.claim(Path::new("/t/a.mov"), |_| false).unwrap();
        claims.clear();
        assert!(claims.is_empty());
        let again = claims.claim(Path::new("/t/a.mov"), |_| false).unwrap();
        assert_eq!(again, PathBuf::from("/t/a.mov"));
    }

    #[test]
    fn test_suffix_ceiling() {
        let claims = ClaimSet::new();
        let result = claims.claim(Path::new("/t/a.mov"), |_| true);
        assert!(matches!(
            result,
            Err(DataorgError::CollisionLimitExceeded { attempts: MAX_SUFFIX, .. })
        ));
    }
}
