//! Volume directories: creation and recursive ownership.

use std::os::unix::fs::lchown;
use std::path::Path;

use nix::unistd::{Gid, Uid};
use walkdir::WalkDir;

use crate::error::{EntrypointError, Result};

pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| EntrypointError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Chowns `root` and everything below it, returning the number of entries.
///
/// Symlinks are chowned themselves and never followed, so a link cannot
/// hand ownership of a file outside the volume to the service account.
pub fn chown_recursive(root: &Path, uid: Uid, gid: Gid) -> Result<usize> {
    let mut count = 0;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|source| EntrypointError::Walk {
            path: root.to_path_buf(),
            source,
        })?;

        lchown(entry.path(), Some(uid.as_raw()), Some(gid.as_raw())).map_err(|source| {
            EntrypointError::Chown {
                path: entry.path().to_path_buf(),
                source,
            }
        })?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::{symlink, MetadataExt};

    use nix::unistd::{getgid, getuid};

    use super::*;

    #[test]
    fn test_ensure_dir_creates_nested_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("data/conversations");

        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();

        assert!(nested.is_dir());
    }

    #[test]
    fn test_chown_recursive_owns_every_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("cache");
        ensure_dir(&dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/file.txt"), "x").unwrap();

        let count = chown_recursive(&dir, getuid(), getgid()).unwrap();

        assert_eq!(count, 3);
        for path in [dir.clone(), dir.join("nested"), dir.join("nested/file.txt")] {
            let meta = std::fs::symlink_metadata(&path).unwrap();
            assert_eq!(meta.uid(), getuid().as_raw());
            assert_eq!(meta.gid(), getgid().as_raw());
        }
    }

    #[test]
    fn test_dangling_symlink_is_not_followed() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("data");
        ensure_dir(&dir).unwrap();
        symlink(tmp.path().join("missing"), dir.join("link")).unwrap();

        let count = chown_recursive(&dir, getuid(), getgid()).unwrap();

        assert_eq!(count, 2);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = chown_recursive(&tmp.path().join("absent"), getuid(), getgid()).unwrap_err();
        assert!(matches!(err, EntrypointError::Walk { .. }));
    }
}
