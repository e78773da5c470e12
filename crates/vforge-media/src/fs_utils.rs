//! Filesystem helpers for placing rendered artifacts.
//!
//! Worker scratch space and the asset root are often separate mounts, so a
//! plain rename can fail with EXDEV. `move_file` hides that detail.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, surviving cross-device moves.
///
/// Tries a rename first. On EXDEV it copies to a temporary file next to
/// `dst` and renames that into place, so the destination never observes a
/// partially written file. Parent directories are created as needed.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_exdev(&e) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "cross-device rename, copying instead"
            );
            copy_then_remove(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is errno 18 on Linux and macOS.
fn is_exdev(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    // Staging the copy beside dst keeps the final rename on one filesystem.
    let staged = dst.with_extension("partial");

    fs::copy(src, &staged).await.map_err(|e| {
        tracing::error!(
            src = %src.display(),
            staged = %staged.display(),
            error = %e,
            "copy failed during cross-device move"
        );
        MediaError::from(e)
    })?;

    if let Err(e) = fs::rename(&staged, dst).await {
        let _ = fs::remove_file(&staged).await;
        tracing::error!(
            staged = %staged.display(),
            dst = %dst.display(),
            error = %e,
            "rename failed during cross-device move"
        );
        return Err(MediaError::from(e));
    }

    // Leaving the source behind wastes scratch space but the move succeeded.
    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(src = %src.display(), error = %e, "source not removed after move");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_renames_within_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("raw.mp4");
        let dst = dir.path().join("placed.mp4");

        fs::write(&src, b"frames").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_move_file_creates_missing_parents() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("raw.mp4");
        let dst = dir.path().join("2026").join("01").join("placed.mp4");

        fs::write(&src, b"frames").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_move_file_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("raw.mp4");
        let dst = dir.path().join("placed.mp4");

        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[test]
    fn test_is_exdev_matches_errno_18_only() {
        assert!(is_exdev(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_exdev(&std::io::Error::from_raw_os_error(2)));
    }
}
