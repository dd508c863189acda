//! Writing frames to disk for external viewers.

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Error, Result};

/// Replace `path` with `data` so readers never see a half-written frame.
///
/// The bytes go to `<path>.part` first and are renamed over `path`.
///
/// # Errors
///
/// Returns [`Error::FrameWrite`] if either step fails.
pub async fn write_frame(path: &Path, data: &[u8]) -> Result<()> {
    let partial = partial_path(path);

    let write = async {
        tokio::fs::write(&partial, data).await?;
        tokio::fs::rename(&partial, path).await
    };
    if let Err(source) = write.await {
        // Best effort; the original error is what matters.
        tokio::fs::remove_file(&partial).await.ok();
        return Err(Error::FrameWrite {
            path: path.to_path_buf(),
            source,
        });
    }

    trace!(path = %path.display(), len = data.len(), "Frame written");
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    PathBuf::from(partial)
}
