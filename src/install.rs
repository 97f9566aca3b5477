//! Install orchestration: from a matched (source, version) pair to a local
//! install path, idempotently and crash-safely.
//!
//! The final exploded directory is either fully absent or fully populated:
//! downloads land in a scratch directory first, the completed archive is
//! promoted to its stable path, and any failure during download or
//! extraction rolls the final path back before the error propagates. The
//! scratch directory is removed on every exit path. (A hard kill in the
//! middle of extraction can still leave a partial final directory; the next
//! install run cannot distinguish it from a complete one. Known limitation.)

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::archive::{self, Archive, ExtractError};
use crate::progress::ProgressListener;
use crate::source::error::SourceError;
use crate::source::{Source, ToolVersion};

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Download failed: {0}")]
    Source(#[from] SourceError),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ensure `version` of `tool` is installed under `source`'s layout,
/// returning the exploded directory.
///
/// Idempotent fast path first: an existing exploded directory is returned
/// without any network or extraction work. Either of the two remaining
/// steps being already done (archive downloaded by an earlier interrupted
/// run) is tolerated.
pub async fn ensure_installed<S>(
    source: &S,
    tool: &str,
    version: &ToolVersion,
    progress: &dyn ProgressListener,
) -> Result<PathBuf, InstallError>
where
    S: Source + ?Sized,
{
    let layout = source.layout();
    let identifier = &version.identifier;
    let final_dir = layout.exploded_dir(tool, identifier);
    if final_dir.is_dir() {
        debug!(source = source.name(), tool, identifier = %identifier, "already installed");
        return Ok(final_dir);
    }

    let kind = source.archive_kind(version);
    let archive_path = layout.archive_path(tool, identifier, kind);
    let work_dir = layout.work_dir(tool, identifier);
    tokio::fs::create_dir_all(&work_dir).await?;

    let outcome = download_and_unpack(
        source,
        tool,
        version,
        progress,
        &archive_path,
        &work_dir,
        &final_dir,
    )
    .await;

    // The scratch dir goes away on success and failure alike.
    let _ = tokio::fs::remove_dir_all(&work_dir).await;

    match outcome {
        Ok(()) => {
            info!(source = source.name(), tool, identifier = %identifier, path = %final_dir.display(), "installed");
            Ok(final_dir)
        }
        Err(e) => {
            // Roll back a partially populated final path.
            let _ = archive::delete(&final_dir);
            Err(e)
        }
    }
}

async fn download_and_unpack<S>(
    source: &S,
    tool: &str,
    version: &ToolVersion,
    progress: &dyn ProgressListener,
    archive_path: &std::path::Path,
    work_dir: &std::path::Path,
    final_dir: &std::path::Path,
) -> Result<(), InstallError>
where
    S: Source + ?Sized,
{
    let archive = if archive_path.is_file() {
        debug!(source = source.name(), tool, "archive already downloaded");
        Archive {
            kind: source.archive_kind(version),
            location: archive_path.to_path_buf(),
        }
    } else {
        let staged = work_dir.join(
            archive_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("archive")),
        );
        let downloaded = source.download(tool, version, &staged, progress).await?;
        // Promote the completed download to its stable path so a crash
        // between here and extraction never leaves a torn archive there.
        tokio::fs::rename(&downloaded.location, archive_path).await?;
        Archive {
            kind: downloaded.kind,
            location: archive_path.to_path_buf(),
        }
    };

    archive::unpack(&archive, final_dir)?;
    Ok(())
}
