//! Archive handling: unpack downloaded distributions into exploded
//! directories.
//!
//! Distribution archives are assumed to wrap a single top-level root folder,
//! which is stripped on the way out. Entries are processed in archive order;
//! symbolic links whose target has not been extracted yet are deferred and
//! retried after the main pass, so entry ordering inside the archive never
//! changes the result. Extraction into a directory this module created is
//! all-or-nothing: on failure the directory is removed before the error
//! propagates.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Archive container format, detected from the download filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// File extension used when storing the archive on disk.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// A downloaded archive on disk, waiting to be unpacked.
#[derive(Debug, Clone)]
pub struct Archive {
    pub kind: ArchiveKind,
    pub location: PathBuf,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unknown archive kind: {0}")]
    UnknownKind(String),

    #[error("Archive entry escapes extraction root: {0}")]
    PathTraversal(String),

    #[error("Malformed archive: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A symlink entry whose target was not on disk yet when the entry streamed
/// past; retried after the main pass.
struct DeferredLink {
    link: PathBuf,
    target: PathBuf,
}

/// Unpack `archive` into `destination`, returning the destination path.
///
/// The first path segment of every entry is stripped (archives wrap a single
/// root folder); entries with nothing left after stripping are skipped. Any
/// entry containing a `..` segment is rejected. If `destination` did not
/// exist before this call it is deleted again when extraction fails.
pub fn unpack(archive: &Archive, destination: &Path) -> Result<PathBuf, ExtractError> {
    let created_root = !destination.exists();
    if created_root {
        fs::create_dir_all(destination)?;
    }

    let result = match archive.kind {
        ArchiveKind::Zip => unpack_zip(&archive.location, destination),
        ArchiveKind::TarGz => unpack_tar_gz(&archive.location, destination),
    };

    match result {
        Ok(()) => {
            debug!(archive = %archive.location.display(), dest = %destination.display(), "unpacked archive");
            Ok(destination.to_path_buf())
        }
        Err(e) => {
            if created_root {
                let _ = fs::remove_dir_all(destination);
            }
            Err(e)
        }
    }
}

/// Remove a tree recursively, files before their parent directories.
/// Missing paths are a no-op.
pub fn delete(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Validate an entry path and strip its leading root segment.
///
/// Returns `None` for entries that are nothing but the root folder itself.
fn strip_root(raw: &Path) -> Result<Option<PathBuf>, ExtractError> {
    let mut segments = Vec::new();
    for component in raw.components() {
        match component {
            Component::ParentDir => {
                return Err(ExtractError::PathTraversal(raw.display().to_string()))
            }
            Component::Normal(part) => segments.push(part),
            // Leading "./", drive prefixes and root separators carry no
            // entry identity.
            Component::CurDir | Component::Prefix(_) | Component::RootDir => {}
        }
    }
    if segments.len() <= 1 {
        return Ok(None);
    }
    Ok(Some(segments[1..].iter().collect()))
}

fn unpack_tar_gz(location: &Path, destination: &Path) -> Result<(), ExtractError> {
    let file = File::open(location)?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    tar.set_preserve_mtime(true);

    let mut deferred: Vec<DeferredLink> = Vec::new();

    let entries = tar
        .entries()
        .map_err(|e| ExtractError::Malformed(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ExtractError::Malformed(e.to_string()))?;
        let raw_path = entry
            .path()
            .map_err(|e| ExtractError::Malformed(e.to_string()))?
            .into_owned();
        let Some(relative) = strip_root(&raw_path)? else {
            continue;
        };
        let out_path = destination.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else if entry_type.is_symlink() {
            let target = entry
                .link_name()
                .map_err(|e| ExtractError::Malformed(e.to_string()))?
                .ok_or_else(|| {
                    ExtractError::Malformed(format!(
                        "symlink entry without target: {}",
                        raw_path.display()
                    ))
                })?;
            place_symlink(&out_path, &target, &mut deferred);
        } else if entry_type.is_file() {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            // Entry::unpack writes the content and restores the archived
            // modification time.
            entry
                .unpack(&out_path)
                .map_err(|e| ExtractError::Malformed(e.to_string()))?;
            apply_executable_heuristic(&out_path)?;
        }
        // Other entry types (fifos, devices) do not occur in distribution
        // archives and are ignored.
    }

    settle_deferred_links(deferred);
    Ok(())
}

fn unpack_zip(location: &Path, destination: &Path) -> Result<(), ExtractError> {
    let file = File::open(location)?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| ExtractError::Malformed(e.to_string()))?;

    let mut deferred: Vec<DeferredLink> = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| ExtractError::Malformed(e.to_string()))?;
        let raw_path = PathBuf::from(entry.name());
        let Some(relative) = strip_root(&raw_path)? else {
            continue;
        };
        let out_path = destination.join(&relative);

        let is_symlink = entry
            .unix_mode()
            .map(|mode| mode & 0o170000 == 0o120000)
            .unwrap_or(false);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else if is_symlink {
            // A zip symlink stores its target as the entry body.
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| ExtractError::Malformed(e.to_string()))?;
            place_symlink(&out_path, Path::new(&target), &mut deferred);
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let modified = entry.last_modified();
            let mut out = File::create(&out_path)?;
            io::copy(&mut entry, &mut out)?;
            drop(out);

            restore_zip_mtime(&out_path, modified);
            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                if mode & 0o777 != 0 {
                    fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))?;
                }
            }
            apply_executable_heuristic(&out_path)?;
        }
    }

    settle_deferred_links(deferred);
    Ok(())
}

fn restore_zip_mtime(path: &Path, modified: Option<zip::DateTime>) {
    if let Some(dos) = modified {
        let offset = time_from_dos(dos);
        let _ = filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(offset, 0));
    }
}

/// Convert zip's DOS timestamp into seconds since the epoch. DOS times have
/// two-second granularity and no timezone; interpreted as local-independent
/// UTC, which is as precise as the format allows.
fn time_from_dos(dos: zip::DateTime) -> i64 {
    let days_from_civil = |y: i64, m: i64, d: i64| -> i64 {
        let y = if m <= 2 { y - 1 } else { y };
        let era = y.div_euclid(400);
        let yoe = y - era * 400;
        let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + d - 1;
        let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
        era * 146097 + doe - 719468
    };
    let days = days_from_civil(
        i64::from(dos.year()),
        i64::from(dos.month()),
        i64::from(dos.day()),
    );
    days * 86_400
        + i64::from(dos.hour()) * 3_600
        + i64::from(dos.minute()) * 60
        + i64::from(dos.second())
}

/// Create the symlink now when its target already exists on disk, otherwise
/// queue it for the post-pass retry.
fn place_symlink(link: &Path, raw_target: &Path, deferred: &mut Vec<DeferredLink>) {
    let target = raw_target.to_path_buf();
    let resolved = link
        .parent()
        .map(|parent| parent.join(&target))
        .unwrap_or_else(|| target.clone());

    if resolved.exists() {
        if create_symlink(&target, link).is_err() {
            // Filesystem without symlink support; fall back to copying the
            // target content.
            copy_link_target(&resolved, link);
        }
    } else {
        deferred.push(DeferredLink {
            link: link.to_path_buf(),
            target,
        });
    }
}

/// Retry every deferred symlink after the main pass. Targets extracted later
/// in the stream exist by now; links whose target still does not exist are
/// dropped with a warning rather than failing the whole extraction.
fn settle_deferred_links(deferred: Vec<DeferredLink>) {
    for item in deferred {
        let resolved = item
            .link
            .parent()
            .map(|parent| parent.join(&item.target))
            .unwrap_or_else(|| item.target.clone());
        if !resolved.exists() {
            warn!(
                link = %item.link.display(),
                target = %item.target.display(),
                "dropping symlink with no extracted target"
            );
            continue;
        }
        if create_symlink(&item.target, &item.link).is_err() {
            copy_link_target(&resolved, &item.link);
        }
    }
}

fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }
}

fn copy_link_target(resolved: &Path, link: &Path) {
    let outcome = if resolved.is_dir() {
        copy_dir_recursive(resolved, link)
    } else {
        fs::copy(resolved, link).map(|_| ())
    };
    if let Err(e) = outcome {
        warn!(link = %link.display(), error = %e, "symlink copy fallback failed");
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Mark well-known launcher and shared-object files executable. JVM-style
/// distributions frequently ship `bin/` entries and `lib/jexec`-style
/// helpers without mode bits, depending on the installer to fix them up.
#[cfg(unix)]
fn apply_executable_heuristic(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let parent_name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let mode = fs::metadata(path)?.permissions().mode();
    let already_executable = mode & 0o111 != 0;

    let should_mark = (parent_name == "bin" && !already_executable)
        || (parent_name == "lib"
            && (file_name.contains("exec")
                || file_name.starts_with('j')
                || (file_name.starts_with("lib") && file_name.contains(".so"))));

    if should_mark {
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_executable_heuristic(_path: &Path) -> io::Result<()> {
    Ok(())
}
