//! Small filesystem helpers shared by the Bundle Loader, Pack Rewriter and
//! Archiver: recursive copy/remove, and a `**/*.qlx` sweep.

use camino::{Utf8Path, Utf8PathBuf};

use crate::errors::{BundleError, Result};

/// Recursively copy `src` to `dst`, creating `dst` and any missing parents.
pub fn copy_dir_all(src: &Utf8Path, dst: &Utf8Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|cause| BundleError::IOFailure {
        context: format!("creating directory {dst}"),
        cause,
    })?;
    for entry in std::fs::read_dir(src).map_err(|cause| BundleError::IOFailure {
        context: format!("reading directory {src}"),
        cause,
    })? {
        let entry = entry.map_err(|cause| BundleError::IOFailure {
            context: format!("reading directory entry under {src}"),
            cause,
        })?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let src_path = src.join(file_name.as_ref());
        let dst_path = dst.join(file_name.as_ref());
        let file_type = entry.file_type().map_err(|cause| BundleError::IOFailure {
            context: format!("inspecting {src_path}"),
            cause,
        })?;
        if file_type.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(&src_path).map_err(|cause| BundleError::IOFailure {
                context: format!("reading symlink {src_path}"),
                cause,
            })?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dst_path).map_err(|cause| {
                BundleError::IOFailure {
                    context: format!("recreating symlink {dst_path}"),
                    cause,
                }
            })?;
            #[cfg(not(unix))]
            std::fs::copy(&src_path, &dst_path).map_err(|cause| BundleError::IOFailure {
                context: format!("copying {src_path} to {dst_path}"),
                cause,
            })?;
        } else {
            std::fs::copy(&src_path, &dst_path).map_err(|cause| BundleError::IOFailure {
                context: format!("copying {src_path} to {dst_path}"),
                cause,
            })?;
        }
    }
    Ok(())
}

/// Remove a directory tree, succeeding even if it doesn't exist.
pub fn remove_dir_all_if_exists(path: &Utf8Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(cause) => Err(BundleError::IOFailure {
            context: format!("removing directory {path}"),
            cause,
        }),
    }
}

/// Depth-first list of every file under `root` whose extension is `ext`
/// (without the leading dot).
pub fn find_files_with_extension(root: &Utf8Path, ext: &str) -> Result<Vec<Utf8PathBuf>> {
    let mut matches = Vec::new();
    if !root.exists() {
        return Ok(matches);
    }
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.map_err(|err| BundleError::IOFailure {
            context: format!("walking {root}"),
            cause: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
        })?;
        if entry.file_type().is_file() {
            if let Some(path) = Utf8Path::from_path(entry.path()) {
                if path.extension() == Some(ext) {
                    matches.push(path.to_owned());
                }
            }
        }
    }
    Ok(matches)
}
