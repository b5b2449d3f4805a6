//! File scanning for upload.
//!
//! Recursively walks a directory and produces one [`UploadTask`] per regular
//! file, addressed below the target root with `/`-separated store paths.

use std::path::{Component, Path};

use storepush_protocol::StorePath;

use crate::error::UploadError;
use crate::types::UploadTask;

/// Scans `root_path` recursively and returns upload tasks ordered by target
/// path.
///
/// Relative paths are split into components (so separators are the same on
/// every platform) before being joined onto `target_root`. A file name that
/// is not valid UTF-8 fails the scan.
pub fn scan_files_for_upload(
    root_path: &Path,
    target_root: &StorePath,
) -> Result<Vec<UploadTask>, UploadError> {
    let mut tasks = Vec::new();
    walk_dir(root_path, root_path, target_root, &mut tasks)?;
    tasks.sort_by(|a, b| a.target_path.cmp(&b.target_path));
    Ok(tasks)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    target_root: &StorePath,
    tasks: &mut Vec<UploadTask>,
) -> Result<(), UploadError> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, target_root, tasks)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;
            let relative = relative_store_path(rel_path)?;

            tasks.push(UploadTask {
                source_path: path,
                target_path: target_root.join_path(&relative),
                size_bytes: metadata.len(),
            });
        }
    }

    Ok(())
}

fn relative_store_path(rel_path: &Path) -> Result<StorePath, UploadError> {
    let segments = rel_path
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .map(|name| {
            name.to_str()
                .map(str::to_string)
                .ok_or_else(|| UploadError::NonUtf8Path(rel_path.to_path_buf()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StorePath::from_segments(segments)?)
}
