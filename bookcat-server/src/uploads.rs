//! Cover files under `uploads/<book_id>/`
//!
//! Stored cover paths are relative to the root folder
//! (`uploads/12/cover.jpg`), the same form the static file route serves.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::imaging::ImageKind;

/// Folder holding one book's cover files
pub fn book_dir(uploads_dir: &Path, book_id: i64) -> PathBuf {
    uploads_dir.join(book_id.to_string())
}

/// Relative path stored in `Books.cover_image` / `cover_thumb`
pub fn relative_cover_path(book_id: i64, file_name: &str) -> String {
    format!("uploads/{}/{}", book_id, file_name)
}

/// Thumbnail name for a cover type
pub fn thumb_file_name(kind: ImageKind) -> String {
    format!("cover-thumb.{}", kind.extension())
}

fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

/// Delete every `cover*` file in a book folder; returns the count removed
pub fn remove_cover_files(dir: &Path) -> usize {
    let mut removed = 0;
    for name in file_names(dir) {
        if name.starts_with("cover") {
            match std::fs::remove_file(dir.join(&name)) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", dir.join(&name).display(), e),
            }
        }
    }
    removed
}

/// Legacy timestamped cover (`cover-<stamp>.<ext>`), not a thumbnail
fn is_legacy_cover(name: &str) -> bool {
    name.starts_with("cover-") && !name.starts_with("cover-thumb")
}

/// Source image for thumbnail rebuilds
///
/// `cover.{jpg,jpeg,png,webp}` wins, otherwise the first legacy
/// `cover-*` image in name order.
pub fn find_cover_source(dir: &Path) -> Option<(PathBuf, ImageKind)> {
    for ext in ["jpg", "jpeg", "png", "webp"] {
        let path = dir.join(format!("cover.{}", ext));
        if path.is_file() {
            return ImageKind::from_extension(ext).map(|kind| (path, kind));
        }
    }
    file_names(dir)
        .into_iter()
        .filter(|name| is_legacy_cover(name))
        .find_map(|name| {
            let path = dir.join(&name);
            ImageKind::from_path(&path).map(|kind| (path, kind))
        })
}

/// Cover images a folder may hold, for normalization
#[derive(Debug, Clone)]
pub struct CoverCandidate {
    pub path: PathBuf,
    pub kind: ImageKind,
    /// Already named `cover.<ext>`
    pub canonical: bool,
    pub modified: Option<std::time::SystemTime>,
}

/// Every `cover.<ext>` and legacy `cover-*.<ext>` image in a folder
pub fn cover_candidates(dir: &Path) -> Vec<CoverCandidate> {
    file_names(dir)
        .into_iter()
        .filter(|name| name.starts_with("cover.") || is_legacy_cover(name))
        .filter_map(|name| {
            let path = dir.join(&name);
            let kind = ImageKind::from_path(&path)?;
            let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            Some(CoverCandidate {
                canonical: name.starts_with("cover."),
                path,
                kind,
                modified,
            })
        })
        .collect()
}

/// Preferred candidate: a canonical `cover.<ext>`, else the newest file
pub fn pick_cover(candidates: &[CoverCandidate]) -> Option<&CoverCandidate> {
    candidates
        .iter()
        .find(|c| c.canonical)
        .or_else(|| candidates.iter().max_by_key(|c| c.modified))
}

/// Legacy files left after normalization: `cover-*` originals and
/// timestamped `cover-thumb-*` thumbnails
pub fn legacy_files(dir: &Path) -> Vec<PathBuf> {
    file_names(dir)
        .into_iter()
        .filter(|name| is_legacy_cover(name) || name.starts_with("cover-thumb-"))
        .map(|name| dir.join(name))
        .collect()
}

/// Numeric book folders under `uploads/`, in numeric order
pub fn book_dirs(uploads_dir: &Path) -> Vec<(i64, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(uploads_dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<(i64, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            name.parse::<i64>().ok().map(|id| (id, e.path()))
        })
        .collect();
    dirs.sort_by_key(|(id, _)| *id);
    dirs
}

/// Resolve a stored relative path, only if it stays inside `uploads/`
pub fn resolve_stored_path(root: &Path, stored: &str) -> Option<PathBuf> {
    let rel = Path::new(stored.trim_start_matches('/'));
    let mut components = rel.components();
    if components.next() != Some(Component::Normal("uploads".as_ref())) {
        return None;
    }
    if !components.all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(root.join(rel))
}
