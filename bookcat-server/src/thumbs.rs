//! Cover maintenance passes over `uploads/`
//!
//! The filesystem work is synchronous and returns the database changes it
//! implies; callers run it on a blocking thread and apply the changes.

use std::path::Path;

use bookcat_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::imaging::{thumbnail_to_height, ImageKind};
use crate::uploads::{
    book_dirs, cover_candidates, find_cover_source, legacy_files, pick_cover, relative_cover_path,
    resolve_stored_path, thumb_file_name,
};

/// At most this many error strings are reported
pub const MAX_REPORTED_ERRORS: usize = 25;

/// Options of the thumbnail rebuild
#[derive(Debug, Clone, Copy)]
pub struct RebuildOptions {
    /// Folders per batch; 0 processes every folder
    pub limit: usize,
    pub offset: usize,
    pub height: u32,
    /// Regenerate thumbnails that already exist
    pub force: bool,
}

/// Result of [`rebuild_pass`]
#[derive(Debug, Default, Serialize)]
pub struct RebuildReport {
    pub total_dirs: usize,
    pub offset: usize,
    pub limit: usize,
    pub scanned: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    /// `(book_id, relative thumb path)` to store in `cover_thumb`
    #[serde(skip)]
    pub thumbs: Vec<(i64, String)>,
}

fn push_error(errors: &mut Vec<String>, message: String) {
    if errors.len() < MAX_REPORTED_ERRORS {
        errors.push(message);
    }
}

/// Rebuild height-bounded thumbnails for one batch of book folders
pub fn rebuild_pass(uploads_dir: &Path, opts: RebuildOptions) -> RebuildReport {
    let dirs = book_dirs(uploads_dir);
    let mut report = RebuildReport {
        total_dirs: dirs.len(),
        offset: opts.offset,
        limit: opts.limit,
        ..RebuildReport::default()
    };

    let batch: Vec<_> = if opts.limit == 0 {
        dirs
    } else {
        dirs.into_iter().skip(opts.offset).take(opts.limit).collect()
    };

    for (book_id, dir) in batch {
        report.scanned += 1;
        let Some((source, kind)) = find_cover_source(&dir) else {
            report.skipped += 1;
            continue;
        };

        let thumb_name = thumb_file_name(kind);
        let thumb_path = dir.join(&thumb_name);
        if !opts.force && thumb_path.is_file() {
            report.skipped += 1;
            continue;
        }

        if let Err(e) = thumbnail_to_height(&source, &thumb_path, opts.height, kind) {
            warn!("Thumbnail failed for book {}: {}", book_id, e);
            push_error(&mut report.errors, format!("book #{}: failed to generate thumb", book_id));
            continue;
        }
        report.thumbs.push((book_id, relative_cover_path(book_id, &thumb_name)));
        report.updated += 1;
    }
    report
}

/// Result of [`normalize_pass`]
#[derive(Debug, Default, Serialize)]
pub struct NormalizeReport {
    pub dry_run: bool,
    pub scanned: usize,
    pub renamed: usize,
    pub thumbs_rebuilt: usize,
    pub deleted_legacy: usize,
    /// Rows the database actually changed
    pub db_rows_updated: u64,
    pub db_rows_would_update: Option<usize>,
    pub height: u32,
    /// `(book_id, cover_image, cover_thumb)` to store
    #[serde(skip)]
    pub covers: Vec<(i64, String, String)>,
}

/// Rename each folder's best cover to `cover.<ext>`, rebuild its thumbnail
/// and delete legacy leftovers
///
/// A dry run only counts what would change. Failures abort the pass, since a
/// half-renamed folder needs attention before the database points at it.
pub fn normalize_pass(uploads_dir: &Path, dry_run: bool, force: bool, height: u32) -> Result<NormalizeReport> {
    let mut report = NormalizeReport {
        dry_run,
        height,
        ..NormalizeReport::default()
    };

    for (book_id, dir) in book_dirs(uploads_dir) {
        report.scanned += 1;
        let candidates = cover_candidates(&dir);
        let Some(chosen) = pick_cover(&candidates) else {
            continue;
        };

        let cover_name = format!("cover.{}", chosen.kind.extension());
        let thumb_name = thumb_file_name(chosen.kind);
        let cover_path = dir.join(&cover_name);
        let thumb_path = dir.join(&thumb_name);

        if chosen.path != cover_path {
            if !dry_run {
                if cover_path.is_file() {
                    std::fs::remove_file(&cover_path)?;
                }
                std::fs::rename(&chosen.path, &cover_path)?;
            }
            report.renamed += 1;
        }

        if force || !thumb_path.is_file() {
            if !dry_run {
                remove_other_thumbs(&dir, &thumb_name);
                let source = if cover_path.is_file() { &cover_path } else { &chosen.path };
                thumbnail_to_height(source, &thumb_path, height, chosen.kind).map_err(|e| {
                    bookcat_common::Error::Internal(format!("Thumb failed for {}: {}", cover_path.display(), e))
                })?;
            }
            report.thumbs_rebuilt += 1;
        }

        for legacy in legacy_files(&dir) {
            if legacy == cover_path || legacy == thumb_path || (dry_run && legacy == chosen.path) {
                continue;
            }
            if !dry_run {
                if let Err(e) = std::fs::remove_file(&legacy) {
                    warn!("Failed to delete {}: {}", legacy.display(), e);
                    continue;
                }
            }
            report.deleted_legacy += 1;
        }

        report.covers.push((
            book_id,
            relative_cover_path(book_id, &cover_name),
            relative_cover_path(book_id, &thumb_name),
        ));
    }

    if dry_run {
        report.db_rows_would_update = Some(report.scanned);
    }
    Ok(report)
}

fn remove_other_thumbs(dir: &Path, keep: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("cover-thumb.") && name != keep {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                warn!("Failed to delete {}: {}", entry.path().display(), e);
            }
        }
    }
}

/// Store rebuilt thumbnail paths; returns rows changed
pub async fn apply_thumbs(pool: &SqlitePool, thumbs: &[(i64, String)]) -> Result<u64> {
    let mut changed = 0;
    for (book_id, thumb) in thumbs {
        changed += sqlx::query("UPDATE Books SET cover_thumb = ? WHERE book_id = ?")
            .bind(thumb)
            .bind(book_id)
            .execute(pool)
            .await?
            .rows_affected();
    }
    Ok(changed)
}

/// Store normalized cover paths; returns rows changed
pub async fn apply_covers(pool: &SqlitePool, covers: &[(i64, String, String)]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut changed = 0;
    for (book_id, image, thumb) in covers {
        changed += sqlx::query("UPDATE Books SET cover_image = ?, cover_thumb = ? WHERE book_id = ?")
            .bind(image)
            .bind(thumb)
            .bind(book_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok(changed)
}

/// Options of the offline `generate-thumbs` command
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub height: u32,
    pub force: bool,
    pub dry_run: bool,
    pub limit: i64,
}

/// Totals printed by the offline command
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenerateSummary {
    pub scanned: usize,
    pub generated: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// `cover.jpg` → `cover-thumb.jpg`, `cover-1a.webp` → `cover-1a-thumb.webp`
pub fn thumb_path_for(rel_cover: &str) -> String {
    let (dir, name) = match rel_cover.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, rel_cover),
    };
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext.to_ascii_lowercase()),
        _ => (name, "jpg".to_string()),
    };
    let thumb = format!("{}-thumb.{}", stem, ext);
    match dir {
        Some(dir) => format!("{}/{}", dir, thumb),
        None => thumb,
    }
}

/// Regenerate thumbnails for the newest books, driven by the database
///
/// Books without a stored cover fall back to `uploads/<id>/cover.*`.
/// Stored paths that leave `uploads/` are skipped. Progress lines go to
/// stdout.
pub async fn generate_thumbs(pool: &SqlitePool, root: &Path, opts: GenerateOptions) -> Result<GenerateSummary> {
    let rows = sqlx::query_as::<_, (i64, Option<String>, Option<String>)>(
        "SELECT book_id, cover_image, cover_thumb FROM Books ORDER BY book_id DESC LIMIT ?",
    )
    .bind(opts.limit)
    .fetch_all(pool)
    .await?;

    let mut summary = GenerateSummary::default();
    for (book_id, cover_image, cover_thumb) in rows {
        summary.scanned += 1;

        let rel_cover = cover_image.filter(|c| !c.is_empty()).or_else(|| {
            ["jpg", "png", "webp", "jpeg"]
                .iter()
                .map(|ext| relative_cover_path(book_id, &format!("cover.{}", ext)))
                .find(|rel| root.join(rel).is_file())
        });
        let Some(rel_cover) = rel_cover else {
            summary.skipped += 1;
            continue;
        };
        let Some(abs_cover) = resolve_stored_path(root, &rel_cover) else {
            warn!("Book {} cover path is outside uploads/: {}", book_id, rel_cover);
            summary.skipped += 1;
            continue;
        };
        let Some(kind) = ImageKind::from_path(&abs_cover).filter(|_| abs_cover.is_file()) else {
            summary.skipped += 1;
            continue;
        };

        let rel_thumb = thumb_path_for(&rel_cover);
        let Some(abs_thumb) = resolve_stored_path(root, &rel_thumb) else {
            summary.skipped += 1;
            continue;
        };
        let have_thumb_db = cover_thumb.as_deref().is_some_and(|t| !t.is_empty());
        if abs_thumb.is_file() && have_thumb_db && !opts.force {
            summary.skipped += 1;
            continue;
        }

        if opts.dry_run {
            println!("[DRY] id={} src={} -> thumb={} (h={})", book_id, rel_cover, rel_thumb, opts.height);
            summary.generated += 1;
            continue;
        }

        let height = opts.height;
        let written = tokio::task::spawn_blocking(move || {
            if let Some(parent) = abs_thumb.parent() {
                std::fs::create_dir_all(parent)?;
            }
            thumbnail_to_height(&abs_cover, &abs_thumb, height, kind)
        })
        .await
        .map_err(|e| bookcat_common::Error::Internal(e.to_string()))?;
        if let Err(e) = written {
            summary.errors += 1;
            println!("[ERR]  id={} failed to write thumb for {}: {}", book_id, rel_cover, e);
            continue;
        }

        if opts.force || !have_thumb_db {
            if let Err(e) = sqlx::query("UPDATE Books SET cover_thumb = ? WHERE book_id = ?")
                .bind(&rel_thumb)
                .bind(book_id)
                .execute(pool)
                .await
            {
                summary.errors += 1;
                println!("[ERR]  id={} DB update failed: {}", book_id, e);
                continue;
            }
        }
        summary.generated += 1;
        println!("[OK]   id={} -> {}", book_id, rel_thumb);
    }

    info!(
        "generate-thumbs: scanned {}, generated {}, skipped {}, errors {}",
        summary.scanned, summary.generated, summary.skipped, summary.errors
    );
    Ok(summary)
}
