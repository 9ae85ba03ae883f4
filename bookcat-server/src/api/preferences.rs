//! Per-user display preferences and logo upload

use std::path::Path;

use axum::{extract::State, Json};
use bookcat_common::colors::{contrast_ratio, parse_hex_color, MIN_CONTRAST};
use rand::Rng;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::auth::CurrentUser;
use crate::api::run_blocking;
use crate::db::preferences::{
    self, PreferencesUpdate, DEFAULT_TEXT_SIZE, SHOW_FLAGS, TEXT_SIZES,
};
use crate::error::{ApiError, ApiResult};
use crate::fields::{parse_int, FormData, UploadedFile};
use crate::imaging::{fit_within, ImageKind, LOGO_MAX_SIDE};
use crate::AppState;

const LOGO_MAX_BYTES: usize = 5_000_000;

/// GET /api/preferences
pub async fn get_preferences(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<Value>> {
    let prefs = preferences::fetch_preferences(&state.db, user.user_id).await?;
    Ok(Json(json!({ "ok": true, "data": { "preferences": prefs } })))
}

/// Validate the supplied keys into an update, in the order errors are reported
fn parse_update(form: &FormData) -> ApiResult<PreferencesUpdate> {
    let fields = &form.fields;
    let mut update = PreferencesUpdate::default();

    for (key, _) in SHOW_FLAGS {
        match fields.strict_bool(key) {
            None => {}
            Some(Ok(value)) => update.flags.push((key, value)),
            Some(Err(())) => return Err(ApiError::bad_request(format!("Invalid {} value", key))),
        }
    }

    if let Some(raw) = fields.text("per_page").filter(|s| !s.is_empty()) {
        let per_page = parse_int(&raw).unwrap_or(0);
        if !(1..=200).contains(&per_page) {
            return Err(ApiError::bad_request("Invalid items-per-page value"));
        }
        update.per_page = Some(per_page);
    }

    if fields.has("text_size") {
        let size = fields.normalized("text_size");
        if let Some(size) = &size {
            if !TEXT_SIZES.contains(&size.as_str()) {
                return Err(ApiError::bad_request("Invalid text size"));
            }
        }
        update.text_size = Some(size.unwrap_or_else(|| DEFAULT_TEXT_SIZE.to_string()));
    }

    for (key, message, slot) in [
        ("bg_color", "Invalid background color", &mut update.bg_color),
        ("fg_color", "Invalid foreground color", &mut update.fg_color),
    ] {
        if !fields.has(key) {
            continue;
        }
        let color = fields.normalized(key);
        if let Some(color) = &color {
            if parse_hex_color(color).is_none() {
                return Err(ApiError::bad_request(message));
            }
        }
        *slot = Some(color);
    }

    if let (Some(Some(bg)), Some(Some(fg))) = (&update.bg_color, &update.fg_color) {
        if contrast_ratio(bg, fg) < MIN_CONTRAST {
            return Err(ApiError::bad_request("Foreground/background contrast too low"));
        }
    }

    Ok(update)
}

/// Delete `logo-*` files of one user folder
fn remove_logo_files(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    if !dir.is_dir() {
        return Ok(0);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_logo = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("logo"));
        if is_logo && path.is_file() {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove old logo {}: {}", path.display(), e),
            }
        }
    }
    Ok(removed)
}

/// Scale and store a logo; returns its path relative to the root folder
fn store_logo(user_assets: &Path, user_id: i64, file: &UploadedFile) -> ApiResult<String> {
    if file.bytes.len() > LOGO_MAX_BYTES {
        return Err(ApiError::PayloadTooLarge("Logo exceeds 5 MB".to_string()));
    }
    let kind = match ImageKind::sniff(&file.bytes) {
        Some(kind @ (ImageKind::Jpeg | ImageKind::Png)) => kind,
        _ => {
            return Err(ApiError::UnsupportedMediaType(
                "Logo must be a JPEG or PNG image".to_string(),
            ))
        }
    };

    let scaled = fit_within(&file.bytes, LOGO_MAX_SIDE, kind)?;
    let dir = user_assets.join(user_id.to_string());
    std::fs::create_dir_all(&dir)?;
    remove_logo_files(&dir)?;

    let suffix: [u8; 3] = rand::thread_rng().gen();
    let suffix: String = suffix.iter().map(|b| format!("{:02x}", b)).collect();
    let file_name = format!(
        "logo-{}-{}.{}",
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        suffix,
        kind.extension()
    );
    std::fs::write(dir.join(&file_name), scaled)?;
    Ok(format!("user-assets/{}/{}", user_id, file_name))
}

/// POST /api/preferences
pub async fn update_preferences(
    State(state): State<AppState>,
    user: CurrentUser,
    form: FormData,
) -> ApiResult<Json<Value>> {
    let mut update = parse_update(&form)?;
    let user_assets = state.layout.user_assets_dir();
    let user_id = user.user_id;

    if let Some(file) = form.file("logo").cloned() {
        let assets = user_assets.clone();
        let logo_path = run_blocking(move || store_logo(&assets, user_id, &file)).await?;
        info!("Stored logo for user {}: {}", user_id, logo_path);
        update.logo_path = Some(Some(logo_path));
    }

    if form.fields.flag("remove_logo").unwrap_or(false) {
        let dir = user_assets.join(user_id.to_string());
        let removed = run_blocking(move || Ok(remove_logo_files(&dir)?)).await?;
        info!("Removed {} logo file(s) for user {}", removed, user_id);
        update.logo_path = Some(None);
    }

    if !update.is_empty() {
        preferences::update_preferences(&state.db, user_id, &update).await?;
    }
    let prefs = preferences::fetch_preferences(&state.db, user_id).await?;
    Ok(Json(json!({ "ok": true, "data": { "preferences": prefs } })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Fields;

    fn form(value: Value) -> FormData {
        FormData {
            fields: Fields::from_json_bytes(value.to_string().as_bytes()),
            files: Default::default(),
        }
    }

    fn error_message(value: Value) -> String {
        parse_update(&form(value)).unwrap_err().to_string()
    }

    #[test]
    fn test_validation_messages() {
        assert_eq!(error_message(json!({"show_cover": "maybe"})), "Invalid show_cover value");
        assert_eq!(error_message(json!({"per_page": 0})), "Invalid items-per-page value");
        assert_eq!(error_message(json!({"per_page": "201"})), "Invalid items-per-page value");
        assert_eq!(error_message(json!({"text_size": "huge"})), "Invalid text size");
        assert_eq!(error_message(json!({"bg_color": "white"})), "Invalid background color");
        assert_eq!(error_message(json!({"fg_color": "#12345"})), "Invalid foreground color");
        assert_eq!(
            error_message(json!({"bg_color": "#ffffff", "fg_color": "#eeeeee"})),
            "Foreground/background contrast too low"
        );
    }

    #[test]
    fn test_flags_are_validated_before_other_keys() {
        let msg = error_message(json!({"per_page": 0, "show_notes": "nope"}));
        assert_eq!(msg, "Invalid show_notes value");
    }

    #[test]
    fn test_partial_update_contents() {
        let update = parse_update(&form(json!({
            "per_page": "50",
            "show_isbn": "on",
            "bg_color": "",
            "text_size": "large",
        })))
        .unwrap();
        assert_eq!(update.per_page, Some(50));
        assert_eq!(update.flags, vec![("show_isbn", true)]);
        assert_eq!(update.bg_color, Some(None));
        assert_eq!(update.fg_color, None);
        assert_eq!(update.text_size.as_deref(), Some("large"));
        assert!(parse_update(&form(json!({}))).unwrap().is_empty());
    }

    #[test]
    fn test_logo_rejects_other_types() {
        let tmp = tempfile::tempdir().unwrap();
        let file = UploadedFile {
            file_name: "logo.gif".into(),
            content_type: Some("image/gif".into()),
            bytes: axum::body::Bytes::from_static(b"GIF89a\x01\x00\x01\x00\x00\x00\x00;"),
        };
        let err = store_logo(tmp.path(), 1, &file).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
