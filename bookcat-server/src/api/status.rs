//! Runtime version status and admin tool warnings

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use bookcat_common::config::BackupDirStatus;
use bookcat_common::db::read_system_info;
use bookcat_common::SCHEMA_VERSION;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::AppState;

const SYSTEM_INFO_KEYS: [&str; 3] = ["app_version", "schema_version", "install_date"];

/// GET /api/status
///
/// `version_match` is true only when SystemInfo records both the running
/// package version and the current schema version.
pub async fn runtime_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut systeminfo = BTreeMap::new();
    for key in SYSTEM_INFO_KEYS {
        if let Some(value) = read_system_info(&state.db, key).await? {
            systeminfo.insert(key, value);
        }
    }

    let app_version = env!("CARGO_PKG_VERSION");
    let version_match = systeminfo.get("app_version").map(String::as_str) == Some(app_version)
        && systeminfo.get("schema_version").map(String::as_str) == Some(SCHEMA_VERSION);

    Ok(Json(json!({
        "ok": true,
        "runtime": {
            "app_version": app_version,
            "schema_version": SCHEMA_VERSION,
            "systeminfo": systeminfo,
            "version_match": version_match,
        },
    })))
}

/// Problems an admin should fix before using the export tools
pub fn tool_warnings(backup: &BackupDirStatus) -> Vec<String> {
    backup.error_message().into_iter().collect()
}

/// GET /api/admin/warnings
pub async fn admin_warnings(State(state): State<AppState>) -> Json<Value> {
    let backup = BackupDirStatus::inspect(state.backup_dir.as_deref());
    let warnings = tool_warnings(&backup);
    let message = (!warnings.is_empty()).then(|| warnings.join("\n"));
    Json(json!({
        "ok": true,
        "data": {
            "warnings": warnings,
            "message": message,
            "backup_dir": backup.as_str(),
        },
    }))
}
