use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn path_param(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

/// `params.workspacePath`, or the open workspace.
fn workspace_param(state: &AppState, req: &Request) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn handle_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match path_param(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace_path = match workspace_param(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let export = match backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path)) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %out_path, error = %format!("{e:#}"), "bundle export failed");
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            );
        }
    };
    info!(path = %out_path, sha256 = %export.db_sha256, "workspace bundle exported");
    ok(
        &req.id,
        json!({
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256
        }),
    )
}

fn handle_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match path_param(req, "inPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace_path = match workspace_param(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // The open connection must be released before its file is replaced.
    if state.workspace.as_ref() == Some(&workspace_path) {
        state.db = None;
    }

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %in_path, error = %format!("{e:#}"), "bundle import failed");
            // Reopen whatever was open before, untouched.
            if state.db.is_none() {
                if let Some(ws) = state.workspace.clone() {
                    state.db = db::open_db(&ws).ok();
                }
            }
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            );
        }
    };

    match db::open_db(&workspace_path) {
        Ok(conn) => {
            info!(
                workspace = %workspace_path.to_string_lossy(),
                sha256 = %import.db_sha256,
                "workspace bundle imported"
            );
            state.workspace = Some(workspace_path.clone());
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace_path.to_string_lossy(),
                    "bundleFormatDetected": import.bundle_format_detected,
                    "dbSha256": import.db_sha256
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import_workspace_bundle(state, req)),
        _ => None,
    }
}
