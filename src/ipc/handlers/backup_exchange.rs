use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match helpers::require_str(&req.params, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match backup::export_workspace_bundle(workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "outPath": out_path.to_string_lossy(),
            }),
        ),
        Err(e) => err(&req.id, "backup_failed", format!("{e:?}"), None),
    }
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match helpers::require_str(&req.params, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let workspace = match helpers::opt_str(&req.params, "workspacePath") {
        Ok(Some(p)) => PathBuf::from(p),
        Ok(None) => match state.workspace.as_ref() {
            Some(w) => w.clone(),
            None => {
                return err(
                    &req.id,
                    "no_workspace",
                    "select a workspace or pass workspacePath",
                    None,
                )
            }
        },
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    // Release the current database before the file underneath it changes.
    state.db = None;

    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => {
            // Put the previous database back in service before reporting.
            if let Some(prev) = state.workspace.clone() {
                state.db = db::open_db(&prev).ok();
            }
            return err(&req.id, "backup_failed", format!("{e:?}"), None);
        }
    };

    match db::open_db(&workspace) {
        Ok(conn) => {
            tracing::info!(
                workspace = %workspace.to_string_lossy(),
                format = %summary.bundle_format_detected,
                "workspace restored from bundle"
            );
            state.workspace = Some(workspace.clone());
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "bundleFormatDetected": summary.bundle_format_detected,
                    "workspacePath": workspace.to_string_lossy(),
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
