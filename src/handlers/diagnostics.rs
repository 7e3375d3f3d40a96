use crate::{auth::auth, models::{DiagnosticsResponse, ErrorResponse}, AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Report live workspaces, connections and host load
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Extension(prpls): Extension<Vec<String>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    let _ = auth::ensure_admin(&prpls)?;

    let stats = state.registry.stats().await;
    let n_cached_snapshots = state.registry.context().cache.entry_count();

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Workspaces: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        stats.connections,
        stats.workspaces
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_workspaces: stats.workspaces as u32,
            n_conn: stats.connections as u32,
            n_cached_snapshots,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
