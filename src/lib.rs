pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod ws;

use std::sync::Arc;

use config::Config;
use db::BlockStore;
use ws::WorkspaceRegistry;

/// State shared by every HTTP handler.
pub struct AppState {
    pub config: Config,
    pub registry: WorkspaceRegistry,
    pub block_store: Option<Arc<BlockStore>>,
}

impl AppState {
    pub fn new(config: Config, registry: WorkspaceRegistry, block_store: Option<Arc<BlockStore>>) -> Self {
        Self { config, registry, block_store }
    }
}
