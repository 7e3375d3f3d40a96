use std::sync::Arc;
use std::time::Duration;

use crate::cache::SnapshotCache;
use crate::config::Config;
use super::persist::SnapshotPersister;

/// Tunables shared by every fan-out server.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub echo_to_sender: bool,
    pub cache_timeout: Duration,
    pub persist_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            echo_to_sender: config.echo_to_sender,
            cache_timeout: config.cache_timeout(),
            persist_timeout: config.persist_timeout(),
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Collaborators handed to each fan-out server when it is created.
#[derive(Clone)]
pub struct SyncContext {
    pub cache: Arc<dyn SnapshotCache>,
    pub persister: Option<Arc<dyn SnapshotPersister>>,
    pub options: SyncOptions,
}

impl SyncContext {
    pub fn new(
        cache: Arc<dyn SnapshotCache>,
        persister: Option<Arc<dyn SnapshotPersister>>,
        options: SyncOptions,
    ) -> Self {
        Self { cache, persister, options }
    }
}
