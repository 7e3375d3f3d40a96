pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod fanout;
pub mod persist;
pub mod registry;
pub mod rewind;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{SyncContext, SyncOptions};
pub use dispatcher::UpgradeDispatcher;
pub use fanout::{ClientHandle, ConnectionId, DisconnectOutcome, FanoutServer, Lifecycle};
pub use persist::{DrainReport, SnapshotPersister};
pub use registry::{EnsuredServer, RegistryStats, WorkspaceRegistry};
