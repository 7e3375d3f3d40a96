pub mod snapshot_cache;

pub use snapshot_cache::*;
