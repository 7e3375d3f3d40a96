pub mod dbblocks;

pub use dbblocks::*;
