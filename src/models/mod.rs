pub mod block_socket;
pub mod health;
pub mod ready;
pub mod diagnostics;
pub mod error;

pub use block_socket::*;
pub use health::*;
pub use ready::*;
pub use diagnostics::*;
pub use error::*;
