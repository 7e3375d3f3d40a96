pub mod health;
pub mod block_socket;
pub mod diagnostics;

pub use health::*;
pub use block_socket::*;
pub use diagnostics::*;
