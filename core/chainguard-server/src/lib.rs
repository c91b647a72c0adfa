//! Server library surface: the dispatcher and tool handlers.
//!
//! The binary in `main.rs` wires this to stdin/stdout; integration tests
//! drive the dispatcher directly.

pub mod dispatch;
pub mod handlers;

pub use dispatch::Dispatcher;
pub use handlers::AppState;
