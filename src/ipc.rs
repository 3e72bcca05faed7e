//! Daemon: Unix-socket control plane plus the detector pipeline thread.
//!
//! Protocol: one JSON request line `{"op": "...", ...}` answered by one JSON
//! line `{"ok": true, "data": ...}` or `{"ok": false, "error": "..."}`.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use pipeline::Engine;
pub use server::{client_request, run_daemon};
