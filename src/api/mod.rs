//! HTTP API: import trigger, state endpoint and real-time log streaming.

pub mod logs;
pub mod server;
pub mod types;
