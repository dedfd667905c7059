//! Request usage accounting.
//!
//! Usage is recorded off the request path: handlers enqueue an event and a
//! background worker persists it. Nothing here can fail a request.
mod recorder;

pub use recorder::{UsageEvent, UsageRecorder};
