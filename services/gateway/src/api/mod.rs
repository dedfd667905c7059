//! Gateway HTTP API module.
//!
//! # Purpose
//! Route handlers behind tenant admission, the unauthenticated system
//! endpoints, and the shared error and payload types.
pub mod context;
pub mod error;
pub mod files;
pub mod members;
pub mod openapi;
pub mod organization;
pub mod system;
pub mod types;
pub mod usage;
