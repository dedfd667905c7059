//! Tenant gateway service library crate.
//!
//! # Purpose
//! Exposes the admission pipeline (token verification, tenant resolution,
//! authorization, usage recording), the HTTP API behind it, configuration,
//! and storage backends for use by the binary and tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod context;
pub mod gate;
pub mod model;
pub mod observability;
pub mod policy;
pub mod store;
pub mod tenancy;
pub mod usage;
