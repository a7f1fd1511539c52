//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`bundles`] - Bundle lifecycle (check, install, retry, remove, archive, watch)
//! - [`common`] - Client construction and status helpers
//! - [`config`] - Configuration management (path, show, init)
//! - [`output`] - Console output abstraction

pub mod bundles;
pub mod common;
pub mod config;
pub mod output;
