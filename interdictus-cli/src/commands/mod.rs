//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`check`] - Analyze boundary files against the restriction dataset
//! - [`config`] - Configuration management (path, show, init)
//! - [`label`] - Show how raw layer identifiers are named
//! - [`layers`] - List the layers of the restriction dataset

pub mod check;
pub mod config;
pub mod label;
pub mod layers;
