//! Server module for Strata
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `validation`: Production configuration validation
//! - `init`: Server assembly and run loop

pub mod config;
mod init;
mod loader;
mod validation;

pub use init::{authenticator, open_store, run};
pub use loader::load_config;
