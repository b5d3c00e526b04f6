//! Server module for kubecast
//!
//! # Module Structure
//!
//! - `config`: Configuration structures and validation
//! - `loader`: Configuration loading from files and environment
//! - `init`: Startup, HTTP router and the run loop

pub mod config;
mod init;
mod loader;

pub use init::{connect_source, run};
pub use loader::load_config;
