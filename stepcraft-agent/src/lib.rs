//! # Stepcraft Agent
//!
//! Everything around the engine that turns it into a usable agent runner:
//! - [`AgentCatalog`]: built-in agents plus JSON definitions loaded from disk
//! - [`tools`]: the filesystem tools agents can be granted
//! - [`Agent`]: looks agents up by name and runs them on a shared interpreter
//! - [`AgentConfig`]: agents directory, workspace, engine and provider settings

mod agent;
pub mod builtin;
mod catalog;
mod config;
pub mod tools;

pub use agent::{Agent, AgentRequest};
pub use catalog::AgentCatalog;
pub use config::{AgentConfig, ProviderSettings};
