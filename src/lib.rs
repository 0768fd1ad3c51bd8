pub mod config;
pub mod database_ops;
pub mod error;
pub mod identity;
pub mod loadtest;
pub mod logging;
pub mod marker;
pub mod model;
pub mod normalization;
pub mod orchestrator;
pub mod pipeline;
pub mod source;

pub mod util {
    pub mod env;
}

pub use config::{ImportConfig, ImportMode};
pub use error::ImportError;
pub use orchestrator::{Importer, RunOutcome, SkipReason};
