#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod app;
pub mod backends;
pub mod cli;
pub mod config;
pub mod error;
pub mod eval;
pub mod gateway;
pub mod llm;
pub mod policy;
pub mod runner;
pub mod store;
pub mod utils;

pub use backends::Backends;
pub use config::Config;
pub use error::LoopError;
pub use policy::{Patch, Policy, apply_patch};
pub use runner::RunLoop;
pub use store::{RunDetail, RunStatus, RunStore, SqliteRunStore};
