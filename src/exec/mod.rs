// src/exec/mod.rs

//! Step execution layer.
//!
//! - [`runner`] defines the `Runner` capability the scheduler polls.
//! - [`factory`] provides the `RunnerFactory` trait and the production
//!   `ProcessRunnerFactory`, which tests replace with a fake.
//! - [`backend`] resolves which backend each step is routed to.
//! - [`command`] builds the local and docker command lines.
//! - [`process`] is the child-process runner shared by both backends.
//! - [`env`] assembles a step's environment from `envfile` and `env`.

pub mod backend;
pub mod command;
pub mod env;
pub mod factory;
pub mod process;
pub mod runner;

pub use backend::BackendSelector;
pub use factory::{ProcessRunnerFactory, RunnerFactory, RunnerRequest};
pub use process::ProcessRunner;
pub use runner::{Runner, RunnerFuture};
