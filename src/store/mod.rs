// src/store/mod.rs

//! Per-run scratch storage for captured step outputs.
//!
//! Each run owns one [`OutputStore`] rooted in a fresh scratch directory.
//! Completed steps get one file each, named after the step, so downstream
//! steps can read upstream results through `$CALX_TMPDIR/<name>`.

pub mod output_store;

pub use output_store::{OutputStore, StepOutputs};
