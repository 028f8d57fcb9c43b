// SPDX-License-Identifier: MIT

//! Block pipeline orchestration for tabular machine learning.
//!
//! A pipeline is a DAG of typed blocks sharing one mutable [`Context`]:
//! datasets load into it, transforms reshape it, the trainer fits a model
//! from it and emits a portable artifact. Built-in block types cover the
//! standard train/evaluate flow; user-authored blocks run as sandboxed WASM
//! modules resolved through the [`registry`].
//!
//! [`Context`]: context::Context

pub mod blocks;    // built-in block handlers
pub mod context;   // shared per-run data bus
pub mod data;      // tabular frames + CSV loading
pub mod engine;    // pipeline dispatcher
pub mod errors;    // error taxonomy
pub mod ml;        // models, preprocessing, tuning, artifacts
pub mod pipeline;  // block model + graph validation
pub mod registry;  // built-in + custom block registry
pub mod sandbox;   // WASM execution of custom blocks
