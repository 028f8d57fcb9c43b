// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Failures from loading or running a custom block's WASM module.
///
/// `is_violation` separates capability breaches (the module asked for host
/// access it is not allowed) from ordinary failures (bad module, trap, bad
/// output); the engine reports the two differently.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("custom block code is not valid base64: {0}")]
    Decode(String),

    #[error("invalid wasm module: {0}")]
    InvalidModule(String),

    #[error("module imports '{module}::{name}', custom blocks run without host imports")]
    DisallowedImport { module: String, name: String },

    #[error("module does not export '{0}'")]
    MissingExport(&'static str),

    #[error("execution trapped: {0}")]
    Trap(String),

    #[error("block produced invalid output: {0}")]
    Output(String),
}

impl SandboxError {
    /// True for errors that mean the module tried to step outside the
    /// sandbox, rather than merely failing.
    pub fn is_violation(&self) -> bool {
        matches!(self, SandboxError::DisallowedImport { .. })
    }
}
