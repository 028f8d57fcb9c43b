// SPDX-License-Identifier: MIT

use thiserror::Error;

use crate::sandbox::SandboxError;

/// Failure raised from inside a block handler.
///
/// The engine wraps these into [`crate::errors::PipelineError::BlockExecution`]
/// (or `SandboxViolation` for capability breaches) so callers always see
/// block-scoped attribution rather than raw internal errors.
#[derive(Error, Debug)]
pub enum BlockError {
    /// A block parameter is missing or malformed.
    #[error("invalid parameter: {0}")]
    InvalidParams(String),

    /// The context held a value of the wrong shape for this block.
    #[error("{0}")]
    Data(String),

    /// Model construction, fitting, or prediction failed.
    #[error("{0}")]
    Train(#[from] crate::ml::MlError),

    /// I/O against datasets or the artifact store failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Saving or loading a trained artifact failed.
    #[error("{0}")]
    Artifact(#[from] crate::ml::artifact::ArtifactError),

    /// Custom block execution failed inside the WASM sandbox.
    #[error("{0}")]
    Sandbox(#[from] SandboxError),
}
