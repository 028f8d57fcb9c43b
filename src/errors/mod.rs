// SPDX-License-Identifier: MIT

mod block;
mod pipeline;

pub use block::BlockError;
pub use pipeline::PipelineError;
