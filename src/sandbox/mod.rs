// SPDX-License-Identifier: MIT

//! WASM sandbox for user-authored custom blocks.
//!
//! Custom blocks compile to standalone WASM modules speaking a C-style byte
//! protocol (see [`executor`]). The sandbox boundary is the import list: a
//! module gets no host functions at all, so filesystem, network and clock
//! access are structurally impossible. Modules that try to import anything
//! are rejected before instantiation, and execution is fuel-metered so a
//! spinning block cannot hang a pipeline.

pub mod error;
pub mod executor;
pub mod handler;

pub use error::SandboxError;
pub use executor::SandboxExecutor;
pub use handler::SandboxedHandler;

use wasmtime::{Config, Engine};

/// Fuel budget per block execution.
pub const EXECUTION_FUEL: u64 = 100_000_000;

/// Engine configured for deterministic, capability-free execution.
pub fn sandbox_engine() -> Result<Engine, SandboxError> {
    let mut config = Config::new();
    config.wasm_threads(false);
    config.wasm_simd(false);
    config.wasm_relaxed_simd(false);
    config.wasm_multi_memory(false);
    config.wasm_memory64(false);
    config.consume_fuel(true);
    Engine::new(&config).map_err(|e| SandboxError::InvalidModule(e.to_string()))
}

/// Rejects modules that declare any import. Runs on the raw bytes before
/// instantiation so the violation is reported even for modules that would
/// fail to link.
pub fn check_imports(wasm: &[u8]) -> Result<(), SandboxError> {
    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        let payload = payload.map_err(|e| SandboxError::InvalidModule(e.to_string()))?;
        if let wasmparser::Payload::ImportSection(reader) = payload {
            for import in reader {
                let import = import.map_err(|e| SandboxError::InvalidModule(e.to_string()))?;
                return Err(SandboxError::DisallowedImport {
                    module: import.module.to_string(),
                    name: import.name.to_string(),
                });
            }
        }
    }
    Ok(())
}
