// SPDX-License-Identifier: MIT

//! C-style execution protocol for custom block modules.
//!
//! A module must export:
//! - `memory`: linear memory shared with the host
//! - `allocate(len: i32) -> i32` / `deallocate(ptr: i32, len: i32)`
//! - `process(ptr: i32, len: i32, out_len_ptr: i32) -> i32`
//!
//! The host allocates guest memory, writes the input JSON, and calls
//! `process`, which returns a pointer to the output JSON and stores its
//! length at `out_len_ptr`. The output must be a JSON object; its entries
//! are merged into the pipeline context by the caller.
//!
//! Every execution gets a fresh `Store`, so no state leaks between blocks
//! or runs.

use serde_json::{Map, Value};
use wasmtime::{Engine, Instance, Module, Store};

use crate::sandbox::{check_imports, sandbox_engine, SandboxError, EXECUTION_FUEL};

pub struct SandboxExecutor {
    engine: Engine,
    fuel: u64,
}

impl SandboxExecutor {
    pub fn new() -> Result<Self, SandboxError> {
        Ok(Self {
            engine: sandbox_engine()?,
            fuel: EXECUTION_FUEL,
        })
    }

    pub fn with_fuel(fuel: u64) -> Result<Self, SandboxError> {
        Ok(Self {
            engine: sandbox_engine()?,
            fuel,
        })
    }

    /// Runs a module once over the given input and returns its JSON output.
    pub fn run(&self, wasm: &[u8], input: &Value) -> Result<Map<String, Value>, SandboxError> {
        check_imports(wasm)?;

        let module = Module::new(&self.engine, wasm)
            .map_err(|e| SandboxError::InvalidModule(e.to_string()))?;
        let mut store = Store::new(&self.engine, ());
        store
            .set_fuel(self.fuel)
            .map_err(|e| SandboxError::Trap(e.to_string()))?;

        // No imports are provided; check_imports already guaranteed the
        // module asks for none.
        let instance = Instance::new(&mut store, &module, &[])
            .map_err(|e| SandboxError::Trap(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(SandboxError::MissingExport("memory"))?;
        let allocate = instance
            .get_typed_func::<i32, i32>(&mut store, "allocate")
            .map_err(|_| SandboxError::MissingExport("allocate"))?;
        let deallocate = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, "deallocate")
            .map_err(|_| SandboxError::MissingExport("deallocate"))?;
        let process = instance
            .get_typed_func::<(i32, i32, i32), i32>(&mut store, "process")
            .map_err(|_| SandboxError::MissingExport("process"))?;

        let input_bytes =
            serde_json::to_vec(input).map_err(|e| SandboxError::Output(e.to_string()))?;
        let input_len = input_bytes.len() as i32;

        let input_ptr = allocate
            .call(&mut store, input_len)
            .map_err(|e| SandboxError::Trap(e.to_string()))?;
        memory
            .write(&mut store, input_ptr as usize, &input_bytes)
            .map_err(|e| SandboxError::Trap(e.to_string()))?;
        let out_len_ptr = allocate
            .call(&mut store, 4)
            .map_err(|e| SandboxError::Trap(e.to_string()))?;

        let result_ptr = process
            .call(&mut store, (input_ptr, input_len, out_len_ptr))
            .map_err(|e| SandboxError::Trap(e.to_string()))?;
        if result_ptr == 0 {
            return Err(SandboxError::Output(
                "process returned a null pointer".to_string(),
            ));
        }

        let mut len_bytes = [0u8; 4];
        memory
            .read(&store, out_len_ptr as usize, &mut len_bytes)
            .map_err(|e| SandboxError::Trap(e.to_string()))?;
        let out_len = u32::from_le_bytes(len_bytes) as usize;

        let mut output = vec![0u8; out_len];
        memory
            .read(&store, result_ptr as usize, &mut output)
            .map_err(|e| SandboxError::Trap(e.to_string()))?;

        // Guest-side cleanup is best effort; the store is dropped anyway.
        let _ = deallocate.call(&mut store, (input_ptr, input_len));
        let _ = deallocate.call(&mut store, (out_len_ptr, 4));
        let _ = deallocate.call(&mut store, (result_ptr, out_len as i32));

        let value: Value = serde_json::from_slice(&output)
            .map_err(|e| SandboxError::Output(format!("not valid JSON: {e}")))?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(SandboxError::Output(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Bump allocator plus a canned JSON payload at a fixed offset.
    fn module_returning(payload: &str) -> Vec<u8> {
        let wat = format!(
            r#"(module
                (memory (export "memory") 1)
                (global $next (mut i32) (i32.const 4096))
                (func (export "allocate") (param i32) (result i32)
                    (local $ptr i32)
                    (local.set $ptr (global.get $next))
                    (global.set $next (i32.add (global.get $next) (local.get 0)))
                    (local.get $ptr))
                (func (export "deallocate") (param i32 i32))
                (data (i32.const 8) "{payload}")
                (func (export "process") (param i32 i32 i32) (result i32)
                    (i32.store (local.get 2) (i32.const {len}))
                    (i32.const 8)))"#,
            payload = payload.replace('"', "\\\""),
            len = payload.len(),
        );
        wat::parse_str(&wat).unwrap()
    }

    #[test]
    fn test_runs_protocol_module() {
        let wasm = module_returning(r#"{"cleaned":true,"n":3}"#);
        let executor = SandboxExecutor::new().unwrap();

        let output = executor.run(&wasm, &json!({"context": {}})).unwrap();
        assert_eq!(output["cleaned"], json!(true));
        assert_eq!(output["n"], json!(3));
    }

    #[test]
    fn test_non_object_output_is_rejected() {
        let wasm = module_returning("[1,2,3]");
        let executor = SandboxExecutor::new().unwrap();

        let err = executor.run(&wasm, &json!({})).unwrap_err();
        assert!(matches!(err, SandboxError::Output(_)));
    }

    #[test]
    fn test_missing_export_is_reported() {
        let wasm = wat::parse_str(r#"(module (memory (export "memory") 1))"#).unwrap();
        let executor = SandboxExecutor::new().unwrap();

        let err = executor.run(&wasm, &json!({})).unwrap_err();
        assert!(matches!(err, SandboxError::MissingExport("allocate")));
    }

    #[test]
    fn test_infinite_loop_runs_out_of_fuel() {
        let wasm = wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) (i32.const 8))
                (func (export "deallocate") (param i32 i32))
                (func (export "process") (param i32 i32 i32) (result i32)
                    (loop (br 0))
                    (i32.const 8)))"#,
        )
        .unwrap();
        let executor = SandboxExecutor::with_fuel(10_000).unwrap();

        let err = executor.run(&wasm, &json!({})).unwrap_err();
        assert!(matches!(err, SandboxError::Trap(_)));
    }

    #[test]
    fn test_imports_are_rejected_before_running() {
        let wasm = wat::parse_str(
            r#"(module
                (import "env" "now" (func (result i64)))
                (memory (export "memory") 1))"#,
        )
        .unwrap();
        let executor = SandboxExecutor::new().unwrap();

        let err = executor.run(&wasm, &json!({})).unwrap_err();
        assert!(err.is_violation());
    }
}
