// SPDX-License-Identifier: MIT

//! End-to-end runs through the engine with real block handlers.

use super::*;
use crate::ml::Task;
use crate::registry::CustomBlockStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fs;

fn write_csv(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("measurements.csv");
    let mut rows = String::from("length,width,kind\n");
    for i in 0..10 {
        rows.push_str(&format!("{}.0,{}.5,short\n", i, i));
        rows.push_str(&format!("{}.0,{}.5,long\n", i + 20, i + 20));
    }
    fs::write(&path, rows).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_end_to_end_training_run() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(&dir);
    let artifact_dir = dir.path().join("artifacts");

    let blocks = vec![
        Block::new("data", "dataset")
            .with_param("file_path", csv)
            .with_param("target", "kind"),
        Block::new("split", "split").with_input("data"),
        Block::new("train", "trainer")
            .with_param("artifact_dir", artifact_dir.to_string_lossy().into_owned())
            .with_input("split"),
    ];

    let ctx = PipelineEngine::new().run(blocks).await.unwrap();

    let artifact = ctx.artifact("artifact").unwrap();
    assert_eq!(artifact.task, Task::Classification);
    assert_eq!(artifact.feature_names, ["length", "width"]);
    assert!(artifact_dir
        .join(format!("artifact_{}.json", artifact.id))
        .exists());
}

#[tokio::test]
async fn test_full_pipeline_with_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(&dir);

    let blocks = vec![
        Block::new("data", "dataset")
            .with_param("file_path", csv)
            .with_param("target", "kind"),
        Block::new("clean", "data_cleaner").with_input("data"),
        Block::new("split", "split").with_input("clean"),
        Block::new("model", "model")
            .with_param("algorithm", "decision_tree")
            .with_input("split"),
        Block::new("train", "trainer")
            .with_param("save_artifact", false)
            .with_input("model"),
        Block::new("eval", "metrics").with_input("train"),
    ];

    let ctx = PipelineEngine::new().run(blocks).await.unwrap();
    let report = ctx.json("metrics").unwrap();
    let accuracy = report["accuracy"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&accuracy));
}

#[tokio::test]
async fn test_missing_inputs_reported_up_front() {
    let blocks = vec![Block::new("eval", "metrics")];
    let err = PipelineEngine::new().run(blocks).await.unwrap_err();

    match err {
        PipelineError::MissingInput {
            block_id,
            missing_keys,
            ..
        } => {
            assert_eq!(block_id, "eval");
            assert_eq!(missing_keys, vec!["X_test", "model", "y_test"]);
        }
        other => panic!("expected MissingInput, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_block_type() {
    let blocks = vec![Block::new("mystery", "quantum_sampler")];
    let err = PipelineEngine::new().run(blocks).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UnknownBlockType { ref block_id, .. } if block_id == "mystery"
    ));
}

#[tokio::test]
async fn test_cycle_rejected_before_any_block_runs() {
    let blocks = vec![
        Block::new("a", "dataset").with_input("b"),
        Block::new("b", "split").with_input("a"),
    ];
    let mut ctx = Context::new();
    let err = PipelineEngine::new()
        .run_with_context(blocks, &mut ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::CyclicDependency { .. }));
    assert!(ctx.is_empty());
}

#[tokio::test]
async fn test_execution_failure_names_the_block() {
    let blocks = vec![Block::new("data", "dataset")
        .with_param("file_path", "/nonexistent/rows.csv")];
    let err = PipelineEngine::new().run(blocks).await.unwrap_err();
    match err {
        PipelineError::BlockExecution { block_id, block_type, .. } => {
            assert_eq!(block_id, "data");
            assert_eq!(block_type, "dataset");
        }
        other => panic!("expected BlockExecution, got {other:?}"),
    }
}

// Protocol module whose output is a fixed JSON object.
fn module_returning(payload: &str) -> String {
    let wasm = wat::parse_str(&format!(
        r#"(module
            (memory (export "memory") 1)
            (global $next (mut i32) (i32.const 4096))
            (func (export "allocate") (param i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $next))
                (global.set $next (i32.add (global.get $next) (local.get 0)))
                (local.get $ptr))
            (func (export "deallocate") (param i32 i32))
            (data (i32.const 8) "{data}")
            (func (export "process") (param i32 i32 i32) (result i32)
                (i32.store (local.get 2) (i32.const {len}))
                (i32.const 8)))"#,
        data = payload.replace('"', "\\\""),
        len = payload.len(),
    ))
    .unwrap();
    BASE64.encode(wasm)
}

#[tokio::test]
async fn test_custom_block_runs_in_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let store = CustomBlockStore::open(dir.path().join("blocks.json")).unwrap();
    let registry = BlockRegistry::with_custom_store(store);
    registry
        .register_custom("scorer", None, Vec::new(), module_returning(r#"{"score":0.75}"#))
        .unwrap();

    let engine = PipelineEngine::with_registry(registry);
    let ctx = engine
        .run(vec![Block::new("score", "scorer")])
        .await
        .unwrap();
    assert_eq!(ctx.number("score").unwrap(), 0.75);
}

#[tokio::test]
async fn test_sandbox_violation_surfaces_as_pipeline_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = CustomBlockStore::open(dir.path().join("blocks.json")).unwrap();
    // Slip an import-carrying module past registration validation by
    // writing to the store directly, as if the file were edited by hand.
    let wasm = wat::parse_str(
        r#"(module
            (import "wasi_snapshot_preview1" "proc_exit" (func (param i32)))
            (memory (export "memory") 1))"#,
    )
    .unwrap();
    store
        .register("evil", None, Vec::new(), BASE64.encode(wasm), &[])
        .unwrap();

    let engine = PipelineEngine::with_registry(BlockRegistry::with_custom_store(store));
    let err = engine
        .run(vec![Block::new("x", "evil")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::SandboxViolation { ref block_id, .. } if block_id == "x"
    ));
}

#[tokio::test]
async fn test_rerunning_trainer_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(&dir);

    let blocks = |tag: &str| {
        vec![
            Block::new("data", "dataset")
                .with_param("file_path", csv.clone())
                .with_param("target", "kind"),
            Block::new("split", "split").with_input("data"),
            Block::new(format!("train_{tag}"), "trainer")
                .with_param("save_artifact", false)
                .with_input("split"),
        ]
    };

    let engine = PipelineEngine::new();
    let first = engine.run(blocks("a")).await.unwrap();
    let second = engine.run(blocks("b")).await.unwrap();
    assert_eq!(first.model("model").unwrap(), second.model("model").unwrap());
}
