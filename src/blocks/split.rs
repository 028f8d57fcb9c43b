// SPDX-License-Identifier: MIT

//! The `split` block: seeded train/test row split of `X` and `y`.

use async_trait::async_trait;
use ndarray::{Array1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue};
use crate::errors::BlockError;
use crate::pipeline::Block;

pub struct SplitBlock;

#[async_trait]
impl BlockHandler for SplitBlock {
    fn name(&self) -> &str {
        "split"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["X", "y"]
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let test_size: f64 = block.param_or("test_size", 0.2);
        if !(0.0..1.0).contains(&test_size) || test_size == 0.0 {
            return Err(BlockError::InvalidParams(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }
        let seed: u64 = block.param_or("random_state", 42);
        let shuffle: bool = block.param_or("shuffle", true);

        let n_rows = match ctx.get("X") {
            Some(ContextValue::Frame(df)) => df.n_rows(),
            Some(ContextValue::Matrix(m)) => m.nrows(),
            Some(other) => {
                return Err(BlockError::Data(format!(
                    "context key 'X' holds a {}, expected a frame or matrix",
                    other.kind()
                )))
            }
            None => return Err(BlockError::Data("context key 'X' is missing".to_string())),
        };
        let y_len = match ctx.get("y") {
            Some(ContextValue::Vector(v)) => v.len(),
            Some(ContextValue::StringList(v)) => v.len(),
            Some(other) => {
                return Err(BlockError::Data(format!(
                    "context key 'y' holds a {}, expected a vector or string_list",
                    other.kind()
                )))
            }
            None => return Err(BlockError::Data("context key 'y' is missing".to_string())),
        };
        if n_rows != y_len {
            return Err(BlockError::Data(format!(
                "X has {n_rows} rows but y has {y_len}"
            )));
        }
        if n_rows < 2 {
            return Err(BlockError::Data(format!(
                "cannot split {n_rows} rows into train and test"
            )));
        }

        let mut indices: Vec<usize> = (0..n_rows).collect();
        if shuffle {
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }
        let n_test = ((n_rows as f64 * test_size).round() as usize).clamp(1, n_rows - 1);
        let (test_idx, train_idx) = indices.split_at(n_test);

        match ctx.get("X").expect("checked above") {
            ContextValue::Frame(df) => {
                let train = df.take_rows(train_idx);
                let test = df.take_rows(test_idx);
                ctx.insert("X_train", ContextValue::Frame(train));
                ctx.insert("X_test", ContextValue::Frame(test));
            }
            ContextValue::Matrix(m) => {
                let train = m.select(Axis(0), train_idx);
                let test = m.select(Axis(0), test_idx);
                ctx.insert("X_train", ContextValue::Matrix(train));
                ctx.insert("X_test", ContextValue::Matrix(test));
            }
            _ => unreachable!("checked above"),
        }

        match ctx.get("y").expect("checked above") {
            ContextValue::Vector(v) => {
                let train = Array1::from_iter(train_idx.iter().map(|&i| v[i]));
                let test = Array1::from_iter(test_idx.iter().map(|&i| v[i]));
                ctx.insert("y_train", ContextValue::Vector(train));
                ctx.insert("y_test", ContextValue::Vector(test));
            }
            ContextValue::StringList(v) => {
                let train: Vec<String> = train_idx.iter().map(|&i| v[i].clone()).collect();
                let test: Vec<String> = test_idx.iter().map(|&i| v[i].clone()).collect();
                ctx.insert("y_train", ContextValue::StringList(train));
                ctx.insert("y_test", ContextValue::StringList(test));
            }
            _ => unreachable!("checked above"),
        }

        info!(
            block_id = %block.id,
            train = n_rows - n_test,
            test = n_test,
            "train/test split"
        );
        Ok(())
    }
}
