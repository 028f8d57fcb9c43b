// SPDX-License-Identifier: MIT

//! Execution ordering.
//!
//! Kahn's algorithm over the validated graph, with ties broken by the
//! position of each block in the caller's list. The order is therefore fully
//! deterministic for a given input, which keeps run logs reproducible.

use std::collections::HashMap;

use crate::errors::PipelineError;
use crate::pipeline::{validate_blocks, Block};

/// A validated pipeline plus its topological execution order.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    blocks: HashMap<String, Block>,
    order: Vec<String>,
}

impl ExecutionPlan {
    /// Validates the block list and computes the execution order.
    pub fn build(blocks: Vec<Block>) -> Result<Self, PipelineError> {
        validate_blocks(&blocks)?;
        let order = topological_order(&blocks);
        let blocks = blocks.into_iter().map(|b| (b.id.clone(), b)).collect();
        Ok(Self { blocks, order })
    }

    /// Block ids in execution order; every block appears after all of its
    /// declared inputs.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Kahn's algorithm, scanning ready blocks in declaration order.
///
/// Precondition: the list passed structural validation (no cycles, no
/// dangling references), so every block is eventually emitted.
fn topological_order(blocks: &[Block]) -> Vec<String> {
    let index_of: HashMap<&str, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i))
        .collect();

    let mut remaining_deps: Vec<usize> = blocks.iter().map(|b| b.inputs.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];
    for (i, block) in blocks.iter().enumerate() {
        for input in &block.inputs {
            dependents[index_of[input.as_str()]].push(i);
        }
    }

    let mut order = Vec::with_capacity(blocks.len());
    let mut emitted = vec![false; blocks.len()];

    while order.len() < blocks.len() {
        // Lowest declaration index among ready blocks goes next.
        let next = (0..blocks.len())
            .find(|&i| !emitted[i] && remaining_deps[i] == 0)
            .expect("acyclic graph always has a ready block");
        emitted[next] = true;
        order.push(blocks[next].id.clone());
        for &dep in &dependents[next] {
            remaining_deps[dep] -= 1;
        }
    }

    order
}
